//! # Pull Response Normalization
//!
//! The backend answers `pull` in one of two shapes:
//!
//! ```text
//! Wrapper:  { "changes": { "scorte": {...}, ... }, "timestamp": 1700000000000 }
//! Bare:     { "scorte": {...}, ... }
//! ```
//!
//! Both collapse into a single [`PulledChanges`] here, at the ingress
//! boundary, so nothing downstream ever sees the ambiguity.
//!
//! ## Timestamp Leniency
//! A missing, non-numeric or non-positive timestamp is replaced by the
//! device's current time instead of failing the cycle. A backend that never
//! sends a usable timestamp would otherwise stall sync forever. The price is
//! that the watermark can run ahead of the server clock when the two clocks
//! disagree; [`PulledChanges::timestamp_defaulted`] records when it happened.

use serde_json::Value;

use crate::changeset::ChangeSet;
use crate::error::{CoreError, CoreResult};
use crate::watermark::Watermark;

/// Key that marks the wrapper shape.
const CHANGES_KEY: &str = "changes";
const TIMESTAMP_KEY: &str = "timestamp";

/// A validated pull result.
#[derive(Debug, Clone, PartialEq)]
pub struct PulledChanges {
    pub changes: ChangeSet,

    /// Watermark to commit once the cycle succeeds.
    pub timestamp: Watermark,

    /// True when `timestamp` is the local clock, not the server's.
    pub timestamp_defaulted: bool,
}

/// Converts a raw pull response into [`PulledChanges`].
///
/// ## Errors
/// - `null`, or anything that is not a JSON object
/// - a wrapper whose `changes` is missing or not a change set
/// - a change set that fails [`ChangeSet::validate`]
pub fn normalize_pull_response(raw: Value) -> CoreResult<PulledChanges> {
    let mut object = match raw {
        Value::Object(object) => object,
        Value::Null => {
            return Err(CoreError::MalformedResponse(
                "pull returned null data".to_string(),
            ))
        }
        other => {
            return Err(CoreError::MalformedResponse(format!(
                "expected an object, got {}",
                json_kind(&other)
            )))
        }
    };

    let (changes_value, timestamp) = if object.contains_key(CHANGES_KEY) {
        let changes = object.remove(CHANGES_KEY).unwrap_or(Value::Null);
        let timestamp = object.get(TIMESTAMP_KEY).and_then(parse_timestamp);
        (changes, timestamp)
    } else {
        (Value::Object(object), None)
    };

    if !changes_value.is_object() {
        return Err(CoreError::MalformedResponse(format!(
            "changes must be an object, got {}",
            json_kind(&changes_value)
        )));
    }

    let changes: ChangeSet = serde_json::from_value(changes_value)
        .map_err(|e| CoreError::MalformedResponse(e.to_string()))?;
    changes.validate()?;

    let (timestamp, timestamp_defaulted) = match timestamp {
        Some(ts) => (ts, false),
        None => (Watermark::now(), true),
    };

    Ok(PulledChanges {
        changes,
        timestamp,
        timestamp_defaulted,
    })
}

fn parse_timestamp(value: &Value) -> Option<Watermark> {
    let millis = match value.as_i64() {
        Some(millis) => millis,
        None => {
            let float = value.as_f64()?;
            if !float.is_finite() {
                return None;
            }
            float.round() as i64
        }
    };
    let watermark = Watermark::from_millis(millis);
    watermark.is_valid().then_some(watermark)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
