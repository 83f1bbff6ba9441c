//! # Change Sets
//!
//! The unit of exchange in both sync directions.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ChangeSet                                                              │
//! │  ─────────                                                              │
//! │  {                                                                      │
//! │    "prodotti": { "created": [..], "updated": [..], "deleted": [ids] }, │
//! │    "scorte":   { "created": [..], "updated": [..], "deleted": [ids] }, │
//! │    ...                                                                  │
//! │  }                                                                      │
//! │                                                                         │
//! │  created / updated : full records (opaque JSON objects keyed by "id")  │
//! │  deleted           : record ids only                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are never interpreted here beyond their `id`; the column layout
//! belongs to the app.
//!
//! ## Invariant
//! Within one table an id appears at most once across the three lists.
//! [`ChangeSet::validate`] enforces it at the ingress boundary.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::LOCAL_COLUMNS;

/// A single row as a JSON object.
pub type RawRecord = serde_json::Map<String, Value>;

/// Record identifier, unique within its table.
pub type RecordId = String;

/// Returns the string `id` of a record, if it has one.
pub fn record_id(record: &RawRecord) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

// =============================================================================
// Table Changes
// =============================================================================

/// Changes to one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableChanges {
    #[serde(default)]
    pub created: Vec<RawRecord>,

    #[serde(default)]
    pub updated: Vec<RawRecord>,

    /// Ids of removed records.
    #[serde(default)]
    pub deleted: Vec<RecordId>,
}

impl TableChanges {
    /// True when the table carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Number of entries across the three lists.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    fn validate(&self, table: &str) -> CoreResult<()> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.len());

        for record in self.created.iter().chain(self.updated.iter()) {
            let id = record_id(record).ok_or_else(|| CoreError::MissingRecordId {
                table: table.to_string(),
            })?;
            if !seen.insert(id) {
                return Err(CoreError::DuplicateRecord {
                    table: table.to_string(),
                    id: id.to_string(),
                });
            }
        }

        for id in &self.deleted {
            if !seen.insert(id.as_str()) {
                return Err(CoreError::DuplicateRecord {
                    table: table.to_string(),
                    id: id.clone(),
                });
            }
        }

        Ok(())
    }
}

// =============================================================================
// Change Set
// =============================================================================

/// Table name → changes, serialized as a plain JSON object.
///
/// A `BTreeMap` keeps table order stable, so two equal change sets
/// serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<String, TableChanges>);

impl ChangeSet {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the changes for `table`, creating an empty entry if needed.
    pub fn table_mut(&mut self, table: &str) -> &mut TableChanges {
        self.0.entry(table.to_string()).or_default()
    }

    /// Returns the changes for `table`, if present.
    pub fn table(&self, table: &str) -> Option<&TableChanges> {
        self.0.get(table)
    }

    /// Iterates over `(table, changes)` pairs in table-name order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableChanges)> {
        self.0.iter().map(|(name, changes)| (name.as_str(), changes))
    }

    /// True when no table carries any change.
    ///
    /// A change set listing tables with only empty arrays is still empty.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(TableChanges::is_empty)
    }

    /// Total number of created, updated and deleted entries.
    pub fn record_count(&self) -> usize {
        self.0.values().map(TableChanges::len).sum()
    }

    /// Checks that every record has an id and no id repeats within a table.
    pub fn validate(&self) -> CoreResult<()> {
        for (table, changes) in &self.0 {
            changes.validate(table)?;
        }
        Ok(())
    }

    /// Deep copy with local bookkeeping columns removed.
    ///
    /// This is what goes over the wire on push. Other columns, including
    /// domain columns that start with `_`, are kept.
    pub fn snapshot(&self) -> ChangeSet {
        let strip = |records: &[RawRecord]| -> Vec<RawRecord> {
            records
                .iter()
                .map(|record| {
                    record
                        .iter()
                        .filter(|(key, _)| !LOCAL_COLUMNS.contains(&key.as_str()))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect()
                })
                .collect()
        };

        ChangeSet(
            self.0
                .iter()
                .map(|(table, changes)| {
                    (
                        table.clone(),
                        TableChanges {
                            created: strip(&changes.created),
                            updated: strip(&changes.updated),
                            deleted: changes.deleted.clone(),
                        },
                    )
                })
                .collect(),
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn test_empty_tables_count_as_empty() {
        let mut changes = ChangeSet::new();
        assert!(changes.is_empty());

        changes.table_mut("prodotti");
        changes.table_mut("scorte");
        assert!(changes.is_empty());
        assert_eq!(changes.record_count(), 0);

        changes.table_mut("scorte").deleted.push("s1".to_string());
        assert!(!changes.is_empty());
        assert_eq!(changes.record_count(), 1);
    }

    #[test]
    fn test_validate_rejects_duplicate_across_lists() {
        let mut changes = ChangeSet::new();
        let table = changes.table_mut("scorte");
        table.updated.push(record(json!({"id": "s1", "quantita": 3})));
        table.deleted.push("s1".to_string());

        assert_eq!(
            changes.validate(),
            Err(CoreError::DuplicateRecord {
                table: "scorte".to_string(),
                id: "s1".to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_missing_id() {
        let mut changes = ChangeSet::new();
        changes
            .table_mut("prodotti")
            .created
            .push(record(json!({"nome": "Latte"})));

        assert!(matches!(
            changes.validate(),
            Err(CoreError::MissingRecordId { .. })
        ));
    }

    #[test]
    fn test_same_id_in_different_tables_is_fine() {
        let mut changes = ChangeSet::new();
        changes
            .table_mut("prodotti")
            .created
            .push(record(json!({"id": "x"})));
        changes
            .table_mut("scorte")
            .created
            .push(record(json!({"id": "x"})));

        assert!(changes.validate().is_ok());
    }

    #[test]
    fn test_snapshot_strips_local_columns() {
        let mut changes = ChangeSet::new();
        changes.table_mut("scorte").updated.push(record(json!({
            "id": "s1",
            "quantita_in_linea": 4,
            "_posizione": "B2",
            "_status": "updated",
            "_changed": "quantita_in_linea"
        })));

        let snapshot = changes.snapshot();
        let pushed = &snapshot.table("scorte").unwrap().updated[0];
        assert_eq!(pushed.len(), 3);
        assert_eq!(pushed["_posizione"], json!("B2"));
        assert!(!pushed.contains_key("_status"));
        assert!(!pushed.contains_key("_changed"));

        // The source set keeps its bookkeeping.
        assert!(changes.table("scorte").unwrap().updated[0].contains_key("_status"));
    }

    #[test]
    fn test_deserialize_tolerates_missing_lists() {
        let changes: ChangeSet =
            serde_json::from_value(json!({"tare": {"deleted": ["t1"]}})).unwrap();
        let tare = changes.table("tare").unwrap();
        assert!(tare.created.is_empty());
        assert_eq!(tare.deleted, vec!["t1".to_string()]);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut changes = ChangeSet::new();
        changes.table_mut("tare");
        assert_eq!(
            serde_json::to_value(&changes).unwrap(),
            json!({"tare": {"created": [], "updated": [], "deleted": []}})
        );
    }
}
