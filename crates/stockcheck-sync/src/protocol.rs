//! # Sync Protocol Messages
//!
//! Request bodies of the two remote procedures.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Pull / Push RPC                                    │
//! │                                                                         │
//! │  PULL                                                                  │
//! │  ────                                                                  │
//! │  device ───► POST /rest/v1/rpc/pull { last_pulled_at, schema_version? }│
//! │  device ◄─── { changes: ChangeSet, timestamp }   or   ChangeSet        │
//! │                                                                         │
//! │  PUSH                                                                  │
//! │  ────                                                                  │
//! │  device ───► POST /rest/v1/rpc/push { changes: ChangeSet }             │
//! │  device ◄─── 2xx (body ignored)                                        │
//! │                                                                         │
//! │  ERROR                                                                 │
//! │  ─────                                                                 │
//! │  device ◄─── non-2xx { message, code?, details?, hint? }               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pull responses are left as raw JSON here; they are turned into a single
//! canonical type by [`normalize_pull_response`](stockcheck_core::normalize_pull_response).

use serde::{Deserialize, Serialize};

use stockcheck_core::{ChangeSet, Watermark};

/// Body of the pull call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Changes newer than this are requested. `0` asks for everything.
    pub last_pulled_at: Watermark,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
}

impl PullRequest {
    pub fn new(last_pulled_at: Watermark) -> Self {
        PullRequest {
            last_pulled_at,
            schema_version: None,
        }
    }

    pub fn with_schema_version(mut self, version: Option<u32>) -> Self {
        self.schema_version = version;
        self
    }
}

/// Body of the push call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Sanitized snapshot of the local changes.
    pub changes: ChangeSet,
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl RemoteErrorBody {
    /// Best human-readable description, falling back to the HTTP status.
    pub fn describe(&self, status: u16) -> String {
        match (&self.message, &self.code) {
            (Some(message), Some(code)) => format!("{message} (code {code})"),
            (Some(message), None) => message.clone(),
            _ => format!("HTTP {status}"),
        }
    }
}
