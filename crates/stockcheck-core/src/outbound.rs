//! # Outbound Changes
//!
//! What a push carries, plus enough bookkeeping to clear dirty markers
//! afterwards without losing edits made while the push was in flight.

use serde::{Deserialize, Serialize};

use crate::changeset::ChangeSet;

/// Revision of one record at the moment it was collected for push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRevision {
    pub table: String,
    pub id: String,
    pub revision: i64,
}

/// Dirty records collected for a push.
///
/// `changes` still carries local bookkeeping columns; push
/// [`ChangeSet::snapshot`] of it, not the value itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalChanges {
    pub changes: ChangeSet,
    pub revisions: Vec<RecordRevision>,
}

impl LocalChanges {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.changes.record_count()
    }
}
