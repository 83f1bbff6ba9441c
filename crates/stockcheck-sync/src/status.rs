//! # Sync Status & Events
//!
//! What the UI sees of the sync engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  STATUS EVENTS (to the host app):                                      │
//! │  ───────────────────────────────                                       │
//! │  emit_status - { state: "syncing", isOnline: true, ... }               │
//! │  emit_cycle  - { trigger: "periodic", pulled: 3, pushed: 1, ... }      │
//! │  emit_error  - ("Failed to push changes: ...", retryable: true)        │
//! │                                                                         │
//! │  POLLED:                                                               │
//! │  ───────                                                               │
//! │  SyncStatus::time_until_next_sync → countdown on the home screen      │
//! │  SyncStatus::has_unsynced_changes → "changes pending" badge            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use stockcheck_core::Watermark;

use crate::config::SyncMode;
use crate::orchestrator::CycleReport;

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
}

/// Snapshot of the sync engine for external queries.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,

    pub mode: SyncMode,

    /// Result of the latest reachability check.
    pub is_online: bool,

    /// Whether local records are waiting to be pushed.
    pub has_unsynced_changes: bool,

    /// End of the last successful cycle.
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Message of the last failed cycle, cleared on success.
    pub last_error: Option<String>,

    /// Last committed watermark.
    pub watermark: Watermark,

    /// Failed cycles since the last success.
    pub consecutive_failures: u32,

    /// When the periodic timer fires next.
    pub next_sync_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    pub fn is_syncing(&self) -> bool {
        self.state == SyncState::Syncing
    }

    /// Countdown to the next periodic sync, zero once it is due.
    pub fn time_until_next_sync(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_sync_at
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives sync events (implemented by the host app's UI bridge).
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a sync status change event.
    fn emit_status(&self, status: &SyncStatus);

    /// Emits the summary of a completed cycle.
    fn emit_cycle(&self, report: &CycleReport);

    /// Emits a sync error event.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_cycle(&self, _report: &CycleReport) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}
