//! # Triggers and Skip Reasons
//!
//! Where a sync attempt came from, and why an attempt might not run.
//!
//! ```text
//! ┌───────────────────────┬───────────┬────────────────────────────────────┐
//! │ Trigger               │ Automatic │ Runs only with dirty local changes │
//! ├───────────────────────┼───────────┼────────────────────────────────────┤
//! │ Manual                │    no     │ no                                 │
//! │ LocalChange           │    yes    │ yes                                │
//! │ Periodic              │    yes    │ no                                 │
//! │ Startup               │    yes    │ no                                 │
//! │ Background            │    yes    │ yes                                │
//! │ ConnectivityRestored  │    yes    │ no                                 │
//! └───────────────────────┴───────────┴────────────────────────────────────┘
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Source of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// User pressed "sync now".
    Manual,
    /// Debounced follow-up to a local write.
    LocalChange,
    /// Fixed-interval timer.
    Periodic,
    /// Once, when the agent starts.
    Startup,
    /// App is leaving the foreground.
    Background,
    /// Connectivity went from offline to online.
    ConnectivityRestored,
}

impl SyncTrigger {
    /// Everything except `Manual`. Automatic failures are logged, never shown.
    pub const fn is_automatic(&self) -> bool {
        !matches!(self, SyncTrigger::Manual)
    }

    /// Whether the attempt is pointless without unsynced local records.
    pub const fn requires_dirty_changes(&self) -> bool {
        matches!(self, SyncTrigger::LocalChange | SyncTrigger::Background)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::LocalChange => "local_change",
            SyncTrigger::Periodic => "periodic",
            SyncTrigger::Startup => "startup",
            SyncTrigger::Background => "background",
            SyncTrigger::ConnectivityRestored => "connectivity_restored",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt ended without running a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another cycle holds the lock.
    Busy,
    /// The connectivity oracle reported no network.
    Offline,
    /// Trigger needs dirty records and there are none.
    NothingToSync,
    /// An earlier automatic cycle failed; retry window still open.
    BackingOff(Duration),
    /// Sync mode does not allow this trigger.
    Disabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Busy => f.write_str("sync already in progress"),
            SkipReason::Offline => f.write_str("offline"),
            SkipReason::NothingToSync => f.write_str("no local changes"),
            SkipReason::BackingOff(remaining) => {
                write!(f, "backing off for {}ms", remaining.as_millis())
            }
            SkipReason::Disabled => f.write_str("sync disabled"),
        }
    }
}
