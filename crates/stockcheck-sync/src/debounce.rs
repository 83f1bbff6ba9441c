//! # Debouncer
//!
//! Collapses a burst of local writes into one sync attempt.
//!
//! ```text
//!   write   write write        write
//!     │       │     │            │
//!     ▼       ▼     ▼            ▼
//!  ───┬───────┬─────┬────────────┬──────────────────┬──────────► time
//!     └ reset ┴reset┴─ reset ────┘                  │
//!                                └──── window ──────┘
//!                                                 fire (once)
//! ```
//!
//! There is at most one pending deadline. Each request replaces it, so the
//! attempt fires a full window after the *last* request.

use std::time::Duration;

use tokio::time::Instant;

/// Default quiet period after the last local write.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Pure deadline bookkeeping; the agent's select loop does the waiting.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
    coalesced: usize,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            deadline: None,
            coalesced: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a request at `now`, replacing any pending deadline.
    pub fn request_at(&mut self, now: Instant) -> Instant {
        let deadline = now + self.window;
        self.deadline = Some(deadline);
        self.coalesced += 1;
        deadline
    }

    /// Records a request now.
    pub fn request(&mut self) -> Instant {
        self.request_at(Instant::now())
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Clears the pending deadline, returning how many requests it absorbed.
    pub fn take(&mut self) -> usize {
        self.deadline = None;
        std::mem::take(&mut self.coalesced)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}
