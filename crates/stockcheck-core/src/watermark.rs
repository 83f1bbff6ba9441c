//! # Watermark
//!
//! The pull cursor: the server-side timestamp up to which this device has
//! incorporated remote changes.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
///
/// Never moves backwards once committed; use [`Watermark::advance`] to
/// combine an old and a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(i64);

impl Watermark {
    /// "Never synced". The first pull asks for everything.
    pub const EPOCH: Watermark = Watermark(0);

    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Watermark(millis)
    }

    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Watermark(Utc::now().timestamp_millis())
    }

    /// A usable server timestamp is strictly positive.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 > 0
    }

    /// True for the initial, never-synced cursor.
    #[inline]
    pub const fn is_epoch(&self) -> bool {
        self.0 == 0
    }

    /// The later of `self` and `other`.
    #[inline]
    pub fn advance(self, other: Watermark) -> Watermark {
        self.max(other)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Watermark {
    fn from(millis: i64) -> Self {
        Watermark(millis)
    }
}
