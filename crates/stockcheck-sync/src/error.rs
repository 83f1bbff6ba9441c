//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  PullFailed             │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  PushFailed             │ │
//! │  │  ConfigLoad/Save│  │                 │  │  MalformedResponse      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Local store    │  │     Lifecycle                               │  │
//! │  │                 │  │                                             │  │
//! │  │  LocalStore     │  │  ShuttingDown / Internal                    │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! "Offline" and "another cycle is running" are not errors; see
//! [`SkipReason`](stockcheck_core::SkipReason).

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid backend or probe URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach the backend at all.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The backend did not answer within the request timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// The backend rejected or failed the pull call.
    #[error("Failed to pull changes: {0}")]
    PullFailed(String),

    /// The backend rejected or failed the push call.
    #[error("Failed to push changes: {0}")]
    PushFailed(String),

    /// Pull returned data that cannot be used.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    // =========================================================================
    // Local Store Errors
    // =========================================================================
    /// Apply, collect, mark or watermark commit failed.
    #[error("Local store error: {0}")]
    LocalStore(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync agent error (including a panicked cycle).
    #[error("Internal error: {0}")]
    Internal(String),

    /// Agent is shutting down.
    #[error("Sync agent is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<stockcheck_db::DbError> for SyncError {
    fn from(err: stockcheck_db::DbError) -> Self {
        SyncError::LocalStore(err.to_string())
    }
}

impl From<stockcheck_core::CoreError> for SyncError {
    fn from(err: stockcheck_core::CoreError) -> Self {
        SyncError::MalformedResponse(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

/// Transport failures of an HTTP call. Status codes are mapped by the caller.
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_decode() {
            SyncError::MalformedResponse(err.to_string())
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the next trigger has a fair chance of succeeding.
    ///
    /// ## Retryable Errors
    /// - Network and timeout failures
    /// - Backend rejections of pull/push
    /// - Local store hiccups (locked database, full pool)
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Data the backend keeps sending malformed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_)
                | SyncError::Timeout(_)
                | SyncError::PullFailed(_)
                | SyncError::PushFailed(_)
                | SyncError::LocalStore(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the backend spoke but said something unusable.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::PullFailed(_)
                | SyncError::PushFailed(_)
                | SyncError::MalformedResponse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Timeout("operation timed out".into()).is_retryable());
        assert!(SyncError::PushFailed("500".into()).is_retryable());

        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::MalformedResponse("null".into()).is_retryable());
    }

    #[test]
    fn test_categories() {
        assert!(SyncError::InvalidUrl("x".into()).is_config_error());
        assert!(SyncError::MalformedResponse("x".into()).is_protocol_error());
        assert!(!SyncError::LocalStore("x".into()).is_protocol_error());
    }

    #[test]
    fn test_core_error_becomes_malformed_response() {
        let err: SyncError = stockcheck_core::CoreError::MalformedResponse("null".into()).into();
        assert!(matches!(err, SyncError::MalformedResponse(_)));
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::PushFailed("permission denied for table scorte".into());
        assert_eq!(
            err.to_string(),
            "Failed to push changes: permission denied for table scorte"
        );
    }
}
