//! # Error Types
//!
//! Domain-specific error types for stockcheck-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockcheck-core errors (this file)                                    │
//! │  └── CoreError        - Malformed change sets / pull responses         │
//! │                                                                         │
//! │  stockcheck-db errors (separate crate)                                 │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  stockcheck-sync errors (separate crate)                               │
//! │  └── SyncError        - Everything a sync cycle can hit                │
//! │                                                                         │
//! │  Flow: CoreError → SyncError::MalformedResponse → manual-sync message  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Structural problems with change data.
///
/// Raised at the ingress boundary, before anything touches the local store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A created/updated record has no string `id`.
    #[error("Record in table '{table}' has no string id")]
    MissingRecordId { table: String },

    /// The same id appears more than once within one table.
    ///
    /// ## When This Occurs
    /// - Backend returned a record in both `updated` and `deleted`
    /// - A buggy store emitted the same row twice
    #[error("Record '{id}' appears more than once in table '{table}'")]
    DuplicateRecord { table: String, id: String },

    /// The pull response is neither a wrapper nor a bare change set.
    #[error("Malformed pull response: {0}")]
    MalformedResponse(String),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::DuplicateRecord {
            table: "scorte".to_string(),
            id: "abc".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Record 'abc' appears more than once in table 'scorte'"
        );

        let err = CoreError::MissingRecordId {
            table: "prodotti".to_string(),
        };
        assert_eq!(err.to_string(), "Record in table 'prodotti' has no string id");
    }
}
