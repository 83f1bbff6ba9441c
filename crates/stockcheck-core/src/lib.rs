//! # stockcheck-core: Pure Sync Types
//!
//! The vocabulary shared by the local change store and the sync
//! orchestrator. Everything here is a plain value: no database, no network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        stockcheck Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Local mutations (create / update / soft-delete)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            stockcheck-db  (dirty tracking, watermark)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ ChangeSet                              │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          ★ stockcheck-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌─────────┐  │   │
//! │  │   │ changeset  │  │ watermark  │  │   pull     │  │ trigger │  │   │
//! │  │   │ ChangeSet  │  │ Watermark  │  │ normalize  │  │ Skip    │  │   │
//! │  │   └────────────┘  └────────────┘  └────────────┘  └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │       stockcheck-sync (orchestrator, pull/push RPC)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`changeset`] - `ChangeSet`, `TableChanges`, snapshot sanitation
//! - [`watermark`] - `Watermark` cursor (ms since epoch)
//! - [`outbound`] - `LocalChanges` collected for push
//! - [`pull`] - Normalization of the two accepted pull-response shapes
//! - [`trigger`] - Trigger sources and skip reasons
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use stockcheck_core::{ChangeSet, Watermark};
//! use serde_json::json;
//!
//! let mut changes = ChangeSet::new();
//! changes
//!     .table_mut("scorte")
//!     .updated
//!     .push(json!({"id": "s1", "quantita_in_linea": 4}).as_object().unwrap().clone());
//! assert!(changes.validate().is_ok());
//!
//! let w = Watermark::EPOCH.advance(Watermark::from_millis(1_000));
//! assert_eq!(w.as_millis(), 1_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod changeset;
pub mod error;
pub mod outbound;
pub mod pull;
pub mod trigger;
pub mod watermark;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use changeset::{record_id, ChangeSet, RawRecord, RecordId, TableChanges};
pub use error::{CoreError, CoreResult};
pub use outbound::{LocalChanges, RecordRevision};
pub use pull::{normalize_pull_response, PulledChanges};
pub use trigger::{SkipReason, SyncTrigger};
pub use watermark::Watermark;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Local column carrying a collected record's dirty status.
pub const STATUS_COLUMN: &str = "_status";

/// Local column listing a collected record's changed columns.
pub const CHANGED_COLUMN: &str = "_changed";

/// Bookkeeping columns that never leave the device; [`ChangeSet::snapshot`]
/// strips exactly these.
pub const LOCAL_COLUMNS: [&str; 2] = [STATUS_COLUMN, CHANGED_COLUMN];
