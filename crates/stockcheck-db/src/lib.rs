//! # stockcheck-db: On-Device Change Store
//!
//! SQLite storage for the inventory tables, with the bookkeeping the sync
//! protocol needs: which records changed locally, which columns, and the
//! last committed pull watermark.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        stockcheck Data Flow                             │
//! │                                                                         │
//! │  App write (create / update / mark_deleted)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockcheck-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ RecordRepo    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ SyncStateRepo │    │ 0001_...sql  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/stockcheck.db                                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Record and sync-state repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockcheck_db::{Database, DbConfig};
//! use serde_json::json;
//!
//! let db = Database::new(DbConfig::new("stockcheck.db")).await?;
//! db.run_migrations().await?;
//!
//! let id = db.records().create("scorte", json!({"quantita_in_linea": 4})).await?;
//! assert!(db.records().has_dirty().await?);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::records::{ApplyReport, RecordRepository, RecordStatus, StoredRecord};
pub use repository::sync_state::SyncStateRepository;
