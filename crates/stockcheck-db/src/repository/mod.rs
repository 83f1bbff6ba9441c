//! # Repository Module
//!
//! Database repository implementations for the change store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Who uses which repository                            │
//! │                                                                         │
//! │  App writes                       Sync cycle                           │
//! │       │                                │                                │
//! │       │  db.records().update(..)       │  db.records().collect_dirty()  │
//! │       ▼                                ▼                                │
//! │  RecordRepository ◄────────────────────┤                                │
//! │  ├── create / update / mark_deleted    │                                │
//! │  ├── get / list / count_dirty          │                                │
//! │  └── apply_remote / collect_dirty /    │                                │
//! │      mark_synced                       │                                │
//! │                                        │  db.sync_state().watermark()   │
//! │  SyncStateRepository ◄─────────────────┘                                │
//! │  └── watermark / commit_watermark                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`RecordRepository`](records::RecordRepository) - Change-tracked records
//! - [`SyncStateRepository`](sync_state::SyncStateRepository) - Watermark

pub mod records;
pub mod sync_state;
