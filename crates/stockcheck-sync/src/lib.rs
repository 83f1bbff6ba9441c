//! # stockcheck-sync: Offline-First Sync Engine
//!
//! Keeps the on-device inventory database and the backend in step without
//! ever blocking the app on the network.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncAgent (trigger sources)                 │  │
//! │  │                                                                  │  │
//! │  │  Local writes (debounced) • periodic timer • startup •           │  │
//! │  │  backgrounding • reconnect                                       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncOrchestrator (single flight)                 │  │
//! │  │                                                                  │  │
//! │  │  mode → backoff → lock → connectivity → pull → apply → push →    │  │
//! │  │  mark synced → commit watermark                                  │  │
//! │  └───────┬──────────────────────┬───────────────────────┬───────────┘  │
//! │          ▼                      ▼                       ▼               │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌────────────────────┐    │
//! │  │ Connectivity   │  │  RemoteEndpoint    │  │  LocalChangeStore  │    │
//! │  │ HTTP probe +   │  │  HttpRemote        │  │  SQLite records +  │    │
//! │  │ watch monitor  │  │  (pull/push RPC)   │  │  sync_state        │    │
//! │  └────────────────┘  └────────────────────┘  └────────────────────┘    │
//! │                                                                         │
//! │  STATUS EVENTS (to the host app):                                      │
//! │  • emit_status - state, online, pending changes, next sync             │
//! │  • emit_cycle  - pulled/pushed counts, committed watermark             │
//! │  • emit_error  - failure message + retryable flag                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - Debounce/periodic/lifecycle loop and its handle
//! - [`orchestrator`] - Admission gates and the pull-then-push cycle
//! - [`debounce`] - Deadline bookkeeping for local-change triggers
//! - [`connectivity`] - Reachability oracle, probe and monitor
//! - [`remote`] - Backend endpoint trait and HTTP client
//! - [`protocol`] - Request bodies of the pull/push procedures
//! - [`store`] - Local store seam, implemented for `stockcheck_db::Database`
//! - [`status`] - Status snapshot and event emitter
//! - [`config`] - Sync configuration (mode, timings, backend URL)
//! - [`error`] - Sync error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stockcheck_db::{Database, DbConfig};
//! use stockcheck_sync::{HttpProbe, HttpRemote, SyncAgentBuilder, SyncConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new("stockcheck.db")).await?;
//!
//! let handle = SyncAgentBuilder::new(config.clone())
//!     .with_store(Arc::new(db))
//!     .with_remote(Arc::new(HttpRemote::from_config(&config)?))
//!     .with_connectivity(Arc::new(HttpProbe::from_config(&config)?))
//!     .build()?
//!     .spawn();
//!
//! handle.notify_local_change().await?;
//! let result = handle.sync_now().await;
//! println!("{}", result.message);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod connectivity;
pub mod debounce;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod remote;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use agent::{AgentSettings, AppLifecycle, SyncAgent, SyncAgentBuilder, SyncAgentHandle};
pub use config::{SyncConfig, SyncMode};
pub use connectivity::{ConnectivityMonitor, ConnectivityOracle, HttpProbe, StaticConnectivity};
pub use debounce::Debouncer;
pub use error::{SyncError, SyncResult};
pub use orchestrator::{BackoffPolicy, CycleReport, ManualSyncResult, SyncOrchestrator, SyncOutcome};
pub use protocol::{PullRequest, PushRequest};
pub use remote::{HttpRemote, RemoteEndpoint};
pub use status::{NoOpEmitter, SyncEventEmitter, SyncState, SyncStatus};
pub use store::LocalChangeStore;

pub use stockcheck_core::{SkipReason, SyncTrigger, Watermark};
