//! # Sync Orchestrator
//!
//! Runs at most one pull-then-push cycle at a time and decides whether a
//! trigger gets to run one at all.
//!
//! ## Admission
//! ```text
//! trigger ──► mode allows it? ──► backoff window closed? ──► lock free?
//!                 │ no                 │ no (automatic only)     │ no
//!                 ▼                    ▼                         ▼
//!              Disabled            BackingOff                  Busy
//!
//!         ──► backend reachable? ──► dirty records? (LocalChange, Background)
//!                 │ no                   │ no
//!                 ▼                      ▼
//!              Offline              NothingToSync
//! ```
//!
//! ## Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. read watermark W (+ schema version)                                 │
//! │  2. pull(W) ──► normalize ──► validate                                  │
//! │  3. apply remote changes (one transaction)                              │
//! │  4. collect dirty records                                               │
//! │  5. push(snapshot), even when empty                                     │
//! │  6. mark pushed records synced                                          │
//! │  7. commit max(W, server timestamp)                                     │
//! │                                                                         │
//! │  Any failure ends the cycle. The watermark moves only in step 7.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Skips are not failures: only [`SyncOutcome::Failed`] counts toward the
//! backoff window and `consecutive_failures`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use stockcheck_core::{normalize_pull_response, SkipReason, SyncTrigger, Watermark};

use crate::config::{SyncConfig, SyncMode};
use crate::connectivity::ConnectivityOracle;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{PullRequest, PushRequest};
use crate::remote::RemoteEndpoint;
use crate::status::{NoOpEmitter, SyncEventEmitter, SyncState, SyncStatus};
use crate::store::LocalChangeStore;

// =============================================================================
// Outcomes
// =============================================================================

/// Summary of a completed cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub trigger: SyncTrigger,
    /// Remote records in the pull response.
    pub pulled: usize,
    /// Local records sent in the push.
    pub pushed: usize,
    /// Watermark committed at the end of the cycle.
    pub watermark: Watermark,
    /// The pull response carried no usable timestamp; "now" was used.
    pub timestamp_defaulted: bool,
    pub duration_ms: u64,
}

/// Result of one trigger.
#[derive(Debug)]
pub enum SyncOutcome {
    Completed(CycleReport),
    Skipped(SkipReason),
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            SyncOutcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            SyncOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Answer to the user's "sync now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSyncResult {
    pub success: bool,
    pub message: String,
}

impl ManualSyncResult {
    pub const BUSY: &'static str = "Sync already in progress.";
    pub const OFFLINE: &'static str = "No internet connection. Check Wi-Fi or mobile data.";
    pub const DISABLED: &'static str = "Sync is disabled on this device.";
    pub const CHANGES_SENT: &'static str = "Sync completed. Local changes sent to the server.";
    pub const UP_TO_DATE: &'static str = "Sync completed. Database already up to date.";

    fn new(success: bool, message: impl Into<String>) -> Self {
        ManualSyncResult {
            success,
            message: message.into(),
        }
    }

    pub fn from_outcome(outcome: &SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Completed(report) if report.pushed > 0 => {
                Self::new(true, Self::CHANGES_SENT)
            }
            SyncOutcome::Completed(_) => Self::new(true, Self::UP_TO_DATE),
            SyncOutcome::Skipped(SkipReason::Busy) => Self::new(false, Self::BUSY),
            SyncOutcome::Skipped(SkipReason::Offline) => Self::new(false, Self::OFFLINE),
            SyncOutcome::Skipped(SkipReason::Disabled) => Self::new(false, Self::DISABLED),
            SyncOutcome::Skipped(reason) => Self::new(false, format!("Sync skipped: {reason}.")),
            SyncOutcome::Failed(err) => Self::new(false, format!("Error: {err}")),
        }
    }
}

// =============================================================================
// Backoff
// =============================================================================

/// Retry spacing after failed cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    fn build(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial,
            initial_interval: self.initial,
            max_interval: self.max,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

struct RetryWindow {
    backoff: Option<ExponentialBackoff>,
    retry_at: Option<Instant>,
}

impl RetryWindow {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.retry_at
            .filter(|at| *at > now)
            .map(|at| at - now)
    }

    fn record_failure(&mut self, now: Instant) -> Option<Duration> {
        let delay = self.backoff.as_mut().and_then(|b| b.next_backoff())?;
        self.retry_at = Some(now + delay);
        Some(delay)
    }

    fn record_success(&mut self) {
        if let Some(ref mut backoff) = self.backoff {
            backoff.reset();
        }
        self.retry_at = None;
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// The single sync engine of the process.
pub struct SyncOrchestrator {
    store: Arc<dyn LocalChangeStore>,
    remote: Arc<dyn RemoteEndpoint>,
    connectivity: Arc<dyn ConnectivityOracle>,
    emitter: Arc<dyn SyncEventEmitter>,
    mode: SyncMode,
    include_schema_version: bool,
    in_flight: AtomicBool,
    idle: Notify,
    status: RwLock<SyncStatus>,
    retry: Mutex<RetryWindow>,
}

/// Holds the single-flight lock; releasing it also returns the state to idle.
struct CycleGuard<'a> {
    orchestrator: &'a SyncOrchestrator,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator
            .update_status(|status| status.state = SyncState::Idle);
        self.orchestrator.in_flight.store(false, Ordering::Release);
        self.orchestrator.idle.notify_waiters();
    }
}

impl SyncOrchestrator {
    /// Creates an orchestrator in `Auto` mode with the default backoff.
    pub fn new(
        store: Arc<dyn LocalChangeStore>,
        remote: Arc<dyn RemoteEndpoint>,
        connectivity: Arc<dyn ConnectivityOracle>,
    ) -> Self {
        SyncOrchestrator {
            store,
            remote,
            connectivity,
            emitter: Arc::new(NoOpEmitter),
            mode: SyncMode::Auto,
            include_schema_version: false,
            in_flight: AtomicBool::new(false),
            idle: Notify::new(),
            status: RwLock::new(SyncStatus::default()),
            retry: Mutex::new(RetryWindow {
                backoff: Some(BackoffPolicy::default().build()),
                retry_at: None,
            }),
        }
    }

    /// Creates an orchestrator with mode, backoff and wire options from `config`.
    pub fn from_config(
        config: &SyncConfig,
        store: Arc<dyn LocalChangeStore>,
        remote: Arc<dyn RemoteEndpoint>,
        connectivity: Arc<dyn ConnectivityOracle>,
    ) -> Self {
        let backoff = config.sync.backoff_enabled.then(|| BackoffPolicy {
            initial: config.initial_backoff(),
            max: config.max_backoff(),
        });

        Self::new(store, remote, connectivity)
            .with_mode(config.mode())
            .with_schema_version(config.remote.include_schema_version)
            .with_backoff(backoff)
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sends the local schema version with every pull.
    pub fn with_schema_version(mut self, include: bool) -> Self {
        self.include_schema_version = include;
        self
    }

    /// `None` disables the retry window.
    pub fn with_backoff(mut self, policy: Option<BackoffPolicy>) -> Self {
        self.retry = Mutex::new(RetryWindow {
            backoff: policy.map(|p| p.build()),
            retry_at: None,
        });
        self
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Resolves once no cycle is running.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if !self.is_syncing() {
                return;
            }
            notified.await;
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        let mut status = self
            .status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        status.mode = self.mode;
        status
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// User-initiated sync. Always resolves, whatever happens in the cycle.
    ///
    /// The cycle runs on its own task: dropping the returned future does not
    /// cancel it, and a panic in a collaborator becomes `success: false`.
    pub async fn sync_now(self: &Arc<Self>) -> ManualSyncResult {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run(SyncTrigger::Manual).await });

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(error = %join_error, "Manual sync task died");
                SyncOutcome::Failed(SyncError::Internal(format!(
                    "sync task failed: {join_error}"
                )))
            }
        };

        let result = ManualSyncResult::from_outcome(&outcome);
        info!(success = result.success, outcome = %result.message, "Manual sync finished");
        result
    }

    /// Automatic trigger boundary: skips are logged at debug, never surfaced.
    pub async fn trigger(&self, trigger: SyncTrigger) -> SyncOutcome {
        let outcome = self.run(trigger).await;
        if let SyncOutcome::Skipped(reason) = &outcome {
            debug!(%trigger, %reason, "Sync attempt skipped");
        }
        outcome
    }

    /// Runs the admission checks and, if they pass, one cycle.
    pub async fn run(&self, trigger: SyncTrigger) -> SyncOutcome {
        if let Some(reason) = self.admission(trigger) {
            return SyncOutcome::Skipped(reason);
        }

        let Some(_guard) = self.try_acquire() else {
            return SyncOutcome::Skipped(SkipReason::Busy);
        };

        let online = self.connectivity.is_reachable().await;
        self.update_status(|status| status.is_online = online);
        if !online {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }

        if trigger.requires_dirty_changes() {
            match self.store.has_dirty_changes().await {
                Ok(true) => {}
                Ok(false) => {
                    self.update_status(|status| status.has_unsynced_changes = false);
                    return SyncOutcome::Skipped(SkipReason::NothingToSync);
                }
                Err(err) => return self.finish_failed(trigger, err),
            }
        }

        let status = self.update_status(|status| status.state = SyncState::Syncing);
        self.emitter.emit_status(&status);

        match self.cycle(trigger).await {
            Ok(report) => self.finish_completed(report).await,
            Err(err) => self.finish_failed(trigger, err),
        }
    }

    // =========================================================================
    // Status hooks for the agent
    // =========================================================================

    /// Re-reads the dirty flag and watermark from the store.
    pub async fn refresh_status(&self) -> SyncResult<SyncStatus> {
        let dirty = self.store.has_dirty_changes().await?;
        let watermark = self.store.current_watermark().await?;
        Ok(self.update_status(|status| {
            status.has_unsynced_changes = dirty;
            status.watermark = watermark;
        }))
    }

    pub fn set_online(&self, online: bool) {
        self.update_status(|status| status.is_online = online);
    }

    pub fn set_next_sync_at(&self, next: Option<DateTime<Utc>>) {
        self.update_status(|status| status.next_sync_at = next);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn admission(&self, trigger: SyncTrigger) -> Option<SkipReason> {
        let allowed = if trigger.is_automatic() {
            self.mode.allows_automatic()
        } else {
            self.mode.is_sync_enabled()
        };
        if !allowed {
            return Some(SkipReason::Disabled);
        }

        if trigger.is_automatic() {
            if let Some(remaining) = self.lock_retry().remaining(Instant::now()) {
                return Some(SkipReason::BackingOff(remaining));
            }
        }
        None
    }

    fn try_acquire(&self) -> Option<CycleGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { orchestrator: self })
    }

    async fn cycle(&self, trigger: SyncTrigger) -> SyncResult<CycleReport> {
        let started = Instant::now();

        let watermark = self.store.current_watermark().await?;
        let mut request = PullRequest::new(watermark);
        if self.include_schema_version {
            request = request.with_schema_version(self.store.schema_version().await?);
        }

        info!(%trigger, last_pulled_at = %watermark, "Sync cycle started");

        let raw = self.remote.pull(request).await?;
        let pulled = normalize_pull_response(raw)?;
        if pulled.timestamp_defaulted {
            warn!(
                timestamp = %pulled.timestamp,
                "Pull response had no usable timestamp, using local time"
            );
        }

        self.store.apply_remote_changes(&pulled.changes).await?;

        let local = self.store.collect_dirty_changes().await?;
        self.remote
            .push(PushRequest {
                changes: local.changes.snapshot(),
            })
            .await?;
        self.store.mark_synced(&local).await?;

        let committed = self
            .store
            .commit_watermark(watermark.advance(pulled.timestamp))
            .await?;

        Ok(CycleReport {
            trigger,
            pulled: pulled.changes.record_count(),
            pushed: local.record_count(),
            watermark: committed,
            timestamp_defaulted: pulled.timestamp_defaulted,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn finish_completed(&self, report: CycleReport) -> SyncOutcome {
        self.lock_retry().record_success();

        let dirty = self.store.has_dirty_changes().await.ok();
        let status = self.update_status(|status| {
            status.state = SyncState::Idle;
            status.last_sync_at = Some(Utc::now());
            status.last_error = None;
            status.consecutive_failures = 0;
            status.watermark = report.watermark;
            if let Some(dirty) = dirty {
                status.has_unsynced_changes = dirty;
            }
        });

        info!(
            trigger = %report.trigger,
            pulled = report.pulled,
            pushed = report.pushed,
            watermark = %report.watermark,
            duration_ms = report.duration_ms,
            "Sync cycle completed"
        );

        self.emitter.emit_cycle(&report);
        self.emitter.emit_status(&status);
        SyncOutcome::Completed(report)
    }

    fn finish_failed(&self, trigger: SyncTrigger, err: SyncError) -> SyncOutcome {
        let retry_in = self.lock_retry().record_failure(Instant::now());
        let message = err.to_string();

        let status = self.update_status(|status| {
            status.state = SyncState::Idle;
            status.last_error = Some(message.clone());
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        });

        if trigger.is_automatic() {
            warn!(
                %trigger,
                error = %err,
                failures = status.consecutive_failures,
                retry_in = ?retry_in,
                "Sync cycle failed"
            );
        } else {
            error!(%trigger, error = %err, "Sync cycle failed");
        }

        self.emitter.emit_error(&message, err.is_retryable());
        self.emitter.emit_status(&status);
        SyncOutcome::Failed(err)
    }

    fn update_status(&self, apply: impl FnOnce(&mut SyncStatus)) -> SyncStatus {
        let mut status = self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut status);
        let mut snapshot = status.clone();
        snapshot.mode = self.mode;
        snapshot
    }

    fn lock_retry(&self) -> MutexGuard<'_, RetryWindow> {
        self.retry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::StaticConnectivity;
    use crate::testing::{settle, wait_until, FakeRemote, FakeStore, RecordingEmitter};
    use serde_json::json;

    fn orchestrator(
        store: &Arc<FakeStore>,
        remote: &Arc<FakeRemote>,
        online: bool,
    ) -> SyncOrchestrator {
        SyncOrchestrator::new(
            store.clone(),
            remote.clone(),
            Arc::new(StaticConnectivity::new(online)),
        )
    }

    #[tokio::test]
    async fn test_first_sync_on_fresh_device() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let orch = Arc::new(orchestrator(&store, &remote, true));

        let result = orch.sync_now().await;

        assert!(result.success);
        assert_eq!(result.message, ManualSyncResult::UP_TO_DATE);
        assert_eq!(
            remote.pull_requests()[0].last_pulled_at,
            Watermark::EPOCH
        );
        assert_eq!(remote.pushes(), 1);
        assert!(remote.pushed()[0].is_empty());
        assert_eq!(store.watermark(), Watermark::from_millis(1_000));

        let status = orch.status();
        assert_eq!(status.state, SyncState::Idle);
        assert!(status.last_sync_at.is_some());
        assert_eq!(status.watermark, Watermark::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_push_failure_keeps_watermark_and_dirty_records() {
        let store = Arc::new(FakeStore::with_watermark(1_000));
        store.add_created("scorte", "s1");
        let remote = Arc::new(FakeRemote::new(2_000));
        remote.set_fail_push(true);
        let orch = Arc::new(orchestrator(&store, &remote, true));

        let outcome = orch.run(SyncTrigger::Periodic).await;
        assert!(matches!(outcome.error(), Some(SyncError::PushFailed(_))));
        assert_eq!(store.watermark(), Watermark::from_millis(1_000));
        assert!(store.is_dirty());
        assert_eq!(orch.status().consecutive_failures, 1);
        assert!(!orch.is_syncing());

        remote.set_fail_push(false);
        let result = orch.sync_now().await;

        assert!(result.success);
        assert_eq!(result.message, ManualSyncResult::CHANGES_SENT);
        assert!(!store.is_dirty());
        assert_eq!(store.watermark(), Watermark::from_millis(2_000));
        assert_eq!(orch.status().consecutive_failures, 0);
        assert!(orch.status().last_error.is_none());
    }

    #[tokio::test]
    async fn test_pushed_snapshot_has_no_local_columns() {
        let store = Arc::new(FakeStore::new());
        store.add_created("scorte", "s1");
        let remote = Arc::new(FakeRemote::new(1_000));
        let orch = orchestrator(&store, &remote, true);

        let outcome = orch.run(SyncTrigger::Periodic).await;
        assert!(outcome.is_completed());

        let pushed = remote.pushed();
        let record = &pushed[0].table("scorte").unwrap().created[0];
        assert_eq!(record["id"], "s1");
        assert!(!record.contains_key("_status"));
        assert!(!record.contains_key("_changed"));
    }

    #[tokio::test]
    async fn test_malformed_pull_fails_before_push() {
        let store = Arc::new(FakeStore::with_watermark(500));
        let remote = Arc::new(FakeRemote::new(1_000));
        remote.respond_with(serde_json::Value::Null);
        let orch = orchestrator(&store, &remote, true);

        let outcome = orch.run(SyncTrigger::Startup).await;

        assert!(matches!(
            outcome.error(),
            Some(SyncError::MalformedResponse(_))
        ));
        assert_eq!(remote.pushes(), 0);
        assert_eq!(store.watermark(), Watermark::from_millis(500));
    }

    #[tokio::test]
    async fn test_apply_failure_keeps_watermark() {
        let store = Arc::new(FakeStore::with_watermark(500));
        store.lock().fail_apply = true;
        let remote = Arc::new(FakeRemote::new(1_000));
        let orch = orchestrator(&store, &remote, true);

        let outcome = orch.run(SyncTrigger::Periodic).await;

        assert!(matches!(outcome.error(), Some(SyncError::LocalStore(_))));
        assert_eq!(remote.pushes(), 0);
        assert_eq!(store.watermark(), Watermark::from_millis(500));
    }

    #[tokio::test]
    async fn test_missing_timestamp_defaults_to_now() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(0));
        remote.respond_with(json!({"scorte": {"created": [], "updated": [], "deleted": []}}));
        let orch = orchestrator(&store, &remote, true);

        let before = Watermark::now();
        let SyncOutcome::Completed(report) = orch.run(SyncTrigger::Periodic).await else {
            panic!("expected a completed cycle");
        };

        assert!(report.timestamp_defaulted);
        assert!(report.watermark >= before);
        assert_eq!(store.watermark(), report.watermark);
    }

    #[tokio::test]
    async fn test_watermark_never_moves_backwards() {
        let store = Arc::new(FakeStore::with_watermark(5_000));
        let remote = Arc::new(FakeRemote::new(3_000));
        let orch = orchestrator(&store, &remote, true);

        assert!(orch.run(SyncTrigger::Periodic).await.is_completed());
        assert_eq!(store.watermark(), Watermark::from_millis(5_000));
    }

    #[tokio::test]
    async fn test_pulled_changes_are_applied() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(0));
        remote.respond_with(json!({
            "changes": {
                "scorte": {"created": [], "updated": [{"id": "s1", "quantita_in_linea": 3}], "deleted": ["s2"]}
            },
            "timestamp": 4_000
        }));
        let orch = orchestrator(&store, &remote, true);

        let SyncOutcome::Completed(report) = orch.run(SyncTrigger::Periodic).await else {
            panic!("expected a completed cycle");
        };

        assert_eq!(report.pulled, 2);
        assert_eq!(store.lock().applied.len(), 1);
        assert_eq!(store.watermark(), Watermark::from_millis(4_000));
    }

    #[tokio::test]
    async fn test_offline_makes_no_network_calls() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let orch = Arc::new(orchestrator(&store, &remote, false));

        let outcome = orch.trigger(SyncTrigger::Periodic).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::Offline));

        let result = orch.sync_now().await;
        assert!(!result.success);
        assert_eq!(result.message, ManualSyncResult::OFFLINE);

        assert_eq!(remote.pulls(), 0);
        assert_eq!(remote.pushes(), 0);
        assert!(!orch.status().is_online);
        assert_eq!(orch.status().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_local_change_trigger_needs_dirty_records() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let orch = orchestrator(&store, &remote, true);

        let outcome = orch.run(SyncTrigger::LocalChange).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::NothingToSync));
        assert_eq!(remote.pulls(), 0);

        store.add_created("scorte", "s1");
        assert!(orch.run(SyncTrigger::Background).await.is_completed());
        assert_eq!(remote.pulls(), 1);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let store = Arc::new(FakeStore::new());
        let (remote, gate) = FakeRemote::gated(1_000);
        let remote = Arc::new(remote);
        let orch = Arc::new(orchestrator(&store, &remote, true));

        let running = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run(SyncTrigger::Periodic).await })
        };
        wait_until(|| remote.pulls() == 1).await;
        assert!(orch.is_syncing());
        assert!(orch.status().is_syncing());

        let outcome = orch.run(SyncTrigger::ConnectivityRestored).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::Busy));

        let result = orch.sync_now().await;
        assert!(!result.success);
        assert_eq!(result.message, ManualSyncResult::BUSY);

        gate.notify_one();
        assert!(running.await.unwrap().is_completed());

        assert_eq!(remote.pulls(), 1);
        assert!(!orch.is_syncing());
        assert_eq!(orch.status().state, SyncState::Idle);
    }

    #[tokio::test]
    async fn test_wait_idle_outlasts_running_cycle() {
        let store = Arc::new(FakeStore::new());
        store.add_created("scorte", "s1");
        let (remote, gate) = FakeRemote::gated(1_000);
        let remote = Arc::new(remote);
        let orch = Arc::new(orchestrator(&store, &remote, true));

        // Idle already: resolves at once.
        orch.wait_idle().await;

        let running = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run(SyncTrigger::Background).await })
        };
        wait_until(|| remote.pulls() == 1).await;

        let waiter = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.wait_idle().await })
        };
        settle().await;
        assert!(!waiter.is_finished());

        gate.notify_one();
        waiter.await.unwrap();
        assert!(!orch.is_syncing());
        assert!(!store.is_dirty());
        assert!(running.await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_panicking_remote_resolves_manual_sync() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        remote.set_panic_on_pull(true);
        let orch = Arc::new(orchestrator(&store, &remote, true));

        let result = orch.sync_now().await;
        assert!(!result.success);
        assert!(result.message.starts_with("Error: "));
        assert!(!orch.is_syncing());

        remote.set_panic_on_pull(false);
        assert!(orch.sync_now().await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_after_automatic_failure() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        remote.set_fail_pull(true);
        let orch = Arc::new(orchestrator(&store, &remote, true).with_backoff(Some(
            BackoffPolicy {
                initial: Duration::from_secs(5),
                max: Duration::from_secs(60),
            },
        )));

        assert!(orch.run(SyncTrigger::Periodic).await.error().is_some());

        let outcome = orch.run(SyncTrigger::Periodic).await;
        assert!(matches!(
            outcome.skip_reason(),
            Some(SkipReason::BackingOff(_))
        ));
        assert_eq!(remote.pulls(), 1);

        // Manual triggers ignore the window.
        assert!(!orch.sync_now().await.success);
        assert_eq!(remote.pulls(), 2);

        remote.set_fail_pull(false);
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(orch.run(SyncTrigger::Periodic).await.is_completed());
        assert!(orch.run(SyncTrigger::Periodic).await.is_completed());
        assert_eq!(remote.pulls(), 4);
    }

    #[tokio::test]
    async fn test_backoff_disabled() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        remote.set_fail_pull(true);
        let orch = orchestrator(&store, &remote, true).with_backoff(None);

        assert!(orch.run(SyncTrigger::Periodic).await.error().is_some());
        assert!(orch.run(SyncTrigger::Periodic).await.error().is_some());
        assert_eq!(remote.pulls(), 2);
    }

    #[tokio::test]
    async fn test_modes() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));

        let manual_only = Arc::new(orchestrator(&store, &remote, true).with_mode(SyncMode::Manual));
        assert_eq!(
            manual_only.run(SyncTrigger::Periodic).await.skip_reason(),
            Some(SkipReason::Disabled)
        );
        assert!(manual_only.sync_now().await.success);

        let offline = Arc::new(orchestrator(&store, &remote, true).with_mode(SyncMode::Offline));
        let result = offline.sync_now().await;
        assert!(!result.success);
        assert_eq!(result.message, ManualSyncResult::DISABLED);
        assert_eq!(offline.status().mode, SyncMode::Offline);

        assert_eq!(remote.pulls(), 1);
    }

    #[tokio::test]
    async fn test_schema_version_sent_when_enabled() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let orch = orchestrator(&store, &remote, true).with_schema_version(true);

        assert!(orch.run(SyncTrigger::Startup).await.is_completed());
        assert_eq!(remote.pull_requests()[0].schema_version, Some(7));
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let emitter = Arc::new(RecordingEmitter::default());
        let orch = orchestrator(&store, &remote, true)
            .with_emitter(emitter.clone())
            .with_backoff(None);

        assert!(orch.run(SyncTrigger::Periodic).await.is_completed());
        assert_eq!(emitter.cycles.load(Ordering::SeqCst), 1);

        remote.set_fail_push(true);
        assert!(orch.run(SyncTrigger::Periodic).await.error().is_some());

        let errors = emitter.errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].0.contains("permission denied"));
        assert!(errors[0].1);
        // syncing + idle per cycle
        assert_eq!(emitter.statuses.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_refresh_status() {
        let store = Arc::new(FakeStore::with_watermark(2_000));
        store.add_created("scorte", "s1");
        let remote = Arc::new(FakeRemote::new(1_000));
        let orch = orchestrator(&store, &remote, true);

        let status = orch.refresh_status().await.unwrap();
        assert!(status.has_unsynced_changes);
        assert_eq!(status.watermark, Watermark::from_millis(2_000));
    }

    #[test]
    fn test_manual_result_serializes() {
        let result = ManualSyncResult::from_outcome(&SyncOutcome::Failed(SyncError::PullFailed(
            "boom".into(),
        )));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Error: Failed to pull changes: boom");
    }
}
