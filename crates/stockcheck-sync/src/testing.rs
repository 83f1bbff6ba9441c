//! In-memory collaborators for orchestrator and agent tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use stockcheck_core::{ChangeSet, LocalChanges, RecordRevision, Watermark};

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::CycleReport;
use crate::protocol::{PullRequest, PushRequest};
use crate::remote::RemoteEndpoint;
use crate::status::{SyncEventEmitter, SyncStatus};
use crate::store::LocalChangeStore;

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Default)]
pub struct FakeStoreState {
    pub watermark: Watermark,
    pub dirty: LocalChanges,
    pub applied: Vec<ChangeSet>,
    pub fail_apply: bool,
}

#[derive(Debug, Default)]
pub struct FakeStore {
    state: Mutex<FakeStoreState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(millis: i64) -> Self {
        let store = Self::default();
        store.lock().watermark = Watermark::from_millis(millis);
        store
    }

    pub fn lock(&self) -> MutexGuard<'_, FakeStoreState> {
        self.state.lock().unwrap()
    }

    /// Adds a locally created record, as the change store would report it.
    pub fn add_created(&self, table: &str, id: &str) {
        let mut state = self.lock();
        let record = json!({"id": id, "_status": "created", "_changed": ""});
        state
            .dirty
            .changes
            .table_mut(table)
            .created
            .push(record.as_object().unwrap().clone());
        state.dirty.revisions.push(RecordRevision {
            table: table.to_string(),
            id: id.to_string(),
            revision: 1,
        });
    }

    pub fn watermark(&self) -> Watermark {
        self.lock().watermark
    }

    pub fn is_dirty(&self) -> bool {
        !self.lock().dirty.is_empty()
    }
}

#[async_trait]
impl LocalChangeStore for FakeStore {
    async fn has_dirty_changes(&self) -> SyncResult<bool> {
        Ok(self.is_dirty())
    }

    async fn apply_remote_changes(&self, changes: &ChangeSet) -> SyncResult<()> {
        let mut state = self.lock();
        if state.fail_apply {
            return Err(SyncError::LocalStore("database is locked".into()));
        }
        state.applied.push(changes.clone());
        Ok(())
    }

    async fn collect_dirty_changes(&self) -> SyncResult<LocalChanges> {
        Ok(self.lock().dirty.clone())
    }

    async fn mark_synced(&self, pushed: &LocalChanges) -> SyncResult<()> {
        let mut state = self.lock();
        if state.dirty == *pushed {
            state.dirty = LocalChanges::default();
        }
        Ok(())
    }

    async fn current_watermark(&self) -> SyncResult<Watermark> {
        Ok(self.watermark())
    }

    async fn commit_watermark(&self, watermark: Watermark) -> SyncResult<Watermark> {
        let mut state = self.lock();
        state.watermark = state.watermark.advance(watermark);
        Ok(state.watermark)
    }

    async fn schema_version(&self) -> SyncResult<Option<u32>> {
        Ok(Some(7))
    }
}

// =============================================================================
// Remote
// =============================================================================

#[derive(Debug)]
pub struct FakeRemote {
    response: Mutex<Value>,
    fail_pull: AtomicBool,
    fail_push: AtomicBool,
    panic_on_pull: AtomicBool,
    pull_gate: Option<Arc<Notify>>,
    pulls: AtomicUsize,
    pushes: AtomicUsize,
    pull_requests: Mutex<Vec<PullRequest>>,
    pushed: Mutex<Vec<ChangeSet>>,
}

impl FakeRemote {
    /// Answers every pull with `{"changes": {}, "timestamp": timestamp}`.
    pub fn new(timestamp: i64) -> Self {
        FakeRemote {
            response: Mutex::new(json!({"changes": {}, "timestamp": timestamp})),
            fail_pull: AtomicBool::new(false),
            fail_push: AtomicBool::new(false),
            panic_on_pull: AtomicBool::new(false),
            pull_gate: None,
            pulls: AtomicUsize::new(0),
            pushes: AtomicUsize::new(0),
            pull_requests: Mutex::new(Vec::new()),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// A remote whose pulls wait for a `notify_one` on the returned handle.
    pub fn gated(timestamp: i64) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let mut remote = Self::new(timestamp);
        remote.pull_gate = Some(gate.clone());
        (remote, gate)
    }

    pub fn respond_with(&self, response: Value) {
        *self.response.lock().unwrap() = response;
    }

    pub fn set_fail_pull(&self, fail: bool) {
        self.fail_pull.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn set_panic_on_pull(&self, panic: bool) {
        self.panic_on_pull.store(panic, Ordering::SeqCst);
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().unwrap().clone()
    }

    pub fn pushed(&self) -> Vec<ChangeSet> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteEndpoint for FakeRemote {
    async fn pull(&self, request: PullRequest) -> SyncResult<Value> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.pull_requests.lock().unwrap().push(request);

        if let Some(ref gate) = self.pull_gate {
            gate.notified().await;
        }
        if self.panic_on_pull.load(Ordering::SeqCst) {
            panic!("remote exploded");
        }
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(SyncError::PullFailed("503 Service Unavailable".into()));
        }
        Ok(self.response.lock().unwrap().clone())
    }

    async fn push(&self, request: PushRequest) -> SyncResult<()> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(SyncError::PushFailed("permission denied".into()));
        }
        self.pushed.lock().unwrap().push(request.changes);
        Ok(())
    }
}

// =============================================================================
// Emitter
// =============================================================================

#[derive(Debug, Default)]
pub struct RecordingEmitter {
    pub statuses: AtomicUsize,
    pub cycles: AtomicUsize,
    pub errors: Mutex<Vec<(String, bool)>>,
}

impl SyncEventEmitter for RecordingEmitter {
    fn emit_status(&self, _status: &SyncStatus) {
        self.statuses.fetch_add(1, Ordering::SeqCst);
    }

    fn emit_cycle(&self, _report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        self.errors
            .lock()
            .unwrap()
            .push((message.to_string(), retryable));
    }
}

/// Yields until `condition` holds, failing the test after too many rounds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Lets spawned tasks run without advancing time.
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}
