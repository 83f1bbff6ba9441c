//! # Sync Agent
//!
//! Long-lived task that turns app events and timers into sync triggers.
//! The orchestrator decides whether a trigger actually runs.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  SyncAgentHandle ──mpsc──┐                                             │
//! │   notify_local_change    │     ┌────────────────────────────────────┐  │
//! │   app_lifecycle          ├────►│  select! loop                      │  │
//! │   shutdown               │     │                                    │  │
//! │                          │     │  • debounce deadline  → LocalChange│  │
//! │  ConnectivityMonitor ────┘     │  • periodic interval  → Periodic   │  │
//! │   (watch: offline → online)    │  • status poll        → refresh    │  │
//! │                                │  • lifecycle          → Background │  │
//! │                                │  • reconnect          → Restored   │  │
//! │                                └──────────────┬─────────────────────┘  │
//! │                                               │ tokio::spawn            │
//! │                                               ▼                         │
//! │                                ┌────────────────────────────────────┐  │
//! │                                │  SyncOrchestrator (single flight)  │  │
//! │                                └────────────────────────────────────┘  │
//! │                                                                         │
//! │  sync_now / status go straight to the orchestrator.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cycles run on their own tasks, so a slow network never stalls the loop.
//! Shutting the loop down does not cancel them either; hosts wait on
//! [`SyncOrchestrator::wait_idle`] before closing the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use stockcheck_core::SyncTrigger;

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityOracle, StaticConnectivity};
use crate::debounce::Debouncer;
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{ManualSyncResult, SyncOrchestrator};
use crate::remote::RemoteEndpoint;
use crate::status::{SyncEventEmitter, SyncStatus};
use crate::store::LocalChangeStore;

const COMMAND_BUFFER: usize = 64;

// =============================================================================
// Settings & Commands
// =============================================================================

/// Timers and lifecycle switches of the agent loop.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub debounce_window: Duration,
    pub periodic_interval: Duration,
    pub status_poll_interval: Duration,
    pub sync_on_startup: bool,
    pub sync_on_background: bool,
    pub sync_on_reconnect: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings {
            debounce_window: Duration::from_millis(500),
            periodic_interval: Duration::from_secs(300),
            status_poll_interval: Duration::from_secs(5),
            sync_on_startup: true,
            sync_on_background: true,
            sync_on_reconnect: true,
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        AgentSettings {
            debounce_window: config.debounce_window(),
            periodic_interval: config.periodic_interval(),
            status_poll_interval: config.status_poll_interval(),
            sync_on_startup: config.sync.sync_on_startup,
            sync_on_background: config.sync.sync_on_background,
            sync_on_reconnect: config.sync.sync_on_reconnect,
        }
    }
}

/// Foreground/background transitions reported by the host app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Foreground,
    Background,
}

#[derive(Debug)]
enum AgentCommand {
    LocalChange,
    Lifecycle(AppLifecycle),
    Shutdown,
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Owns the trigger sources; spawn it to start the loop.
pub struct SyncAgent {
    orchestrator: Arc<SyncOrchestrator>,
    settings: AgentSettings,
    connectivity: Option<watch::Receiver<bool>>,
    debouncer: Debouncer,
}

impl SyncAgent {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, settings: AgentSettings) -> Self {
        let debouncer = Debouncer::new(settings.debounce_window);
        SyncAgent {
            orchestrator,
            settings,
            connectivity: None,
            debouncer,
        }
    }

    /// Subscribes to reachability changes; offline → online fires a sync.
    pub fn with_connectivity(mut self, updates: watch::Receiver<bool>) -> Self {
        self.connectivity = Some(updates);
        self
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Starts the loop on the current runtime.
    pub fn spawn(self) -> SyncAgentHandle {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let handle = SyncAgentHandle {
            commands,
            orchestrator: Arc::clone(&self.orchestrator),
        };
        tokio::spawn(self.run(receiver));
        handle
    }

    async fn run(mut self, mut commands: mpsc::Receiver<AgentCommand>) {
        let period = self.settings.periodic_interval;
        let mut periodic = time::interval_at(Instant::now() + period, period);
        periodic.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut status_poll = time::interval(self.settings.status_poll_interval);
        status_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut connectivity = self.connectivity.take();
        let mut was_online = connectivity
            .as_ref()
            .map(|updates| *updates.borrow())
            .unwrap_or(true);

        info!(
            debounce_ms = self.settings.debounce_window.as_millis() as u64,
            periodic_secs = period.as_secs(),
            mode = %self.orchestrator.mode(),
            "Sync agent started"
        );

        self.schedule_next_periodic();
        if self.settings.sync_on_startup {
            self.spawn_cycle(SyncTrigger::Startup);
        }

        loop {
            let debounce_deadline = self.debouncer.deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(AgentCommand::LocalChange) => {
                        self.debouncer.request();
                    }
                    Some(AgentCommand::Lifecycle(event)) => self.on_lifecycle(event),
                    Some(AgentCommand::Shutdown) | None => break,
                },

                _ = time::sleep_until(debounce_deadline.unwrap_or_else(Instant::now)),
                    if debounce_deadline.is_some() =>
                {
                    let coalesced = self.debouncer.take();
                    debug!(coalesced, "Debounce window elapsed");
                    self.spawn_cycle(SyncTrigger::LocalChange);
                }

                _ = periodic.tick() => {
                    self.schedule_next_periodic();
                    self.spawn_cycle(SyncTrigger::Periodic);
                }

                _ = status_poll.tick() => self.spawn_status_refresh(),

                update = connectivity_changed(&mut connectivity) => match update {
                    Some(online) => {
                        self.orchestrator.set_online(online);
                        if online && !was_online && self.settings.sync_on_reconnect {
                            info!("Connectivity restored");
                            self.spawn_cycle(SyncTrigger::ConnectivityRestored);
                        }
                        was_online = online;
                    }
                    None => {
                        debug!("Connectivity updates closed");
                        connectivity = None;
                    }
                },
            }
        }

        self.orchestrator.set_next_sync_at(None);
        info!("Sync agent stopped");
    }

    fn on_lifecycle(&mut self, event: AppLifecycle) {
        debug!(?event, "App lifecycle changed");
        match event {
            AppLifecycle::Background => {
                if self.settings.sync_on_background {
                    // The background cycle covers any pending debounce.
                    self.debouncer.take();
                    self.spawn_cycle(SyncTrigger::Background);
                }
            }
            AppLifecycle::Foreground => self.spawn_status_refresh(),
        }
    }

    fn spawn_cycle(&self, trigger: SyncTrigger) {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            orchestrator.trigger(trigger).await;
        });
    }

    fn spawn_status_refresh(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            if let Err(e) = orchestrator.refresh_status().await {
                warn!(error = %e, "Failed to refresh sync status");
            }
        });
    }

    fn schedule_next_periodic(&self) {
        let next = chrono::Duration::from_std(self.settings.periodic_interval)
            .ok()
            .map(|period| Utc::now() + period);
        self.orchestrator.set_next_sync_at(next);
    }
}

/// Next reachability value, `None` once the publisher is gone.
async fn connectivity_changed(updates: &mut Option<watch::Receiver<bool>>) -> Option<bool> {
    match updates {
        Some(rx) => rx.changed().await.ok().map(|()| *rx.borrow_and_update()),
        None => std::future::pending().await,
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running SyncAgent from outside.
///
/// Cheap to clone; the host app keeps one per screen that needs it.
#[derive(Clone)]
pub struct SyncAgentHandle {
    commands: mpsc::Sender<AgentCommand>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl SyncAgentHandle {
    /// Reports a local write; syncs once writes pause for the debounce window.
    pub async fn notify_local_change(&self) -> SyncResult<()> {
        self.send(AgentCommand::LocalChange).await
    }

    pub async fn app_lifecycle(&self, event: AppLifecycle) -> SyncResult<()> {
        self.send(AgentCommand::Lifecycle(event)).await
    }

    /// User-initiated sync; see [`SyncOrchestrator::sync_now`].
    pub async fn sync_now(&self) -> ManualSyncResult {
        self.orchestrator.sync_now().await
    }

    /// Gets the current sync status.
    pub fn status(&self) -> SyncStatus {
        self.orchestrator.status()
    }

    /// Signals the agent to shut down. In-flight cycles run to completion.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(AgentCommand::Shutdown).await;
    }

    /// Resolves once the agent loop has exited.
    pub async fn closed(&self) {
        self.commands.closed().await
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn send(&self, command: AgentCommand) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating SyncAgent with options.
pub struct SyncAgentBuilder {
    config: SyncConfig,
    store: Option<Arc<dyn LocalChangeStore>>,
    remote: Option<Arc<dyn RemoteEndpoint>>,
    connectivity: Option<Arc<dyn ConnectivityOracle>>,
    connectivity_updates: Option<watch::Receiver<bool>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
}

impl SyncAgentBuilder {
    /// Creates a new builder with the given config.
    pub fn new(config: SyncConfig) -> Self {
        SyncAgentBuilder {
            config,
            store: None,
            remote: None,
            connectivity: None,
            connectivity_updates: None,
            emitter: None,
        }
    }

    /// Sets the local change store.
    pub fn with_store(mut self, store: Arc<dyn LocalChangeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the backend endpoint.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteEndpoint>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Sets the oracle checked before every cycle. Defaults to "always online".
    pub fn with_connectivity(mut self, oracle: Arc<dyn ConnectivityOracle>) -> Self {
        self.connectivity = Some(oracle);
        self
    }

    /// Sets the reachability feed that triggers a sync on reconnect.
    pub fn with_connectivity_updates(mut self, updates: watch::Receiver<bool>) -> Self {
        self.connectivity_updates = Some(updates);
        self
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Builds the SyncAgent. Fails on an invalid config.
    pub fn build(self) -> SyncResult<SyncAgent> {
        self.config.validate()?;

        let store = self
            .store
            .ok_or_else(|| SyncError::InvalidConfig("Local store required".into()))?;
        let remote = self
            .remote
            .ok_or_else(|| SyncError::InvalidConfig("Remote endpoint required".into()))?;
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(StaticConnectivity::default()));

        let mut orchestrator =
            SyncOrchestrator::from_config(&self.config, store, remote, connectivity);
        if let Some(emitter) = self.emitter {
            orchestrator = orchestrator.with_emitter(emitter);
        }

        let mut agent = SyncAgent::new(
            Arc::new(orchestrator),
            AgentSettings::from_config(&self.config),
        );
        if let Some(updates) = self.connectivity_updates {
            agent = agent.with_connectivity(updates);
        }
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{settle, wait_until, FakeRemote, FakeStore};

    fn test_settings() -> AgentSettings {
        AgentSettings {
            sync_on_startup: false,
            ..Default::default()
        }
    }

    fn spawn_agent(
        store: &Arc<FakeStore>,
        remote: &Arc<FakeRemote>,
        connectivity: &Arc<StaticConnectivity>,
        settings: AgentSettings,
    ) -> SyncAgentHandle {
        let orchestrator = SyncOrchestrator::new(store.clone(), remote.clone(), connectivity.clone());
        SyncAgent::new(Arc::new(orchestrator), settings).spawn()
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_writes_syncs_once_after_quiet_period() {
        let store = Arc::new(FakeStore::new());
        store.add_created("scorte", "s1");
        let remote = Arc::new(FakeRemote::new(1_000));
        let online = Arc::new(StaticConnectivity::new(true));
        let handle = spawn_agent(&store, &remote, &online, test_settings());

        // Writes at t = 0, 20, 40, 60, 80 ms.
        for i in 0..5 {
            if i > 0 {
                time::sleep(Duration::from_millis(20)).await;
            }
            handle.notify_local_change().await.unwrap();
        }

        time::sleep(Duration::from_millis(490)).await;
        settle().await;
        assert_eq!(remote.pulls(), 0);

        time::sleep(Duration::from_millis(20)).await;
        wait_until(|| remote.pulls() == 1).await;

        time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(remote.pulls(), 1);
        assert!(!store.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_trigger_without_changes_does_nothing() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let online = Arc::new(StaticConnectivity::new(true));
        let handle = spawn_agent(&store, &remote, &online, test_settings());

        handle.notify_local_change().await.unwrap();
        time::sleep(Duration::from_secs(1)).await;
        settle().await;

        assert_eq!(remote.pulls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync_respects_connectivity() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let connectivity = Arc::new(StaticConnectivity::new(false));
        let handle = spawn_agent(&store, &remote, &connectivity, test_settings());

        settle().await;
        assert!(handle.status().next_sync_at.is_some());

        time::sleep(Duration::from_secs(301)).await;
        settle().await;
        assert_eq!(remote.pulls(), 0);
        assert!(!handle.status().is_online);

        connectivity.set_online(true);
        time::sleep(Duration::from_secs(300)).await;
        wait_until(|| remote.pulls() == 1).await;
        assert_eq!(store.watermark().as_millis(), 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_trigger() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let online = Arc::new(StaticConnectivity::new(true));
        let _handle = spawn_agent(&store, &remote, &online, AgentSettings::default());

        wait_until(|| remote.pulls() == 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_syncs_only_with_pending_changes() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let online = Arc::new(StaticConnectivity::new(true));
        let handle = spawn_agent(&store, &remote, &online, test_settings());

        handle.app_lifecycle(AppLifecycle::Background).await.unwrap();
        settle().await;
        assert_eq!(remote.pulls(), 0);

        store.add_created("scorte", "s1");
        handle.app_lifecycle(AppLifecycle::Background).await.unwrap();
        wait_until(|| remote.pulls() == 1).await;
        wait_until(|| !store.is_dirty()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_triggers_sync() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let online = Arc::new(StaticConnectivity::new(true));
        let (updates, feed) = watch::channel(false);

        let orchestrator = SyncOrchestrator::new(store.clone(), remote.clone(), online.clone());
        let handle = SyncAgent::new(Arc::new(orchestrator), test_settings())
            .with_connectivity(feed)
            .spawn();

        settle().await;
        assert_eq!(remote.pulls(), 0);

        updates.send(true).unwrap();
        wait_until(|| remote.pulls() == 1).await;
        assert!(handle.status().is_online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_now_through_handle() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let online = Arc::new(StaticConnectivity::new(true));
        let handle = spawn_agent(&store, &remote, &online, test_settings());

        let result = handle.sync_now().await;
        assert!(result.success);
        assert_eq!(result.message, ManualSyncResult::UP_TO_DATE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let online = Arc::new(StaticConnectivity::new(true));
        let handle = spawn_agent(&store, &remote, &online, test_settings());
        assert!(handle.is_running());

        handle.shutdown().await;
        handle.closed().await;

        assert!(!handle.is_running());
        assert!(matches!(
            handle.notify_local_change().await,
            Err(SyncError::ShuttingDown)
        ));
        assert!(handle.status().next_sync_at.is_none());
    }

    #[test]
    fn test_builder_requires_store_and_remote() {
        let missing_store = SyncAgentBuilder::new(SyncConfig::default())
            .with_remote(Arc::new(FakeRemote::new(0)))
            .build();
        assert!(matches!(missing_store, Err(SyncError::InvalidConfig(_))));

        let missing_remote = SyncAgentBuilder::new(SyncConfig::default())
            .with_store(Arc::new(FakeStore::new()))
            .build();
        assert!(matches!(missing_remote, Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_zero_periodic_interval() {
        let mut config = SyncConfig::default();
        config.sync.periodic_interval_secs = 0;

        let result = SyncAgentBuilder::new(config)
            .with_store(Arc::new(FakeStore::new()))
            .with_remote(Arc::new(FakeRemote::new(0)))
            .build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_built_agent_keeps_running() {
        let store = Arc::new(FakeStore::new());
        let remote = Arc::new(FakeRemote::new(1_000));
        let mut config = SyncConfig::default();
        config.sync.sync_on_startup = false;

        let handle = SyncAgentBuilder::new(config)
            .with_store(store.clone())
            .with_remote(remote.clone())
            .build()
            .unwrap()
            .spawn();

        store.add_created("scorte", "s1");
        handle.notify_local_change().await.unwrap();
        time::sleep(Duration::from_millis(600)).await;
        wait_until(|| remote.pulls() == 1).await;
        assert!(handle.is_running());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = SyncConfig::default();
        config.sync.debounce_ms = 250;
        config.sync.sync_on_background = false;

        let settings = AgentSettings::from_config(&config);
        assert_eq!(settings.debounce_window, Duration::from_millis(250));
        assert_eq!(settings.periodic_interval, Duration::from_secs(300));
        assert!(!settings.sync_on_background);
    }
}
