//! # Connectivity
//!
//! Answers one question before every cycle: is the backend reachable?
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ConnectivityOracle::is_reachable()                                    │
//! │  ├── HttpProbe            any HTTP answer = online, error = offline    │
//! │  └── StaticConnectivity   flag set by the host (tests, OS callbacks)   │
//! │                                                                         │
//! │  ConnectivityMonitor                                                   │
//! │  └── polls an oracle, publishes changes on a watch channel             │
//! │      (the agent turns offline → online into a sync trigger)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A probe that fails for any reason counts as offline. Being offline is the
//! expected steady state of a mobile device, never an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Reachability check used as the gate in front of every cycle.
#[async_trait]
pub trait ConnectivityOracle: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

// =============================================================================
// HTTP Probe
// =============================================================================

/// Sends a `HEAD` request; any HTTP response means the network works.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: Url,
}

impl HttpProbe {
    pub fn new(url: Url, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(HttpProbe { client, url })
    }

    /// Probes `[connectivity].probe_url`, or the remote URL if unset.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let raw = config
            .probe_url()
            .ok_or_else(|| SyncError::InvalidConfig("no probe or remote URL configured".into()))?;
        Self::new(Url::parse(raw)?, config.probe_timeout())
    }
}

#[async_trait]
impl ConnectivityOracle for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.head(self.url.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Connectivity probe failed");
                false
            }
        }
    }
}

// =============================================================================
// Static Connectivity
// =============================================================================

/// A flag the host flips from its own network callbacks.
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        StaticConnectivity {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for StaticConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConnectivityOracle for StaticConnectivity {
    async fn is_reachable(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Background poller publishing the latest reachability.
pub struct ConnectivityMonitor {
    receiver: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Starts polling `oracle` every `interval`.
    ///
    /// The first probe runs immediately. The task ends once every receiver
    /// is dropped or [`ConnectivityMonitor::stop`] is called.
    pub fn spawn(oracle: Arc<dyn ConnectivityOracle>, interval: Duration) -> Self {
        // Assume offline until the first probe says otherwise.
        let (sender, receiver) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let online = oracle.is_reachable().await;
                        let changed = sender.send_if_modified(|current| {
                            if *current != online {
                                *current = online;
                                true
                            } else {
                                false
                            }
                        });
                        if changed {
                            info!(online, "Connectivity changed");
                        }
                    }
                    _ = sender.closed() => {
                        debug!("Connectivity monitor has no subscribers, stopping");
                        break;
                    }
                }
            }
        });

        ConnectivityMonitor { receiver, task }
    }

    /// A new subscription to reachability changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.receiver.clone()
    }

    /// Latest published value.
    pub fn is_online(&self) -> bool {
        *self.receiver.borrow()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_connectivity() {
        let oracle = StaticConnectivity::new(false);
        assert!(!oracle.is_reachable().await);
        oracle.set_online(true);
        assert!(oracle.is_reachable().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_publishes_changes() {
        let oracle = Arc::new(StaticConnectivity::new(true));
        let monitor = ConnectivityMonitor::spawn(oracle.clone(), Duration::from_secs(10));
        let mut rx = monitor.subscribe();

        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        oracle.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_online());

        monitor.stop();
    }

    #[tokio::test]
    async fn test_probe_of_unroutable_address_is_offline() {
        // Port 9 on localhost is closed on any sane test machine.
        let probe = HttpProbe::new(
            Url::parse("http://127.0.0.1:9/").unwrap(),
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(!probe.is_reachable().await);
    }
}
