//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKCHECK_SYNC_MODE=manual                                        │
//! │     STOCKCHECK_REMOTE_URL=https://xyz.supabase.co                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockcheck/sync.toml (Linux)                             │
//! │     ~/Library/Application Support/com.stockcheck.stockcheck/sync.toml  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, 500ms debounce, 5 minute periodic sync             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [remote]
//! url = "https://xyz.supabase.co"
//! api_key = "..."
//!
//! [sync]
//! mode = "auto"            # auto | manual | offline
//! debounce_ms = 500
//! periodic_interval_secs = 300
//!
//! [connectivity]
//! probe_interval_secs = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Mode
// =============================================================================

/// Which triggers may start a sync cycle.
///
/// ```text
/// ┌──────────┬─────────────────────────────────────────────────────────────┐
/// │ AUTO     │ Every trigger: local changes, timer, lifecycle, manual      │
/// │ MANUAL   │ Only the user's "sync now"                                  │
/// │ OFFLINE  │ Nothing; local writes accumulate                            │
/// └──────────┴─────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Auto,
    Manual,
    Offline,
}

impl SyncMode {
    /// Returns true if automatic triggers may run.
    pub fn allows_automatic(&self) -> bool {
        matches!(self, SyncMode::Auto)
    }

    /// Returns true if sync is enabled at all.
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Offline)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Manual => write!(f, "manual"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(SyncMode::Auto),
            "manual" => Ok(SyncMode::Manual),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, manual, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Where the backend lives and how to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the backend (`https://<project>.supabase.co`).
    #[serde(default)]
    pub url: Option<String>,

    /// Sent as both `apikey` and bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Name of the pull procedure.
    #[serde(default = "default_pull_procedure")]
    pub pull_procedure: String,

    /// Name of the push procedure.
    #[serde(default = "default_push_procedure")]
    pub push_procedure: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Send the local schema version with every pull.
    #[serde(default)]
    pub include_schema_version: bool,
}

fn default_pull_procedure() -> String {
    "pull".to_string()
}

fn default_push_procedure() -> String {
    "push".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            url: None,
            api_key: None,
            pull_procedure: default_pull_procedure(),
            push_procedure: default_push_procedure(),
            request_timeout_secs: default_request_timeout(),
            include_schema_version: false,
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync timing and trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Sync mode for this device.
    #[serde(default)]
    pub mode: SyncMode,

    /// Quiet period after the last local write before syncing (milliseconds).
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Interval of the periodic sync (seconds).
    #[serde(default = "default_periodic_interval")]
    pub periodic_interval_secs: u64,

    /// How often the unsynced-changes flag is refreshed (seconds).
    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval_secs: u64,

    /// Attempt one cycle when the agent starts.
    #[serde(default = "default_true")]
    pub sync_on_startup: bool,

    /// Attempt a cycle when the app goes to the background with unsynced changes.
    #[serde(default = "default_true")]
    pub sync_on_background: bool,

    /// Attempt a cycle as soon as connectivity comes back.
    #[serde(default = "default_true")]
    pub sync_on_reconnect: bool,

    /// Back off automatic triggers after a failed cycle.
    #[serde(default = "default_true")]
    pub backoff_enabled: bool,

    /// First backoff delay (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Longest backoff delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_debounce() -> u64 {
    500
}
fn default_periodic_interval() -> u64 {
    300
}
fn default_status_poll_interval() -> u64 {
    5
}
fn default_initial_backoff() -> u64 {
    5_000
}
fn default_max_backoff() -> u64 {
    300
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            debounce_ms: default_debounce(),
            periodic_interval_secs: default_periodic_interval(),
            status_poll_interval_secs: default_status_poll_interval(),
            sync_on_startup: true,
            sync_on_background: true,
            sync_on_reconnect: true,
            backoff_enabled: true,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Connectivity Settings
// =============================================================================

/// Reachability probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    /// URL to probe. Falls back to the remote URL.
    #[serde(default)]
    pub probe_url: Option<String>,

    /// Interval between probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Probe timeout (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_probe_interval() -> u64 {
    10
}
fn default_probe_timeout() -> u64 {
    5
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        ConnectivitySettings {
            probe_url: None,
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub connectivity: ConnectivitySettings,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(env);
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    ///
    /// Environment overrides are part of the load, so an invalid override
    /// also falls back to plain defaults.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load_or_default_with_env(config_path, |key| std::env::var(key).ok())
    }

    fn load_or_default_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        Self::load_with_env(config_path, env).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(ref url) = self.remote.url {
            validate_http_url("Remote", url)?;
        }
        if let Some(ref url) = self.connectivity.probe_url {
            validate_http_url("Probe", url)?;
        }

        if self.remote.pull_procedure.is_empty() || self.remote.push_procedure.is_empty() {
            return Err(SyncError::InvalidConfig(
                "pull_procedure and push_procedure must not be empty".into(),
            ));
        }

        let must_be_positive = [
            ("debounce_ms", self.sync.debounce_ms),
            ("periodic_interval_secs", self.sync.periodic_interval_secs),
            ("status_poll_interval_secs", self.sync.status_poll_interval_secs),
            ("request_timeout_secs", self.remote.request_timeout_secs),
            ("probe_interval_secs", self.connectivity.probe_interval_secs),
            ("probe_timeout_secs", self.connectivity.probe_timeout_secs),
        ];
        for (name, value) in must_be_positive {
            if value == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.sync.initial_backoff_ms > self.sync.max_backoff_secs.saturating_mul(1_000) {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must not exceed max_backoff_secs".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(url) = env("STOCKCHECK_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Some(key) = env("STOCKCHECK_API_KEY") {
            self.remote.api_key = Some(key);
        }

        if let Some(mode) = env("STOCKCHECK_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Some(ms) = env("STOCKCHECK_DEBOUNCE_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.sync.debounce_ms = ms;
            }
        }

        if let Some(secs) = env("STOCKCHECK_SYNC_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                debug!(secs, "Overriding periodic interval from environment");
                self.sync.periodic_interval_secs = secs;
            }
        }

        if let Some(url) = env("STOCKCHECK_PROBE_URL") {
            self.connectivity.probe_url = Some(url);
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockcheck", "stockcheck")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the sync mode.
    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    /// Returns true if sync is enabled.
    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }

    /// Backend base URL, required to build an HTTP remote.
    pub fn remote_url(&self) -> SyncResult<Url> {
        let raw = self
            .remote
            .url
            .as_deref()
            .ok_or_else(|| SyncError::InvalidConfig("remote.url is not configured".into()))?;
        Ok(Url::parse(raw)?)
    }

    /// URL to probe for reachability.
    pub fn probe_url(&self) -> Option<&str> {
        self.connectivity
            .probe_url
            .as_deref()
            .or(self.remote.url.as_deref())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.sync.debounce_ms)
    }

    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.sync.periodic_interval_secs)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.status_poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.connectivity.probe_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.sync.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.sync.max_backoff_secs)
    }
}

fn validate_http_url(label: &str, raw: &str) -> SyncResult<()> {
    let url = Url::parse(raw)
        .map_err(|e| SyncError::InvalidUrl(format!("{label} URL '{raw}': {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SyncError::InvalidUrl(format!(
            "{label} URL must start with http:// or https://, got: {raw}"
        )));
    }
    Ok(())
}
