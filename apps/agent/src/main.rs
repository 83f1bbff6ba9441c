//! # stockcheck-agent
//!
//! Headless host for the sync engine.
//!
//! ```text
//! stockcheck-agent          run until Ctrl+C / SIGTERM, syncing automatically
//! stockcheck-agent sync     one manual sync, prints { success, message }
//! stockcheck-agent status   prints the current sync status
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use directories::ProjectDirs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stockcheck_db::{Database, DbConfig};
use stockcheck_sync::{
    ConnectivityMonitor, HttpProbe, HttpRemote, SyncAgentBuilder, SyncConfig, SyncOutcome,
    SyncTrigger,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let command = std::env::args().nth(1).unwrap_or_else(|| "run".to_string());

    let config = SyncConfig::load_or_default(None);
    info!(mode = %config.mode(), "Configuration loaded");

    let db_path = get_database_path()?;
    let db = Database::new(DbConfig::new(&db_path)).await?;
    info!(path = %db_path.display(), "Database ready");

    let remote = Arc::new(HttpRemote::from_config(&config)?);
    let probe = Arc::new(HttpProbe::from_config(&config)?);

    let builder = SyncAgentBuilder::new(config.clone())
        .with_store(Arc::new(db.clone()))
        .with_remote(remote)
        .with_connectivity(probe.clone());

    match command.as_str() {
        "sync" => {
            let agent = builder.build()?;
            let result = agent.orchestrator().sync_now().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "status" => {
            let agent = builder.build()?;
            let status = agent.orchestrator().refresh_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "run" => {
            let monitor = ConnectivityMonitor::spawn(probe, config.probe_interval());
            let agent = builder
                .with_connectivity_updates(monitor.subscribe())
                .build()?;
            let orchestrator = Arc::clone(agent.orchestrator());
            let handle = agent.spawn();

            shutdown_signal().await;

            handle.shutdown().await;
            handle.closed().await;
            monitor.stop();

            // Cycles spawned by the loop outlive it.
            orchestrator.wait_idle().await;

            // Flush pending local writes, as the app does when backgrounded.
            match orchestrator.trigger(SyncTrigger::Background).await {
                SyncOutcome::Completed(report) => {
                    info!(pushed = report.pushed, "Final sync completed")
                }
                SyncOutcome::Skipped(reason) => info!(%reason, "Final sync skipped"),
                SyncOutcome::Failed(e) => warn!(error = %e, "Final sync failed"),
            }
        }
        other => {
            return Err(format!("unknown command '{other}' (expected run, sync or status)").into());
        }
    }

    db.close().await;
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=stockcheck_sync=trace` - Trace the sync engine only
/// - Default: INFO, DEBUG for stockcheck crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockcheck=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Determines the database file path based on the platform.
///
/// Set `STOCKCHECK_DB_PATH` to use a custom path.
fn get_database_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(path) = std::env::var("STOCKCHECK_DB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let proj_dirs = ProjectDirs::from("com", "stockcheck", "stockcheck")
        .ok_or("Could not determine app data directory")?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;

    Ok(data_dir.join("stockcheck.db"))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
