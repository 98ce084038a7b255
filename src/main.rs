//! Virtual-host router daemon.
//!
//! Loads every server document, keeps the registry current while the
//! servers directory changes, and exits on SIGINT/SIGTERM.
//!
//! # Architecture Overview
//!
//! ```text
//!   servers_dir/*.proxy.toml ──▶ config::loader ──▶ registry (ArcSwap snapshot)
//!            │                                          ▲
//!            ▼                                          │
//!   config::watcher ── SIGHUP ──▶ lifecycle::reload ────┘
//!
//!   request (host, path) ──▶ routing::router ──▶ registry snapshot
//!                                   │
//!                                   ▼
//!                       routing::domain / routing::location
//!                                   │
//!                                   ▼
//!                       load_balancer::pool ──▶ Candidate
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use vhost_router::config::{load_router_config, ConfigWatcher, RouterConfig, TomlStore};
use vhost_router::lifecycle::{run_reload_loop, signals, Shutdown};
use vhost_router::observability::logging::init_logging;
use vhost_router::registry::ServerRegistry;

#[derive(Parser)]
#[command(name = "vhost-router")]
#[command(about = "Virtual-host router daemon", long_about = None)]
struct Args {
    /// Process configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the servers directory from the configuration
    #[arg(short, long)]
    servers_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_router_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(dir) = args.servers_dir {
        config.servers_dir = dir;
    }

    init_logging(&config.observability)?;
    tracing::info!("vhost-router v{} starting", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(TomlStore::new(&config.servers_dir));
    let registry = Arc::new(ServerRegistry::new(config.scheduling.clone()).with_store(store));
    let version = registry.reload()?;

    tracing::info!(
        servers_dir = %config.servers_dir.display(),
        servers = registry.servers().len(),
        version,
        scheduling = %config.scheduling.code,
        "Registry loaded"
    );

    let shutdown = Shutdown::new();
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();

    // Dropping the watcher handle stops the watch.
    let _watcher = if config.watch {
        let (watcher, mut changes) = ConfigWatcher::new(&config.servers_dir);
        let handle = watcher.run()?;
        let forward = reload_tx.clone();
        tokio::spawn(async move {
            while changes.recv().await.is_some() {
                if forward.send(()).is_err() {
                    break;
                }
            }
        });
        Some(handle)
    } else {
        None
    };

    tokio::spawn(signals::forward_reload_signals(reload_tx, shutdown.clone()));

    let reload = tokio::spawn(run_reload_loop(
        registry.clone(),
        reload_rx,
        Duration::from_millis(config.watch_debounce_ms),
        shutdown.subscribe(),
    ));

    signals::shutdown_on_signal(shutdown).await;
    if let Err(e) = reload.await {
        tracing::error!(error = %e, "Reload loop ended abnormally");
    }

    tracing::info!(version = registry.version(), "Shutdown complete");
    Ok(())
}
