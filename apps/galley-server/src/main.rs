//! # Galley Server
//!
//! Kitchen display and ordering server.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. tracing (RUST_LOG, default info,galley=debug)                      │
//! │  2. ServerConfig::load (TOML file → env → validate)                    │
//! │  3. Database (WAL, migrations)                                         │
//! │  4. StationHub                                                         │
//! │  5. KitchenService (+ BackupScheduler when backup.dir is set)          │
//! │  6. serve (heartbeat running) until Ctrl-C / SIGTERM, then close       │
//! │     station streams and drain                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```bash
//! galley-server --config ./galley.toml
//! GALLEY_BIND=127.0.0.1:9000 GALLEY_DATABASE=./kitchen.db galley-server
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use galley_db::{Database, DbConfig};
use galley_realtime::{BackupScheduler, KitchenService, RealtimeState, StationHub};
use galley_server::{serve, ServerConfig};

const DEFAULT_LOG_FILTER: &str = "info,galley=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(true)
        .init();

    let Some(config_path) = parse_args() else {
        return Ok(());
    };

    let config = ServerConfig::load(config_path)?;
    let addr = config.bind_addr()?;
    info!(
        %addr,
        database = %config.server.database.display(),
        auth = config.realtime.auth.token.is_some(),
        "Configuration loaded"
    );
    if config.realtime.auth.is_open() {
        warn!("No station token configured; any caller can send ticket commands as any station");
    }

    let db = Database::new(
        DbConfig::new(&config.server.database).max_connections(config.server.max_connections),
    )
    .await?;
    info!("Database ready");

    let hub = StationHub::new(&config.realtime.hub);

    let mut kitchen = KitchenService::new(db.clone(), Arc::new(hub.clone())).await?;
    let backup_task = match BackupScheduler::new(db.clone(), &config.realtime.backup) {
        Some(scheduler) => {
            let (handle, task) = scheduler.start();
            kitchen = kitchen.with_backup(handle);
            Some(task)
        }
        None => None,
    };

    let state = RealtimeState::new(Arc::new(kitchen), hub, config.realtime.auth.clone());

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Galley server listening");

    serve(listener, state, shutdown_signal()).await?;

    if let Some(task) = backup_task {
        task.abort();
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Returns the `--config` path, or `None` when help was printed.
fn parse_args() -> Option<Option<PathBuf>> {
    let args: Vec<String> = env::args().collect();
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "-h" | "--help" => {
                println!("Galley Kitchen Server");
                println!();
                println!("Usage: galley-server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: $GALLEY_CONFIG or platform dir)");
                println!("  -h, --help           Show this help message");
                return None;
            }
            other => warn!(arg = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    Some(config_path)
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
