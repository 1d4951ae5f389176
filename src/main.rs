//! deskbot - IRC support desk bot
//!
//! Usage: `deskbot [config.toml]`

use deskbot::Bot;
use deskbot::api::{AccountApi, HttpAccountApi};
use deskbot::config::{Config, StorageBackend, validate};
use deskbot::irc::TcpTransport;
use deskbot::store::{MemoryStore, RedbStore, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long in-flight handlers get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load_or_default(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    info!(
        server = %config.irc.server,
        port = config.irc.port,
        nick = %config.irc.nick,
        sessions = config.channels.sessions.len(),
        "Starting deskbot"
    );

    tokio::fs::create_dir_all(&config.logs.dir).await?;

    let store: Arc<dyn Store> = match config.storage.backend {
        StorageBackend::Redb => {
            info!(path = %config.storage.path, "Opening redb state store");
            Arc::new(RedbStore::open(&config.storage.path)?)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory state store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };
    info!(entries = store.list_all().await?.len(), "State store ready");
    let api: Arc<dyn AccountApi> = Arc::new(HttpAccountApi::new(&config.account_api)?);
    let bot = Bot::new(&config, Arc::new(TcpTransport::new()), store, api);

    tokio::select! {
        result = bot.start() => result?,
        _ = shutdown_signal() => {
            bot.shutdown(SHUTDOWN_GRACE).await;
            return Ok(());
        }
    }

    shutdown_signal().await;
    tokio::spawn(async {
        shutdown_signal().await;
        warn!("Second shutdown signal, exiting immediately");
        std::process::exit(1);
    });
    bot.shutdown(SHUTDOWN_GRACE).await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
        std::future::pending::<()>().await;
    }
    info!("Received SIGINT");
}
