//! PushMux daemon
//!
//! Keeps one WebSocket per active listener connected to the push server.
//! The listener collection is read from a JSON file and followed for
//! changes; inbound messages are logged until a real consumer is attached.

use std::sync::Arc;

use anyhow::{Context, Result};
use pushmux_core::EventFilter;
use pushmux_supervisor::{spawn_listener_feed, ConnectionSupervisor, EventLogger, WebSocketTransport};
use tokio::sync::watch;
use tracing::{error, info, warn};

mod config;
mod listeners;
mod logging;

use config::DaemonConfig;
use listeners::{load_listeners, ListenerFileWatcher};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for development)
    dotenvy::dotenv().ok();

    let config = DaemonConfig::from_env()?;
    let _guard = logging::init_tracing(&config.log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listeners = %config.listeners_path.display(),
        logs = %config.log_dir.display(),
        "[Daemon] Starting PushMux"
    );

    let mut builder = ConnectionSupervisor::builder(Arc::new(WebSocketTransport::new()))
        .config(config.supervisor.clone());
    match config.base_url.clone() {
        Some(url) => builder = builder.base_url(url),
        None => warn!("[Daemon] PUSHMUX_BASE_URL not set, listeners stay offline"),
    }
    let supervisor = builder.spawn().context("failed to start supervisor")?;
    let event_logger =
        EventLogger::new(supervisor.subscribe_events_filtered(EventFilter::Lifecycle)).start();

    let initial = load_listeners(&config.listeners_path).unwrap_or_else(|e| {
        error!("[Daemon] {:#}", e);
        Vec::new()
    });
    let (listeners_tx, listeners_rx) = watch::channel(initial);
    let _watcher = ListenerFileWatcher::new(
        config.listeners_path.clone(),
        listeners_tx,
        config.debounce,
    )?;
    let feed = spawn_listener_feed(supervisor.clone(), listeners_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("[Daemon] Shutdown requested");

    feed.abort();
    supervisor.shutdown().await?;
    if let Err(e) = event_logger.await {
        warn!("[Daemon] Event logger ended abnormally: {}", e);
    }

    let counts = supervisor.status_counts();
    info!(remaining = counts.total(), "[Daemon] Stopped");
    Ok(())
}
