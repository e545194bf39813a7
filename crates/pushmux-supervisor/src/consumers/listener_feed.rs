//! Listener feed - active key set input from the persistence layer
//!
//! The persistence layer publishes its listener collection on a watch
//! channel. Each change is reduced to the active key set and applied with
//! `update_active_keys`. The current value is applied immediately on start.

use pushmux_core::{active_keys, ListenerEntry};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::pool::ConnectionSupervisor;

pub fn spawn_listener_feed(
    supervisor: ConnectionSupervisor,
    mut listeners: watch::Receiver<Vec<ListenerEntry>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let keys = {
                let current = listeners.borrow_and_update();
                active_keys(&current)
            };
            debug!(active = keys.len(), "[ListenerFeed] Applying listener set");

            if supervisor.update_active_keys(keys).await.is_err() {
                info!("[ListenerFeed] Supervisor stopped, feed exiting");
                return;
            }
            if listeners.changed().await.is_err() {
                debug!("[ListenerFeed] Listener source closed");
                return;
            }
        }
    })
}
