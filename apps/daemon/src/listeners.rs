//! Listener file watcher
//!
//! The listener collection is a JSON array of [`ListenerEntry`] kept in one
//! file. Changes are debounced, re-read and published on a watch channel
//! that the supervisor's listener feed consumes. A file that fails to parse
//! keeps the last good collection in place.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pushmux_core::ListenerEntry;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Read the listener file. A missing file is an empty collection.
pub fn load_listeners(path: &Path) -> Result<Vec<ListenerEntry>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "[Listeners] File not found, no listeners");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Watches the listener file and publishes its contents.
pub struct ListenerFileWatcher {
    /// Kept alive to continue watching
    _watcher: RecommendedWatcher,
}

impl ListenerFileWatcher {
    pub fn new(
        path: PathBuf,
        listeners: watch::Sender<Vec<ListenerEntry>>,
        debounce: Duration,
    ) -> Result<Self> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = path
            .file_name()
            .map(OsString::from)
            .with_context(|| format!("listener path has no file name: {}", path.display()))?;

        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let (tx, rx) = mpsc::channel::<()>(100);

        // The editor may replace the file, so watch the directory and match on name
        let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    if event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    {
                        if let Err(e) = tx.blocking_send(()) {
                            warn!("[Listeners] Failed to queue file change: {}", e);
                        }
                    }
                }
                Err(e) => {
                    error!("[Listeners] File watcher error: {}", e);
                }
            }
        })?;

        let mut watcher = watcher;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;

        info!(path = %path.display(), "[Listeners] Watching listener file");
        tokio::spawn(debounced_reload(rx, path, listeners, debounce));

        Ok(Self { _watcher: watcher })
    }
}

/// Reload once no change has arrived for `debounce`.
async fn debounced_reload(
    mut changes: mpsc::Receiver<()>,
    path: PathBuf,
    listeners: watch::Sender<Vec<ListenerEntry>>,
    debounce: Duration,
) {
    let mut pending: Option<Instant> = None;

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Some(()) => pending = Some(Instant::now()),
                None => {
                    debug!("[Listeners] Watcher dropped, reload task exiting");
                    return;
                }
            },
            _ = tokio::time::sleep(Duration::from_millis(100)), if pending.is_some() => {
                let ready = pending.is_some_and(|at| at.elapsed() >= debounce);
                if !ready {
                    continue;
                }
                pending = None;

                match load_listeners(&path) {
                    Ok(entries) => {
                        if publish(&listeners, entries) {
                            info!(
                                listeners = listeners.borrow().len(),
                                "[Listeners] Listener file reloaded"
                            );
                        } else {
                            debug!("[Listeners] Reload complete: no changes");
                        }
                    }
                    Err(e) => {
                        error!("[Listeners] Reload failed, keeping previous set: {:#}", e);
                    }
                }
                if listeners.is_closed() {
                    return;
                }
            }
        }
    }
}

/// Replace the published collection if it changed. Returns true on change.
pub fn publish(listeners: &watch::Sender<Vec<ListenerEntry>>, entries: Vec<ListenerEntry>) -> bool {
    listeners.send_if_modified(|current| {
        if *current == entries {
            return false;
        }
        *current = entries;
        true
    })
}
