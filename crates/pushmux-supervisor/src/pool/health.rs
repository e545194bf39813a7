//! Health monitor
//!
//! Periodic reconciliation of the registry against the active key set. The
//! monitor only decides; the worker applies the resulting actions so every
//! mutation still happens in one place. The ticker runs only while there is
//! at least one active key.

use std::collections::HashSet;
use std::future;
use std::time::Duration;

use pushmux_core::{ConnectionKey, ConnectionStatus, SupervisorConfig};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::registry::ConnectionRegistry;

/// Decision taken by one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthAction {
    /// Active key without a usable connection
    Connect(ConnectionKey),
    /// Attempt stuck in `Connecting`; supersede it
    ForceConnect(ConnectionKey),
    /// Connected but the liveness probe failed
    Demote(ConnectionKey),
    /// Connected but silent for too long (log only)
    Suspect { key: ConnectionKey, silent_for: Duration },
    /// Inactive record with nothing left to do
    Prune(ConnectionKey),
}

pub(crate) struct HealthMonitor {
    interval: Duration,
    ticker: Option<Interval>,
}

impl HealthMonitor {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            ticker: None,
        }
    }

    /// Start ticking. Returns false if already running.
    pub(crate) fn start(&mut self) -> bool {
        if self.ticker.is_some() {
            return false;
        }
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        true
    }

    /// Stop ticking. Returns false if already stopped.
    pub(crate) fn stop(&mut self) -> bool {
        self.ticker.take().is_some()
    }

    /// Wait for the next tick; pends forever while stopped.
    pub(crate) async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }
}

/// Compute the actions for one reconciliation pass.
///
/// Probes are cheap non-blocking sends, so they run inline here.
pub(crate) fn plan(
    registry: &ConnectionRegistry,
    active: &HashSet<ConnectionKey>,
    config: &SupervisorConfig,
    now: Instant,
) -> Vec<HealthAction> {
    let mut actions = Vec::new();

    let mut missing: Vec<&ConnectionKey> = active
        .iter()
        .filter(|key| !registry.contains(key.as_str()))
        .collect();
    missing.sort();
    actions.extend(missing.into_iter().cloned().map(HealthAction::Connect));

    let mut existing = Vec::new();
    registry.for_each(|key, record| {
        let since_attempt = now.saturating_duration_since(record.last_attempt_at);

        if !active.contains(key) {
            if record.status.is_retryable() && !record.has_pending_retry() {
                existing.push(HealthAction::Prune(key.clone()));
            }
            return;
        }

        match record.status {
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                if since_attempt >= config.retry_delay {
                    existing.push(HealthAction::Connect(key.clone()));
                }
            }
            ConnectionStatus::Connecting => {
                if since_attempt > config.stall_timeout {
                    existing.push(HealthAction::ForceConnect(key.clone()));
                }
            }
            ConnectionStatus::Connected => {
                let alive = record.handle.as_ref().is_some_and(|h| h.probe());
                if !alive {
                    existing.push(HealthAction::Demote(key.clone()));
                    return;
                }
                let silent_for = record
                    .last_success_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(since_attempt);
                if silent_for > config.suspect_after {
                    existing.push(HealthAction::Suspect {
                        key: key.clone(),
                        silent_for,
                    });
                }
            }
        }
    });

    existing.sort_by(|a, b| action_key(a).cmp(action_key(b)));
    actions.extend(existing);
    actions
}

fn action_key(action: &HealthAction) -> &ConnectionKey {
    match action {
        HealthAction::Connect(key)
        | HealthAction::ForceConnect(key)
        | HealthAction::Demote(key)
        | HealthAction::Prune(key)
        | HealthAction::Suspect { key, .. } => key,
    }
}
