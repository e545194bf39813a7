//! Fixed-delay reconnection scheduler
//!
//! A retry is a sleeping task that posts `RetryDue` back to the worker. The
//! task handle lives in the key's record so there is never more than one
//! pending retry per key: replacing or dropping it aborts the sleeper.
//! Tickets let the worker ignore a wake-up that raced with cancellation.

use std::time::Duration;

use pushmux_core::ConnectionKey;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::registry::ConnectionRegistry;

/// Timer messages posted back to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TimerEvent {
    RetryDue { key: ConnectionKey, ticket: u64 },
    BaseUrlSettled { epoch: u64 },
}

/// Scheduled reconnect owned by a connection record
pub struct PendingRetry {
    ticket: u64,
    task: JoinHandle<()>,
}

impl PendingRetry {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for PendingRetry {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Retry that was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Scheduled {
    pub attempt_count: u32,
    pub delay: Duration,
}

pub(crate) struct RetryScheduler {
    delay: Duration,
    timers: mpsc::UnboundedSender<TimerEvent>,
    next_ticket: u64,
}

impl RetryScheduler {
    pub(crate) fn new(delay: Duration, timers: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self {
            delay,
            timers,
            next_ticket: 0,
        }
    }

    /// Schedule a reconnect for `key`, superseding any pending one.
    ///
    /// Returns `None` when the key has no record.
    pub(crate) fn schedule(
        &mut self,
        registry: &ConnectionRegistry,
        key: &ConnectionKey,
    ) -> Option<Scheduled> {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let delay = self.delay;

        let attempt_count = registry.with_record_mut(key.as_str(), |record| {
            let timers = self.timers.clone();
            let wake_key = key.clone();
            let task = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = timers.send(TimerEvent::RetryDue {
                    key: wake_key,
                    ticket,
                });
            });

            // Replacing the previous retry aborts its sleeper
            record.pending_retry = Some(PendingRetry { ticket, task });
            record.attempt_count = record.attempt_count.saturating_add(1);
            record.attempt_count
        })?;

        debug!(
            key = %key,
            attempt_count,
            delay_ms = delay.as_millis() as u64,
            "[Scheduler] Retry scheduled"
        );

        Some(Scheduled {
            attempt_count,
            delay,
        })
    }

    /// Claim a fired retry. Returns false for superseded or cancelled tickets.
    pub(crate) fn claim(&self, registry: &ConnectionRegistry, key: &str, ticket: u64) -> bool {
        registry
            .with_record_mut(key, |record| {
                match record.pending_retry.as_ref() {
                    Some(pending) if pending.ticket() == ticket => {
                        record.pending_retry = None;
                        true
                    }
                    _ => false,
                }
            })
            .unwrap_or(false)
    }
}
