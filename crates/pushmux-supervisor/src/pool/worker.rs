//! Supervisor worker - the single owner of connection state
//!
//! Event-driven architecture:
//! - Handles send commands: connect, disconnect, update_active_keys, ...
//! - Transports report typed events: opened, message, closed, failed
//! - Timers post back: retry due, base URL settled
//! - The health monitor ticks while any key is active
//!
//! Everything funnels through one `select!` loop, so no two operations ever
//! mutate a record concurrently. Stale transport events are discarded by
//! comparing their attempt id with the record's current attempt; every close
//! initiated here retires the attempt id first.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::RwLock;
use pushmux_core::{
    fallback_url, BaseUrl, ConnectionKey, ConnectionStatus, DomainEvent, EventSender,
    InboundMessage, SupervisorConfig,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::broadcaster::StatusBroadcaster;
use super::health::{self, HealthAction, HealthMonitor};
use super::registry::{ConnectionRecord, ConnectionRegistry};
use super::scheduler::{RetryScheduler, TimerEvent};
use super::supervisor::Command;
use super::transport::{
    AttemptId, Transport, TransportEvent, TransportEventKind, TransportEventSender,
};

const PROBE_FAILED: &str = "liveness probe failed";

/// How strictly `connect` guards an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectMode {
    /// Respect the healthy, in-flight and cooldown checks
    Normal,
    /// A claimed retry ticket: healthy and in-flight checks only
    Retry,
    /// Supersede whatever is there (stall recovery, retry-all, base URL change)
    Force,
}

/// Why `connect` did or did not start an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectOutcome {
    Started,
    Healthy,
    InFlight,
    Cooldown,
    NoEndpoint,
}

pub(crate) struct SupervisorWorker {
    config: SupervisorConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<ConnectionRegistry>,
    base_url: Arc<RwLock<Option<BaseUrl>>>,
    broadcaster: StatusBroadcaster,
    events: EventSender,
    commands: mpsc::UnboundedReceiver<Command>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    timers_tx: mpsc::UnboundedSender<TimerEvent>,
    timers_rx: mpsc::UnboundedReceiver<TimerEvent>,
    messages: mpsc::UnboundedSender<InboundMessage>,
    scheduler: RetryScheduler,
    monitor: HealthMonitor,
    /// Mirror of the externally owned active key set
    active: HashSet<ConnectionKey>,
    /// Bumped on every base URL change; stale settle timers are ignored
    base_epoch: u64,
    settle_task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl SupervisorWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: SupervisorConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<ConnectionRegistry>,
        base_url: Arc<RwLock<Option<BaseUrl>>>,
        broadcaster: StatusBroadcaster,
        events: EventSender,
        commands: mpsc::UnboundedReceiver<Command>,
        messages: mpsc::UnboundedSender<InboundMessage>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();
        let scheduler = RetryScheduler::new(config.retry_delay, timers_tx.clone());
        let monitor = HealthMonitor::new(config.monitor_interval);

        Self {
            config,
            transport,
            registry,
            base_url,
            broadcaster,
            events,
            commands,
            transport_tx,
            transport_rx,
            timers_tx,
            timers_rx,
            messages,
            scheduler,
            monitor,
            active: HashSet::new(),
            base_epoch: 0,
            settle_task: None,
            stopped: false,
        }
    }

    pub(crate) async fn run(mut self) {
        let period = self.config.snapshot_interval;
        let mut snapshot_ticker = tokio::time::interval_at(Instant::now() + period, period);
        snapshot_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            return;
                        }
                    }
                    None => {
                        debug!("[Supervisor] All handles dropped");
                        break;
                    }
                },
                Some(event) = self.transport_rx.recv() => self.handle_transport_event(event),
                Some(timer) = self.timers_rx.recv() => self.handle_timer(timer),
                _ = self.monitor.tick() => self.run_health_check(),
                _ = snapshot_ticker.tick() => {
                    self.broadcaster.republish(self.registry.snapshot());
                }
            }
        }

        self.teardown();
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Apply one command. `Break` means the worker must exit.
    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect { key, url, ack } => {
                self.connect(&key, url, ConnectMode::Normal);
                let _ = ack.send(());
            }
            Command::Disconnect { key, ack } => {
                if self.disconnect(&key) {
                    self.publish();
                }
                let _ = ack.send(());
            }
            Command::DisconnectAll { ack } => {
                self.disconnect_all();
                let _ = ack.send(());
            }
            Command::UpdateActiveKeys { keys, ack } => {
                self.update_active_keys(keys);
                let _ = ack.send(());
            }
            Command::ForceReconnectAll { ack } => {
                self.force_reconnect_all();
                let _ = ack.send(());
            }
            Command::SetBaseUrl { url, ack } => {
                self.set_base_url(url);
                let _ = ack.send(());
            }
            Command::HealthCheck { ack } => {
                self.run_health_check();
                let _ = ack.send(());
            }
            Command::Shutdown { ack } => {
                self.teardown();
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Start an attempt for `key` unless the record says not to.
    fn connect(
        &mut self,
        key: &ConnectionKey,
        url: Option<String>,
        mode: ConnectMode,
    ) -> ConnectOutcome {
        let now = Instant::now();

        if mode != ConnectMode::Force {
            let skip = self
                .registry
                .with_record(key.as_str(), |record| {
                    skip_reason(&self.config, record, now, mode)
                })
                .flatten();
            if let Some(outcome) = skip {
                trace!(key = %key, outcome = ?outcome, "[Supervisor] Connect skipped");
                return outcome;
            }
        }

        let endpoint = url
            .or_else(|| {
                self.registry
                    .with_record(key.as_str(), |r| r.url.clone())
                    .flatten()
            })
            .or_else(|| self.derive_endpoint(key));
        let Some(endpoint) = endpoint else {
            warn!(key = %key, "[Supervisor] No endpoint for key (base URL not set), skipping");
            return ConnectOutcome::NoEndpoint;
        };

        info!(
            key = %key,
            url = %endpoint,
            mode = ?mode,
            "[Supervisor] Connecting"
        );

        let (attempt, previous, attempt_count) = self.start_attempt(key, endpoint, false);
        trace!(key = %key, attempt, "[Supervisor] Attempt started");
        if previous != Some(ConnectionStatus::Connecting) {
            self.emit_status(key, ConnectionStatus::Connecting, previous, attempt_count, None);
        }
        self.publish();
        ConnectOutcome::Started
    }

    /// Retire the current attempt, mark the record `Connecting` and open.
    ///
    /// Returns the new attempt id, the previous status (None for a new
    /// record) and the record's attempt count.
    fn start_attempt(
        &mut self,
        key: &ConnectionKey,
        endpoint: String,
        fallback: bool,
    ) -> (AttemptId, Option<ConnectionStatus>, u32) {
        let existed = self.registry.contains(key.as_str());
        let attempt = self.registry.next_attempt_id();
        let now = Instant::now();

        let (previous, old_handle, attempt_count) = self.registry.upsert(key, |record| {
            let previous = record.status;
            let old = record.retire_handle(attempt);
            record.pending_retry = None;
            record.status = ConnectionStatus::Connecting;
            if !fallback {
                record.url = Some(endpoint.clone());
            }
            record.using_fallback = fallback;
            record.last_attempt_at = now;
            record.last_error = None;
            (previous, old, record.attempt_count)
        });

        // Old handle is closed before the new one exists
        if let Some(handle) = old_handle {
            handle.close(self.config.close_code, "superseded");
        }

        let events = TransportEventSender::new(key.clone(), attempt, self.transport_tx.clone());
        let handle = self.transport.open(&endpoint, events);
        self.registry.with_record_mut(key.as_str(), |record| {
            if record.attempt == attempt {
                record.handle = Some(handle);
            }
        });

        (attempt, existed.then_some(previous), attempt_count)
    }

    fn derive_endpoint(&self, key: &ConnectionKey) -> Option<String> {
        let base = self.base_url.read();
        base.as_ref().and_then(|b| b.endpoint_for(key).ok())
    }

    /// Remove `key`. Returns false for unknown keys.
    fn disconnect(&mut self, key: &ConnectionKey) -> bool {
        let Some(record) = self.registry.remove(key.as_str()) else {
            trace!(key = %key, "[Supervisor] Disconnect for unknown key ignored");
            return false;
        };

        // Dropping the record aborts any pending retry
        if let Some(handle) = record.handle.as_ref() {
            handle.close(self.config.close_code, "disconnect");
        }
        info!(key = %key, status = %record.status, "[Supervisor] Disconnected");
        self.events
            .emit(DomainEvent::ConnectionRemoved { key: key.clone() });
        true
    }

    fn disconnect_all(&mut self) {
        let records = self.registry.drain();
        let count = records.len();
        for (key, record) in records {
            if let Some(handle) = record.handle.as_ref() {
                handle.close(self.config.close_code, "disconnect all");
            }
            self.events.emit(DomainEvent::ConnectionRemoved { key });
        }

        self.active.clear();
        self.stop_monitor();
        if let Some(task) = self.settle_task.take() {
            task.abort();
        }

        info!(closed = count, "[Supervisor] All connections closed");
        self.publish();
    }

    fn update_active_keys(&mut self, keys: HashSet<ConnectionKey>) {
        let mut removed: Vec<ConnectionKey> = self.active.difference(&keys).cloned().collect();
        let mut added: Vec<ConnectionKey> = keys.difference(&self.active).cloned().collect();
        removed.sort();
        added.sort();

        info!(
            active = keys.len(),
            added = added.len(),
            removed = removed.len(),
            "[Supervisor] Active keys updated"
        );

        for key in &removed {
            self.disconnect(key);
        }
        self.active = keys;

        for key in &added {
            self.connect(key, None, ConnectMode::Normal);
        }

        let mut unhealthy: Vec<ConnectionKey> = self
            .active
            .iter()
            .filter(|key| !added.contains(key))
            .filter(|key| self.registry.status(key.as_str()) != Some(ConnectionStatus::Connected))
            .cloned()
            .collect();
        unhealthy.sort();
        for key in &unhealthy {
            self.connect(key, None, ConnectMode::Normal);
        }

        if self.active.is_empty() {
            self.stop_monitor();
        } else {
            self.start_monitor();
        }
        self.publish();
    }

    fn force_reconnect_all(&mut self) {
        let mut keys: Vec<ConnectionKey> = self.active.iter().cloned().collect();
        keys.sort();
        info!(keys = keys.len(), "[Supervisor] Force reconnecting all active keys");

        // Flip everything to Connecting first so observers see it at once
        for key in &keys {
            let changed = self.registry.with_record_mut(key.as_str(), |record| {
                let previous = record.status;
                record.status = ConnectionStatus::Connecting;
                (previous, record.attempt_count)
            });
            if let Some((previous, attempt_count)) = changed {
                if previous != ConnectionStatus::Connecting {
                    self.emit_status(
                        key,
                        ConnectionStatus::Connecting,
                        Some(previous),
                        attempt_count,
                        None,
                    );
                }
            }
        }
        self.publish();

        for key in &keys {
            self.connect(key, None, ConnectMode::Force);
        }
    }

    fn set_base_url(&mut self, url: BaseUrl) {
        let current = self.base_url.read().clone();
        if current.as_ref() == Some(&url) {
            debug!(url = %url, "[Supervisor] Base URL unchanged");
            return;
        }

        info!(
            from = ?current.as_ref().map(BaseUrl::as_str),
            to = %url,
            records = self.registry.len(),
            "[Supervisor] Base URL changed, closing all connections"
        );
        *self.base_url.write() = Some(url.clone());
        self.base_epoch += 1;

        for key in self.registry.keys() {
            let next = self.registry.next_attempt_id();
            let endpoint = url.endpoint_for(&key).ok();
            let reset = self.registry.with_record_mut(key.as_str(), |record| {
                let previous = record.status;
                let handle = record.retire_handle(next);
                record.pending_retry = None;
                record.status = ConnectionStatus::Disconnected;
                record.url = endpoint;
                record.using_fallback = false;
                (previous, handle, record.attempt_count)
            });
            if let Some((previous, handle, attempt_count)) = reset {
                if let Some(handle) = handle {
                    handle.close(self.config.close_code, "base url changed");
                }
                if previous != ConnectionStatus::Disconnected {
                    self.emit_status(
                        &key,
                        ConnectionStatus::Disconnected,
                        Some(previous),
                        attempt_count,
                        Some("base url changed".to_string()),
                    );
                }
            }
        }

        self.events.emit(DomainEvent::BaseUrlChanged {
            url: url.to_string(),
        });
        self.publish();

        if let Some(task) = self.settle_task.take() {
            task.abort();
        }
        let epoch = self.base_epoch;
        let settle = self.config.base_url_settle;
        let timers = self.timers_tx.clone();
        self.settle_task = Some(tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let _ = timers.send(TimerEvent::BaseUrlSettled { epoch });
        }));
    }

    // =========================================================================
    // Transport events
    // =========================================================================

    fn handle_transport_event(&mut self, event: TransportEvent) {
        let TransportEvent { key, attempt, kind } = event;

        let current = self
            .registry
            .with_record(key.as_str(), |r| r.attempt == attempt)
            .unwrap_or(false);
        if !current {
            trace!(key = %key, attempt, "[Supervisor] Dropping stale transport event");
            return;
        }

        match kind {
            TransportEventKind::Opened => self.on_opened(&key),
            TransportEventKind::Message(payload) => self.on_message(&key, payload),
            TransportEventKind::Closed { code, reason } => self.on_closed(&key, code, reason),
            TransportEventKind::Failed { error } => self.on_failed(&key, error),
        }
    }

    fn on_opened(&mut self, key: &ConnectionKey) {
        let now = Instant::now();
        let opened = self.registry.with_record_mut(key.as_str(), |record| {
            let previous = record.status;
            record.status = ConnectionStatus::Connected;
            record.attempt_count = 0;
            record.last_success_at = Some(now);
            record.opened = true;
            record.last_error = None;
            (previous, record.using_fallback)
        });
        let Some((previous, using_fallback)) = opened else {
            return;
        };

        info!(key = %key, fallback = using_fallback, "[Supervisor] Connected");
        self.emit_status(key, ConnectionStatus::Connected, Some(previous), 0, None);
        self.publish();
    }

    fn on_message(&mut self, key: &ConnectionKey, payload: String) {
        let now = Instant::now();
        self.registry.with_record_mut(key.as_str(), |record| {
            record.last_success_at = Some(now);
        });

        trace!(key = %key, bytes = payload.len(), "[Supervisor] Message received");
        if self
            .messages
            .send(InboundMessage::new(key.clone(), payload))
            .is_err()
        {
            warn!(key = %key, "[Supervisor] Message dispatcher gone, message dropped");
        }
    }

    fn on_closed(&mut self, key: &ConnectionKey, code: Option<u16>, reason: String) {
        let next = self.registry.next_attempt_id();
        let closed = self.registry.with_record_mut(key.as_str(), |record| {
            let previous = record.status;
            let handle = record.retire_handle(next);
            record.status = ConnectionStatus::Disconnected;
            (previous, handle, record.attempt_count)
        });
        let Some((previous, handle, attempt_count)) = closed else {
            return;
        };
        if let Some(handle) = handle {
            handle.close(self.config.close_code, "closed");
        }

        info!(key = %key, code = ?code, reason = %reason, "[Supervisor] Connection closed");
        let message = (!reason.is_empty()).then_some(reason);
        self.emit_status(
            key,
            ConnectionStatus::Disconnected,
            Some(previous),
            attempt_count,
            message,
        );
        self.publish();

        if self.active.contains(key) {
            self.schedule_retry(key);
        }
    }

    fn on_failed(&mut self, key: &ConnectionKey, error: String) {
        let fallback = self
            .registry
            .with_record(key.as_str(), |record| {
                if record.opened || record.using_fallback {
                    None
                } else {
                    record.url.as_deref().and_then(fallback_url)
                }
            })
            .flatten();

        if let Some(fallback) = fallback {
            info!(
                key = %key,
                error = %error,
                fallback = %fallback,
                "[Supervisor] Primary endpoint failed, trying normalized fallback"
            );
            self.start_attempt(key, fallback, true);
            return;
        }

        let next = self.registry.next_attempt_id();
        let failed = self.registry.with_record_mut(key.as_str(), |record| {
            let previous = record.status;
            let handle = record.retire_handle(next);
            record.status = ConnectionStatus::Error;
            record.last_error = Some(error.clone());
            (previous, handle, record.attempt_count)
        });
        let Some((previous, handle, attempt_count)) = failed else {
            return;
        };
        if let Some(handle) = handle {
            handle.close(self.config.close_code, "failed");
        }

        warn!(
            key = %key,
            error = %error,
            attempt_count,
            "[Supervisor] Connection failed"
        );
        self.emit_status(
            key,
            ConnectionStatus::Error,
            Some(previous),
            attempt_count,
            Some(error),
        );
        self.publish();

        if self.active.contains(key) {
            self.schedule_retry(key);
        }
    }

    fn schedule_retry(&mut self, key: &ConnectionKey) {
        if let Some(scheduled) = self.scheduler.schedule(&self.registry, key) {
            self.events.emit(DomainEvent::RetryScheduled {
                key: key.clone(),
                attempt_count: scheduled.attempt_count,
                delay_ms: scheduled.delay.as_millis() as u64,
            });
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    fn handle_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::RetryDue { key, ticket } => {
                if !self.scheduler.claim(&self.registry, key.as_str(), ticket) {
                    trace!(key = %key, ticket, "[Supervisor] Stale retry ignored");
                    return;
                }
                if !self.active.contains(&key) {
                    debug!(key = %key, "[Supervisor] Retry dropped, key no longer active");
                    return;
                }
                debug!(key = %key, "[Supervisor] Retry due");
                self.connect(&key, None, ConnectMode::Retry);
            }
            TimerEvent::BaseUrlSettled { epoch } => {
                if epoch != self.base_epoch {
                    trace!(epoch, current = self.base_epoch, "[Supervisor] Stale settle timer ignored");
                    return;
                }
                self.settle_task = None;

                let mut keys: Vec<ConnectionKey> = self.active.iter().cloned().collect();
                keys.sort();
                info!(keys = keys.len(), "[Supervisor] Reconnecting after base URL change");
                for key in &keys {
                    self.connect(key, None, ConnectMode::Force);
                }
            }
        }
    }

    // =========================================================================
    // Health monitor
    // =========================================================================

    fn run_health_check(&mut self) {
        if self.active.is_empty() {
            self.stop_monitor();
            return;
        }

        let actions = health::plan(&self.registry, &self.active, &self.config, Instant::now());
        debug!(
            active = self.active.len(),
            records = self.registry.len(),
            actions = actions.len(),
            "[Monitor] Reconciliation pass"
        );

        let mut pruned = false;
        for action in actions {
            match action {
                HealthAction::Connect(key) => {
                    self.connect(&key, None, ConnectMode::Normal);
                }
                HealthAction::ForceConnect(key) => {
                    warn!(
                        key = %key,
                        stall_timeout_secs = self.config.stall_timeout.as_secs(),
                        "[Monitor] Attempt stalled, superseding"
                    );
                    self.connect(&key, None, ConnectMode::Force);
                }
                HealthAction::Demote(key) => self.demote(&key),
                HealthAction::Suspect { key, silent_for } => {
                    warn!(
                        key = %key,
                        silent_for_secs = silent_for.as_secs(),
                        "[Monitor] Connection silent for a long time, may be dead"
                    );
                    self.events.emit(DomainEvent::ConnectionSuspect {
                        key,
                        silent_for_secs: silent_for.as_secs(),
                    });
                }
                HealthAction::Prune(key) => {
                    if self.registry.remove(key.as_str()).is_some() {
                        debug!(key = %key, "[Monitor] Pruned inactive record");
                        self.events.emit(DomainEvent::ConnectionRemoved { key });
                        pruned = true;
                    }
                }
            }
        }

        if pruned {
            self.publish();
        }
    }

    /// Connected record whose probe failed: demote and retry
    fn demote(&mut self, key: &ConnectionKey) {
        let next = self.registry.next_attempt_id();
        let demoted = self.registry.with_record_mut(key.as_str(), |record| {
            let previous = record.status;
            let handle = record.retire_handle(next);
            record.status = ConnectionStatus::Error;
            record.last_error = Some(PROBE_FAILED.to_string());
            (previous, handle, record.attempt_count)
        });
        let Some((previous, handle, attempt_count)) = demoted else {
            return;
        };
        if let Some(handle) = handle {
            handle.close(self.config.close_code, PROBE_FAILED);
        }

        warn!(key = %key, "[Monitor] Liveness probe failed, demoting to error");
        self.emit_status(
            key,
            ConnectionStatus::Error,
            Some(previous),
            attempt_count,
            Some(PROBE_FAILED.to_string()),
        );
        self.publish();
        self.schedule_retry(key);
    }

    fn start_monitor(&mut self) {
        if self.monitor.start() {
            info!(
                active = self.active.len(),
                interval_secs = self.config.monitor_interval.as_secs(),
                "[Monitor] Started"
            );
            self.events.emit(DomainEvent::MonitorStarted {
                active_keys: self.active.len(),
            });
        }
    }

    fn stop_monitor(&mut self) {
        if self.monitor.stop() {
            info!("[Monitor] Stopped");
            self.events.emit(DomainEvent::MonitorStopped);
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn emit_status(
        &self,
        key: &ConnectionKey,
        status: ConnectionStatus,
        previous: Option<ConnectionStatus>,
        attempt_count: u32,
        message: Option<String>,
    ) {
        self.events.emit(DomainEvent::ConnectionStatusChanged {
            key: key.clone(),
            status,
            previous,
            attempt_count,
            message,
        });
    }

    fn publish(&self) {
        self.broadcaster.publish(self.registry.snapshot());
    }

    fn teardown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.disconnect_all();
        self.events.emit(DomainEvent::SupervisorStopped);
        info!(transport = %self.transport.description(), "[Supervisor] Stopped");
    }
}

/// Reason to leave an existing record alone, if any
fn skip_reason(
    config: &SupervisorConfig,
    record: &ConnectionRecord,
    now: Instant,
    mode: ConnectMode,
) -> Option<ConnectOutcome> {
    let since_attempt = now.saturating_duration_since(record.last_attempt_at);

    match record.status {
        ConnectionStatus::Connected => {
            if record.handle.as_ref().is_some_and(|h| h.probe()) {
                return Some(ConnectOutcome::Healthy);
            }
        }
        ConnectionStatus::Connecting => {
            if since_attempt < config.stall_timeout {
                return Some(ConnectOutcome::InFlight);
            }
        }
        ConnectionStatus::Disconnected | ConnectionStatus::Error => {}
    }

    // The retry delay alone paces scheduled retries
    if mode == ConnectMode::Normal && since_attempt < config.connect_cooldown {
        return Some(ConnectOutcome::Cooldown);
    }
    None
}
