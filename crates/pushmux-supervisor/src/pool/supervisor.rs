//! ConnectionSupervisor - public handle to the supervisor worker
//!
//! Command/query split:
//! - Commands (connect, disconnect, update_active_keys, ...) are queued to
//!   the single worker task and acknowledged once applied
//! - Queries (snapshot, status, counts) read the registry and the published
//!   snapshot directly and never wait on the worker
//!
//! The handle is cheap to clone. Dropping every clone stops the worker and
//! closes all connections.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use pushmux_core::{
    parse_endpoint, BaseUrl, ConfigError, ConnectionKey, ConnectionStatus, EventBus, EventFilter,
    EventReceiver, StatusCounts, StatusSnapshot, SupervisorConfig,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

use super::broadcaster::StatusBroadcaster;
use super::registry::{ConnectionRecordView, ConnectionRegistry};
use super::transport::Transport;
use super::worker::SupervisorWorker;
use crate::consumers::{spawn_dispatch_task, LoggingDispatcher, MessageDispatcher};
use crate::error::{Result, SupervisorError};

/// Acknowledgement channel carried by every command
pub(crate) type Ack<T = ()> = oneshot::Sender<T>;

/// Commands processed by the worker, in arrival order
pub(crate) enum Command {
    Connect {
        key: ConnectionKey,
        url: Option<String>,
        ack: Ack,
    },
    Disconnect {
        key: ConnectionKey,
        ack: Ack,
    },
    DisconnectAll {
        ack: Ack,
    },
    UpdateActiveKeys {
        keys: HashSet<ConnectionKey>,
        ack: Ack,
    },
    ForceReconnectAll {
        ack: Ack,
    },
    SetBaseUrl {
        url: BaseUrl,
        ack: Ack,
    },
    HealthCheck {
        ack: Ack,
    },
    Shutdown {
        ack: Ack,
    },
}

/// Builder for a [`ConnectionSupervisor`]
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    transport: Arc<dyn Transport>,
    base_url: Option<BaseUrl>,
    dispatcher: Option<Arc<dyn MessageDispatcher>>,
    event_bus: Option<EventBus>,
}

impl SupervisorBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            config: SupervisorConfig::default(),
            transport,
            base_url: None,
            dispatcher: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn base_url(mut self, url: BaseUrl) -> Self {
        self.base_url = Some(url);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn MessageDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Share an existing event bus instead of creating one
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Validate the configuration and spawn the worker on the current runtime.
    pub fn spawn(self) -> Result<ConnectionSupervisor> {
        self.config.validate()?;

        let event_bus = self
            .event_bus
            .unwrap_or_else(|| EventBus::with_capacity(self.config.event_capacity));
        let registry = Arc::new(ConnectionRegistry::new());
        let base_url = Arc::new(RwLock::new(self.base_url.clone()));
        let broadcaster = StatusBroadcaster::new(event_bus.sender());
        let snapshots = broadcaster.subscribe();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(LoggingDispatcher));
        spawn_dispatch_task(dispatcher, message_rx);

        info!(
            transport = %self.transport.description(),
            base_url = ?self.base_url.as_ref().map(BaseUrl::as_str),
            retry_delay_ms = self.config.retry_delay.as_millis() as u64,
            monitor_interval_ms = self.config.monitor_interval.as_millis() as u64,
            "[Supervisor] Starting"
        );

        let worker = SupervisorWorker::new(
            self.config,
            self.transport,
            registry.clone(),
            base_url.clone(),
            broadcaster,
            event_bus.sender(),
            command_rx,
            message_tx,
        );
        tokio::spawn(worker.run());

        Ok(ConnectionSupervisor {
            commands: command_tx,
            registry,
            snapshots,
            base_url,
            event_bus,
        })
    }
}

/// Handle to a running connection supervisor
#[derive(Clone)]
pub struct ConnectionSupervisor {
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<ConnectionRegistry>,
    snapshots: watch::Receiver<StatusSnapshot>,
    base_url: Arc<RwLock<Option<BaseUrl>>>,
    event_bus: EventBus,
}

impl ConnectionSupervisor {
    pub fn builder(transport: Arc<dyn Transport>) -> SupervisorBuilder {
        SupervisorBuilder::new(transport)
    }

    async fn request(&self, build: impl FnOnce(Ack) -> Command) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(build(ack))
            .map_err(|_| SupervisorError::Stopped)?;
        done.await.map_err(|_| SupervisorError::Stopped)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Request a connection for `key` against the configured base URL.
    ///
    /// No-op if the key is already healthy or an attempt is in flight.
    pub async fn connect(&self, key: impl Into<ConnectionKey>) -> Result<()> {
        let key = checked_key(key.into())?;
        self.request(|ack| Command::Connect {
            key,
            url: None,
            ack,
        })
        .await
    }

    /// Request a connection for `key` against an explicit endpoint.
    pub async fn connect_to(&self, key: impl Into<ConnectionKey>, url: &str) -> Result<()> {
        let key = checked_key(key.into())?;
        let url = parse_endpoint(url)?;
        self.request(|ack| Command::Connect {
            key,
            url: Some(url),
            ack,
        })
        .await
    }

    /// Tear down `key` and remove it from the snapshot. Unknown keys are a no-op.
    pub async fn disconnect(&self, key: impl Into<ConnectionKey>) -> Result<()> {
        let key = key.into();
        self.request(|ack| Command::Disconnect { key, ack }).await
    }

    /// Tear down everything, clear the active set and stop the monitor
    pub async fn disconnect_all(&self) -> Result<()> {
        self.request(|ack| Command::DisconnectAll { ack }).await
    }

    /// Reconcile toward `keys`: disconnect removed keys, connect new ones
    /// and re-assert every key that is not connected.
    pub async fn update_active_keys<I, K>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<ConnectionKey>,
    {
        let keys: HashSet<ConnectionKey> = keys
            .into_iter()
            .map(Into::into)
            .filter(|k: &ConnectionKey| !k.is_empty())
            .collect();
        self.request(|ack| Command::UpdateActiveKeys { keys, ack })
            .await
    }

    /// Mark every active key `Connecting` and reconnect each one
    pub async fn force_reconnect_all(&self) -> Result<()> {
        self.request(|ack| Command::ForceReconnectAll { ack }).await
    }

    /// Change the push server base URL.
    ///
    /// Invalid URLs are rejected here and leave the running state untouched.
    /// A valid change closes every connection and reconnects the active keys
    /// after a short settle delay.
    pub async fn set_base_url(&self, raw: &str) -> Result<BaseUrl> {
        let url = BaseUrl::parse(raw)?;
        let applied = url.clone();
        self.request(|ack| Command::SetBaseUrl { url, ack }).await?;
        Ok(applied)
    }

    /// Run one health monitor pass now
    pub async fn health_check(&self) -> Result<()> {
        self.request(|ack| Command::HealthCheck { ack }).await
    }

    /// Close every connection and stop the worker
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|ack| Command::Shutdown { ack }).await
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Latest published snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stream of snapshot updates
    pub fn subscribe_snapshots(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshots.clone()
    }

    /// Domain event stream
    pub fn subscribe_events(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Domain events matching `filter`, e.g. a single key
    pub fn subscribe_events_filtered(&self, filter: EventFilter) -> EventReceiver {
        self.event_bus.subscribe_filtered(filter)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn status(&self, key: &str) -> Option<ConnectionStatus> {
        self.registry.status(key)
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.registry.snapshot().counts()
    }

    pub fn error_keys(&self) -> Vec<ConnectionKey> {
        self.registry.snapshot().error_keys()
    }

    pub fn record(&self, key: &str) -> Option<ConnectionRecordView> {
        self.registry.view(key)
    }

    pub fn records(&self) -> Vec<ConnectionRecordView> {
        self.registry.views()
    }

    pub fn base_url(&self) -> Option<BaseUrl> {
        self.base_url.read().clone()
    }
}

fn checked_key(key: ConnectionKey) -> std::result::Result<ConnectionKey, ConfigError> {
    if key.is_empty() {
        Err(ConfigError::EmptyKey)
    } else {
        Ok(key)
    }
}
