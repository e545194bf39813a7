//! Supervisor test harness
//!
//! Wires a [`ConnectionSupervisor`] to a [`MockTransport`], a channel
//! dispatcher and an event subscription. Meant for
//! `#[tokio::test(start_paused = true)]`, where sleeping lets every queued
//! command, transport event and due timer run before returning.

use std::sync::Arc;
use std::time::Duration;

use pushmux_core::{
    BaseUrl, ConnectionStatus, EventReceiver, InboundMessage, StatusSnapshot, SupervisorConfig,
};
use pushmux_supervisor::{ChannelDispatcher, ConnectionSupervisor};
use tokio::sync::mpsc;

use crate::mocks::{MockMode, MockTransport};

pub const TEST_BASE_URL: &str = "ws://push.test";

pub struct SupervisorTestHarness {
    /// The supervisor under test
    pub supervisor: ConnectionSupervisor,

    /// Transport double recording every attempt
    pub transport: Arc<MockTransport>,

    /// Inbound messages forwarded by the supervisor
    pub messages: mpsc::UnboundedReceiver<InboundMessage>,

    /// Domain events, subscribed before the first command
    pub events: EventReceiver,
}

impl SupervisorTestHarness {
    pub fn new(mode: MockMode) -> Self {
        Self::build(mode, SupervisorConfig::default(), Some(TEST_BASE_URL))
    }

    pub fn with_config(mode: MockMode, config: SupervisorConfig) -> Self {
        Self::build(mode, config, Some(TEST_BASE_URL))
    }

    pub fn with_base_url(mode: MockMode, base_url: &str) -> Self {
        Self::build(mode, SupervisorConfig::default(), Some(base_url))
    }

    pub fn without_base_url(mode: MockMode) -> Self {
        Self::build(mode, SupervisorConfig::default(), None)
    }

    fn build(mode: MockMode, config: SupervisorConfig, base_url: Option<&str>) -> Self {
        crate::init_test_tracing();

        let transport = MockTransport::new(mode);
        let (dispatcher, messages) = ChannelDispatcher::channel();

        let mut builder = ConnectionSupervisor::builder(transport.clone())
            .config(config)
            .dispatcher(Arc::new(dispatcher));
        if let Some(url) = base_url {
            builder = builder.base_url(BaseUrl::parse(url).expect("valid test base url"));
        }
        let supervisor = builder.spawn().expect("supervisor spawns");
        let events = supervisor.subscribe_events();

        Self {
            supervisor,
            transport,
            messages,
            events,
        }
    }

    /// Activate `keys` and wait until the worker has applied it
    pub async fn activate(&self, keys: &[&str]) {
        self.supervisor
            .update_active_keys(keys.iter().copied())
            .await
            .expect("update_active_keys");
        self.settle().await;
    }

    /// Let queued work run; with a paused clock this advances 1ms.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    /// Advance time by `duration`, running every timer that falls due
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
        self.settle().await;
    }

    pub fn status(&self, key: &str) -> Option<ConnectionStatus> {
        self.supervisor.status(key)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.supervisor.snapshot()
    }

    /// Wait until `key` reaches `status` in the published snapshot
    pub async fn wait_for_status(&self, key: &str, status: ConnectionStatus, timeout: Duration) -> bool {
        let mut rx = self.supervisor.subscribe_snapshots();
        tokio::time::timeout(timeout, rx.wait_for(|s| s.get(key) == Some(status)))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// Wait until `key` is absent from the published snapshot
    pub async fn wait_for_removal(&self, key: &str, timeout: Duration) -> bool {
        let mut rx = self.supervisor.subscribe_snapshots();
        tokio::time::timeout(timeout, rx.wait_for(|s| !s.contains(key)))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}
