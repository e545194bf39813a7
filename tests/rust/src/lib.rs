//! Shared test utilities and fixtures for PushMux integration tests.

pub use pushmux_core::{
    BaseUrl, ConnectionKey, ConnectionStatus, DomainEvent, InboundMessage, StatusSnapshot,
    SupervisorConfig,
};

pub use mocks::{MockHandle, MockMode, MockTransport};

/// Supervisor test harness
pub mod harness;
pub use harness::SupervisorTestHarness;

/// Event testing utilities
pub mod events {
    use std::time::Duration;

    use pushmux_core::{ConnectionStatus, DomainEvent, EventReceiver};

    /// Collect events from a receiver until `timeout` passes without one
    pub async fn collect_events(rx: &mut EventReceiver, timeout: Duration) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(timeout, rx.recv()).await {
            events.push(event);
        }
        events
    }

    /// Take everything already queued without waiting
    pub fn drain_events(rx: &mut EventReceiver) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for an event matching `predicate`
    pub async fn wait_for_event<F>(
        rx: &mut EventReceiver,
        timeout: Duration,
        predicate: F,
    ) -> Option<DomainEvent>
    where
        F: Fn(&DomainEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(event)) if predicate(&event) => return Some(event),
                Ok(Some(_)) => continue,
                Ok(None) => return None,
                Err(_) => return None,
            }
        }
    }

    /// Status transitions reported for `key`, in order
    pub fn status_sequence(events: &[DomainEvent], key: &str) -> Vec<ConnectionStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                DomainEvent::ConnectionStatusChanged {
                    key: k, status, ..
                } if k.as_str() == key => Some(*status),
                _ => None,
            })
            .collect()
    }

    /// Assert that a status change to `expected` was emitted for `key`
    pub fn assert_status_changed(
        events: &[DomainEvent],
        key: &str,
        expected: ConnectionStatus,
    ) -> bool {
        status_sequence(events, key).contains(&expected)
    }

    pub fn count_type(events: &[DomainEvent], type_name: &str) -> usize {
        events.iter().filter(|e| e.type_name() == type_name).count()
    }
}

/// Initialise test logging once (honours RUST_LOG)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
