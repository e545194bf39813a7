//! Connect / disconnect lifecycle tests
//!
//! - State transitions (Connecting -> Connected, Error, Disconnected)
//! - Idempotence and duplicate suppression
//! - Cleanup on disconnect and shutdown
//! - Message forwarding and diagnostics

use std::time::Duration;

use pretty_assertions::assert_eq;
use pushmux_core::ConfigError;
use pushmux_supervisor::SupervisorError;
use tests::events::{count_type, drain_events};
use tests::{ConnectionKey, ConnectionStatus, MockMode, SupervisorTestHarness};

// ============================================================================
// Basic State Transitions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_active_key_reaches_connected() {
    let harness = SupervisorTestHarness::new(MockMode::Reachable);

    harness.activate(&["k1"]).await;

    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connected));
    assert_eq!(harness.transport.urls_for("k1"), vec!["ws://push.test/k1"]);

    let record = harness.supervisor.record("k1").unwrap();
    assert_eq!(record.attempt_count, 0);
    assert!(record.has_handle);
    assert!(!record.retry_pending);
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent_when_healthy() {
    let harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.activate(&["k1"]).await;

    for _ in 0..3 {
        harness.supervisor.connect("k1").await.unwrap();
    }
    harness.settle().await;

    assert_eq!(harness.transport.open_count(), 1);
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connected));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_connect_while_connecting_is_suppressed() {
    let harness = SupervisorTestHarness::new(MockMode::Manual);

    for _ in 0..5 {
        harness.supervisor.connect("k1").await.unwrap();
    }
    harness.settle().await;

    assert_eq!(harness.transport.opens_for("k1").len(), 1);
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connecting));
}

#[tokio::test(start_paused = true)]
async fn test_connect_respects_cooldown_after_failure() {
    let harness = SupervisorTestHarness::new(MockMode::Unreachable);

    harness.supervisor.connect("k1").await.unwrap();
    harness.settle().await;
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Error));

    // Inside the 2s cooldown
    harness.supervisor.connect("k1").await.unwrap();
    harness.settle().await;
    assert_eq!(harness.transport.open_count(), 1);

    harness.advance(Duration::from_secs(2)).await;
    harness.supervisor.connect("k1").await.unwrap();
    harness.settle().await;
    assert_eq!(harness.transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_events_from_superseded_attempt_are_ignored() {
    let harness = SupervisorTestHarness::new(MockMode::Manual);
    harness.activate(&["k1"]).await;

    harness.supervisor.force_reconnect_all().await.unwrap();
    harness.settle().await;

    let handles = harness.transport.opens_for("k1");
    assert_eq!(handles.len(), 2);
    assert!(handles[0].is_closed());

    handles[0].open();
    harness.settle().await;
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connecting));

    handles[1].open();
    harness.settle().await;
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connected));
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnect_removes_key_and_closes_handle() {
    let mut harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.activate(&["k1"]).await;
    drain_events(&mut harness.events);

    harness.supervisor.disconnect("k1").await.unwrap();

    assert!(!harness.snapshot().contains("k1"));
    assert!(harness.supervisor.record("k1").is_none());
    let handle = harness.transport.last_open("k1").unwrap();
    assert_eq!(handle.close_code(), Some(1000));

    let events = drain_events(&mut harness.events);
    assert_eq!(count_type(&events, "connection_removed"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let harness = SupervisorTestHarness::new(MockMode::Unreachable);
    harness.activate(&["k1"]).await;
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Error));
    assert!(harness.supervisor.record("k1").unwrap().retry_pending);

    harness.supervisor.disconnect("k1").await.unwrap();
    harness.advance(Duration::from_secs(30)).await;

    assert_eq!(harness.transport.open_count(), 1);
    assert!(!harness.snapshot().contains("k1"));
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_active_key_is_restored_by_monitor() {
    let harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.activate(&["k1"]).await;

    harness.supervisor.disconnect("k1").await.unwrap();
    assert!(!harness.snapshot().contains("k1"));

    // Still in the active set; the next reconciliation pass restores it
    harness.advance(Duration::from_secs(60)).await;
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connected));
    assert_eq!(harness.transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_unknown_key_is_noop() {
    let mut harness = SupervisorTestHarness::new(MockMode::Reachable);

    harness.supervisor.disconnect("nope").await.unwrap();
    harness.settle().await;

    let events = drain_events(&mut harness.events);
    assert_eq!(count_type(&events, "connection_removed"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_all_tears_everything_down() {
    let mut harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.activate(&["a", "b"]).await;
    drain_events(&mut harness.events);

    harness.supervisor.disconnect_all().await.unwrap();

    assert!(harness.snapshot().is_empty());
    assert!(harness.transport.opens_for("a")[0].is_closed());
    assert!(harness.transport.opens_for("b")[0].is_closed());

    let events = drain_events(&mut harness.events);
    assert_eq!(count_type(&events, "connection_removed"), 2);
    assert_eq!(count_type(&events, "monitor_stopped"), 1);

    // Active mirror cleared: nothing comes back
    harness.advance(Duration::from_secs(120)).await;
    assert_eq!(harness.transport.open_count(), 2);
}

// ============================================================================
// Transport Events
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_inbound_messages_are_forwarded() {
    let mut harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.activate(&["k1"]).await;

    let handle = harness.transport.last_open("k1").unwrap();
    handle.deliver("hello");
    handle.deliver("world");

    let first = tokio::time::timeout(Duration::from_secs(1), harness.messages.recv())
        .await
        .unwrap()
        .unwrap();
    let second = harness.messages.recv().await.unwrap();

    assert_eq!(first.key, ConnectionKey::from("k1"));
    assert_eq!(first.payload, "hello");
    assert_eq!(second.payload, "world");
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connected));
}

#[tokio::test(start_paused = true)]
async fn test_peer_close_schedules_reconnect() {
    let harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.activate(&["k1"]).await;

    harness
        .transport
        .last_open("k1")
        .unwrap()
        .peer_close(1001, "going away");
    harness.settle().await;

    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Disconnected));
    let record = harness.supervisor.record("k1").unwrap();
    assert!(record.retry_pending);
    assert!(!record.has_handle);

    harness.advance(Duration::from_secs(10)).await;
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connected));
    assert_eq!(harness.transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_of_inactive_key_is_not_retried() {
    let harness = SupervisorTestHarness::new(MockMode::Unreachable);

    harness.supervisor.connect("adhoc").await.unwrap();
    harness.settle().await;

    assert_eq!(harness.status("adhoc"), Some(ConnectionStatus::Error));
    assert!(!harness.supervisor.record("adhoc").unwrap().retry_pending);

    harness.advance(Duration::from_secs(30)).await;
    assert_eq!(harness.transport.open_count(), 1);
}

// ============================================================================
// Validation & Configuration
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_without_base_url_is_skipped() {
    let harness = SupervisorTestHarness::without_base_url(MockMode::Reachable);

    harness.supervisor.connect("k1").await.unwrap();
    harness.settle().await;
    assert_eq!(harness.transport.open_count(), 0);
    assert!(harness.status("k1").is_none());

    harness
        .supervisor
        .connect_to("k1", "https://push.test/custom/k1")
        .await
        .unwrap();
    harness.settle().await;
    assert_eq!(
        harness.transport.urls_for("k1"),
        vec!["wss://push.test/custom/k1"]
    );
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connected));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_input_is_rejected() {
    let harness = SupervisorTestHarness::new(MockMode::Reachable);

    let empty = harness.supervisor.connect("   ").await;
    assert!(matches!(
        empty,
        Err(SupervisorError::Config(ConfigError::EmptyKey))
    ));

    let scheme = harness.supervisor.connect_to("k1", "ftp://push.test/k1").await;
    assert!(matches!(
        scheme,
        Err(SupervisorError::Config(ConfigError::UnsupportedScheme(_)))
    ));
    assert_eq!(harness.transport.open_count(), 0);
}

// ============================================================================
// Diagnostics
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_status_counts_and_error_keys() {
    let harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.transport.reject_pattern("/bad");
    harness.activate(&["good", "bad"]).await;

    let counts = harness.supervisor.status_counts();
    assert_eq!(counts.connected, 1);
    assert_eq!(counts.error, 1);
    assert_eq!(counts.total(), 2);
    assert_eq!(
        harness.supervisor.error_keys(),
        vec![ConnectionKey::from("bad")]
    );

    let views = harness.supervisor.records();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].key.as_str(), "bad");
    assert_eq!(views[0].last_error.as_deref(), Some("connection refused"));
    assert_eq!(views[0].attempt_count, 1);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_connections_and_rejects_commands() {
    let mut harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.activate(&["k1"]).await;

    harness.supervisor.shutdown().await.unwrap();
    harness.settle().await;

    assert!(harness.transport.last_open("k1").unwrap().is_closed());
    assert!(harness.snapshot().is_empty());
    assert!(!harness.supervisor.is_running());
    assert!(matches!(
        harness.supervisor.connect("k1").await,
        Err(SupervisorError::Stopped)
    ));

    let events = drain_events(&mut harness.events);
    assert_eq!(count_type(&events, "supervisor_stopped"), 1);
}
