//! Active key set reconciliation tests
//!
//! - update_active_keys add/remove/keep semantics
//! - force_reconnect_all ordering
//! - At most one live attempt per key under concurrent commands

use std::time::Duration;

use pretty_assertions::assert_eq;
use tests::events::{count_type, drain_events, status_sequence};
use tests::{ConnectionStatus, DomainEvent, MockMode, SupervisorTestHarness};

#[tokio::test(start_paused = true)]
async fn test_update_active_keys_reconciles_add_keep_remove() {
    let harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.activate(&["a", "b"]).await;

    harness.activate(&["b", "c"]).await;

    let snapshot = harness.snapshot();
    assert!(!snapshot.contains("a"));
    assert_eq!(snapshot.get("b"), Some(ConnectionStatus::Connected));
    assert_eq!(snapshot.get("c"), Some(ConnectionStatus::Connected));

    assert_eq!(harness.transport.opens_for("a")[0].close_code(), Some(1000));
    // Healthy key is left alone
    assert_eq!(harness.transport.opens_for("b").len(), 1);
    assert_eq!(harness.transport.opens_for("c").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_key_is_reasserted_on_update() {
    let harness = SupervisorTestHarness::new(MockMode::Manual);
    harness.activate(&["k1"]).await;

    harness.transport.last_open("k1").unwrap().fail("handshake failed");
    harness.settle().await;
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Error));

    harness.advance(Duration::from_secs(3)).await;
    harness.activate(&["k1"]).await;
    assert_eq!(harness.transport.opens_for("k1").len(), 2);
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Connecting));

    // The pending retry was superseded by the new attempt
    harness.advance(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.opens_for("k1").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_dropped_after_deactivation() {
    let mut harness = SupervisorTestHarness::new(MockMode::Unreachable);
    harness.activate(&["k1"]).await;
    assert_eq!(harness.status("k1"), Some(ConnectionStatus::Error));

    harness.activate(&[]).await;
    harness.advance(Duration::from_secs(30)).await;

    assert_eq!(harness.transport.open_count(), 1);
    assert!(harness.snapshot().is_empty());
    let events = drain_events(&mut harness.events);
    assert_eq!(count_type(&events, "monitor_stopped"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_force_reconnect_all_marks_connecting_first() {
    let mut harness = SupervisorTestHarness::new(MockMode::Reachable);
    harness.activate(&["a", "b"]).await;
    drain_events(&mut harness.events);

    harness.supervisor.force_reconnect_all().await.unwrap();
    harness.settle().await;

    let events = drain_events(&mut harness.events);
    assert_eq!(
        status_sequence(&events, "a"),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
    assert_eq!(
        status_sequence(&events, "b"),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );

    // Both keys flip to Connecting before either reconnects
    let statuses: Vec<ConnectionStatus> = events.iter().filter_map(DomainEvent::status).collect();
    assert_eq!(
        &statuses[..2],
        &[ConnectionStatus::Connecting, ConnectionStatus::Connecting]
    );

    for key in ["a", "b"] {
        let handles = harness.transport.opens_for(key);
        assert_eq!(handles.len(), 2);
        assert!(handles[0].is_closed());
        assert_eq!(harness.status(key), Some(ConnectionStatus::Connected));
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_commands_keep_one_attempt_per_key() {
    let harness = SupervisorTestHarness::new(MockMode::Manual);

    let mut tasks = Vec::new();
    for i in 0..40 {
        let supervisor = harness.supervisor.clone();
        tasks.push(tokio::spawn(async move {
            match i % 4 {
                0 => supervisor.connect("k1").await,
                1 => supervisor.update_active_keys(["k1", "k2"]).await,
                2 => supervisor.force_reconnect_all().await,
                _ => supervisor.connect("k2").await,
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    harness.settle().await;

    assert_eq!(harness.transport.exclusivity_violations(), 0);
    assert_eq!(harness.transport.open_handles("k1"), 1);
    assert_eq!(harness.transport.open_handles("k2"), 1);

    for key in ["k1", "k2"] {
        harness.transport.last_open(key).unwrap().open();
    }
    harness.settle().await;
    assert_eq!(harness.supervisor.status_counts().connected, 2);
}

#[tokio::test(start_paused = true)]
async fn test_keys_converge_once_server_becomes_reachable() {
    let harness = SupervisorTestHarness::new(MockMode::Unreachable);
    harness.activate(&["a", "b", "c"]).await;
    assert_eq!(harness.supervisor.error_keys().len(), 3);

    harness.transport.set_reachable(true);

    // One retry interval plus one monitor interval bounds recovery
    let bound = Duration::from_secs(70);
    for key in ["a", "b", "c"] {
        assert!(
            harness
                .wait_for_status(key, ConnectionStatus::Connected, bound)
                .await,
            "{} did not converge",
            key
        );
    }
}
