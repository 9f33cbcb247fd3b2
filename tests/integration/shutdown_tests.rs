//! Integration tests for server shutdown teardown.

use code_relay::models::event::ServerEvent;
use code_relay::orchestrator::coordinator::KILLED_BY_SERVER;
use code_relay::orchestrator::RunOutcome;

use super::test_helpers::{join, next_event, Harness, EVENT_TIMEOUT};

#[tokio::test]
async fn shutdown_with_no_sessions_is_a_no_op() {
    let h = Harness::new();
    assert_eq!(h.coordinator.shutdown().await, 0);
}

#[tokio::test]
async fn shutdown_kills_every_session_and_releases_files() {
    let h = Harness::new();
    let (a, mut rx_a) = h.connect();
    let (b, mut rx_b) = h.connect();

    let task_a = h.start(&a, "sh", "echo up\nexec sleep 30\n");
    let task_b = h.start(&b, "compiled", "echo up\nexec sleep 30\n");
    assert_eq!(next_event(&mut rx_a).await, ServerEvent::output("up"));
    assert_eq!(next_event(&mut rx_b).await, ServerEvent::output("up"));

    let torn_down = tokio::time::timeout(EVENT_TIMEOUT, h.coordinator.shutdown())
        .await
        .expect("shutdown completes");
    assert_eq!(torn_down, 2);

    // Still-connected clients learn why their program stopped.
    assert_eq!(next_event(&mut rx_a).await, ServerEvent::error(KILLED_BY_SERVER));
    assert_eq!(next_event(&mut rx_b).await, ServerEvent::error(KILLED_BY_SERVER));

    assert_eq!(join(task_a).await.outcome, RunOutcome::Killed);
    assert_eq!(join(task_b).await.outcome, RunOutcome::Killed);
    assert!(h.coordinator.registry().is_empty());
    assert!(h.leftover_files().is_empty());
}
