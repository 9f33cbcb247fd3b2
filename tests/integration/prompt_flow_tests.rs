//! Integration tests for input prompting over real processes.

use std::time::Duration;

use code_relay::models::event::{ExitIndicator, ServerEvent};

use super::test_helpers::{collect_until_terminal, join, next_event, Harness};

#[tokio::test]
async fn prompt_shaped_output_requests_input_once() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect();

    let task = h.start(
        &conn,
        "sh",
        "printf 'Enter a number: '\nread n\necho \"got $n\"\n",
    );

    assert_eq!(next_event(&mut rx).await, ServerEvent::output("Enter a number: "));
    assert_eq!(next_event(&mut rx).await, ServerEvent::InputRequest);

    let session = h.coordinator.registry().lookup(conn.id()).expect("session live");
    assert!(session.waiting_for_input());

    // No second request while nothing changes.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(rx.try_recv().is_err(), "input_request must not repeat");

    assert!(h.coordinator.input(conn.id(), "5".into()));
    let rest = collect_until_terminal(&mut rx).await;
    assert_eq!(
        rest,
        vec![
            ServerEvent::output("got 5"),
            ServerEvent::Finished(ExitIndicator::exited(0)),
        ]
    );
    join(task).await;
    assert!(h.leftover_files().is_empty());
}

#[tokio::test]
async fn consecutive_prompts_each_request_input() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect();

    let task = h.start(
        &conn,
        "sh",
        "printf 'Enter a: '; read a; printf 'Enter b: '; read b; \
         printf 'Enter c: '; read c; echo \"Product = $((a*b*c))\"\n",
    );

    let mut events = Vec::new();
    for (prompt, value) in [("Enter a: ", "2"), ("Enter b: ", "3"), ("Enter c: ", "4")] {
        let output = next_event(&mut rx).await;
        assert_eq!(output, ServerEvent::output(prompt));
        let request = next_event(&mut rx).await;
        assert_eq!(request, ServerEvent::InputRequest, "after {prompt:?}");
        events.extend([output, request]);
        assert!(h.coordinator.input(conn.id(), value.into()));
    }
    events.extend(collect_until_terminal(&mut rx).await);

    assert_eq!(
        events,
        vec![
            ServerEvent::output("Enter a: "),
            ServerEvent::InputRequest,
            ServerEvent::output("Enter b: "),
            ServerEvent::InputRequest,
            ServerEvent::output("Enter c: "),
            ServerEvent::InputRequest,
            ServerEvent::output("Product = 24"),
            ServerEvent::Finished(ExitIndicator::exited(0)),
        ]
    );
    join(task).await;
    assert!(h.leftover_files().is_empty());
}

#[tokio::test]
async fn silent_read_requests_input_after_idle_timeout() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect();

    let task = h.start(&conn, "sh", "echo working\nread x\necho \"done $x\"\n");

    assert_eq!(next_event(&mut rx).await, ServerEvent::output("working"));
    let started = tokio::time::Instant::now();
    assert_eq!(next_event(&mut rx).await, ServerEvent::InputRequest);
    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "idle request came too early: {:?}",
        started.elapsed()
    );

    assert!(h.coordinator.input(conn.id(), "ok".into()));
    let rest = collect_until_terminal(&mut rx).await;
    assert_eq!(rest[0], ServerEvent::output("done ok"));
    join(task).await;
}

#[tokio::test]
async fn output_within_debounce_cancels_request() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect();

    let task = h.start(&conn, "sh", "printf 'Name: '\nsleep 0.02\necho later\n");
    let events = collect_until_terminal(&mut rx).await;

    assert!(
        !events.contains(&ServerEvent::InputRequest),
        "prompt followed by output must not request input: {events:?}"
    );
    assert_eq!(events.last(), Some(&ServerEvent::Finished(ExitIndicator::exited(0))));
    join(task).await;
}

#[tokio::test]
async fn unsolicited_input_is_forwarded() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect();

    // `sleep` first so the line is queued before the program reads it.
    let task = h.start(&conn, "sh", "sleep 0.1\nread x\necho \"early $x\"\n");
    let mut delivered = false;
    for _ in 0..100 {
        if h.coordinator.input(conn.id(), "bird".into()) {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(delivered, "session never registered");

    let events = collect_until_terminal(&mut rx).await;
    assert!(events.contains(&ServerEvent::output("early bird")), "{events:?}");
    join(task).await;
}

#[tokio::test]
async fn input_after_stdin_closed_does_not_end_session() {
    let h = Harness::new();
    let (conn, mut rx) = h.connect();

    let task = h.start(&conn, "sh", "exec 0<&-\necho closed\nsleep 0.2\necho still-here\n");
    assert_eq!(next_event(&mut rx).await, ServerEvent::output("closed"));
    assert!(h.coordinator.input(conn.id(), "ignored".into()));

    let rest = collect_until_terminal(&mut rx).await;
    assert!(rest.contains(&ServerEvent::output("still-here")), "{rest:?}");
    assert_eq!(rest.last(), Some(&ServerEvent::Finished(ExitIndicator::exited(0))));
    join(task).await;
}
