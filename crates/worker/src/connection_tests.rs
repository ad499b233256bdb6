// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn backoff_doubles_and_caps_at_the_maximum() {
    let mut delay = INITIAL_RECONNECT_DELAY;
    let mut observed = Vec::new();
    for _ in 0..8 {
        observed.push(delay.as_secs());
        delay = next_delay(delay);
    }
    assert_eq!(observed, vec![1, 2, 4, 8, 16, 32, 60, 60]);
}

#[test]
fn worker_id_is_appended_as_query_parameter() {
    assert_eq!(
        with_worker_id("ws://localhost:8080/api/v1/selfhosted/worker/ws", "worker-a"),
        "ws://localhost:8080/api/v1/selfhosted/worker/ws?worker_id=worker-a"
    );
    assert_eq!(
        with_worker_id("wss://cp.example.com/ws?tenant=t1", "worker-a"),
        "wss://cp.example.com/ws?tenant=t1&worker_id=worker-a"
    );
}

#[test]
fn worker_id_is_escaped() {
    assert_eq!(
        with_worker_id("ws://h/ws", "host 1/b"),
        "ws://h/ws?worker_id=host%201%2Fb"
    );
}

#[tokio::test]
async fn outbound_preserves_enqueue_order() {
    let (tx, mut rx) = tokio::sync::mpsc::channel(SEND_QUEUE_CAPACITY);
    let outbound = Outbound::new(tx, CancellationToken::new());

    outbound.send("f1".to_string()).await.unwrap();
    outbound.send("f2".to_string()).await.unwrap();
    outbound.send("f3".to_string()).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), "f1");
    assert_eq!(rx.recv().await.unwrap(), "f2");
    assert_eq!(rx.recv().await.unwrap(), "f3");
}

#[tokio::test]
async fn send_fails_with_shutdown_when_cancelled() {
    let (tx, _rx) = tokio::sync::mpsc::channel(1);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outbound = Outbound::new(tx, cancel);

    let err = outbound.send("frame".to_string()).await.unwrap_err();
    assert!(matches!(err, SendError::Shutdown));
}

#[tokio::test(start_paused = true)]
async fn send_times_out_on_a_full_queue() {
    let (tx, _rx) = tokio::sync::mpsc::channel(1);
    let outbound = Outbound::new(tx.clone(), CancellationToken::new());

    // Fill the queue; the receiver never drains it.
    tx.send("occupant".to_string()).await.unwrap();

    let err = outbound.send("frame".to_string()).await.unwrap_err();
    assert!(matches!(err, SendError::Timeout));
}

#[tokio::test]
async fn send_fails_with_shutdown_when_receiver_is_gone() {
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    drop(rx);
    let outbound = Outbound::new(tx, CancellationToken::new());

    let err = outbound.send("frame".to_string()).await.unwrap_err();
    assert!(matches!(err, SendError::Shutdown));
}
