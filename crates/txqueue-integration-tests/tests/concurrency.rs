//! Integration tests for concurrent use of one queue
//!
//! These tests verify:
//! - Concurrent consumers never receive the same message
//! - Producers and consumers can run side by side
//! - Disconnect tears down both sides and reports every failure

mod common;

use common::{bg, within, Harness, QUEUE};
use std::collections::HashSet;
use std::sync::Arc;
use txqueue::{MessageId, QueueError, QueueMessage};

/// Verify that concurrent dequeues each get a distinct message
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dequeues_never_share_a_message() {
    // Arrange
    let harness = Arc::new(Harness::new().await);
    for i in 0..32 {
        harness.send(&format!("message-{i}")).await;
    }

    // Act
    let mut consumers = Vec::new();
    for _ in 0..32 {
        let harness = Arc::clone(&harness);
        consumers.push(tokio::spawn(async move {
            let ctx = within(5_000);
            let handle = harness.queue.dequeue(&ctx).await?;
            let id = *handle.message().id().expect("received messages carry an id");
            handle.ack(&ctx).await?;
            Ok::<MessageId, QueueError>(id)
        }));
    }

    // Assert
    let mut seen = HashSet::new();
    for consumer in consumers {
        let id = consumer.await.unwrap().unwrap();
        assert!(seen.insert(id), "message {id} delivered twice");
    }
    assert_eq!(seen.len(), 32);
    assert_eq!(harness.broker.pending(QUEUE), 0);
}

/// Verify that producers and blocked consumers make progress together
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_producers_and_consumers_interleave() {
    let harness = Arc::new(Harness::new().await);

    let consumers: Vec<_> = (0..8)
        .map(|_| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move {
                let ctx = within(5_000);
                let handle = harness.queue.dequeue(&ctx).await?;
                let text = handle.message().text().to_string();
                handle.ack(&ctx).await?;
                Ok::<String, QueueError>(text)
            })
        })
        .collect();

    let producers: Vec<_> = (0..8)
        .map(|i| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move { harness.send(&format!("job-{i}")).await })
        })
        .collect();

    for producer in producers {
        producer.await.unwrap();
    }

    let mut received: Vec<String> = Vec::new();
    for consumer in consumers {
        received.push(consumer.await.unwrap().unwrap());
    }
    received.sort();

    let mut expected: Vec<String> = (0..8).map(|i| format!("job-{i}")).collect();
    expected.sort();
    assert_eq!(received, expected);
}

/// Verify that disconnect closes both broker sessions
#[tokio::test]
async fn test_disconnect_closes_both_sides() {
    let harness = Harness::new().await;
    assert_eq!(harness.broker.open_sessions(), 2);

    harness.queue.disconnect(&bg()).await.unwrap();

    assert_eq!(harness.broker.open_sessions(), 0);
}

/// Verify that one failing side does not stop the other from disconnecting
#[tokio::test]
async fn test_disconnect_failure_does_not_mask_other_side() {
    // Arrange
    let harness = Harness::new().await;
    harness.broker.faults().fail_next_disconnect();

    // Act
    let err = harness.queue.disconnect(&bg()).await.unwrap_err();

    // Assert
    match err {
        QueueError::DisconnectFailed { enqueuer, dequeuer } => {
            assert_eq!(
                usize::from(enqueuer.is_some()) + usize::from(dequeuer.is_some()),
                1
            );
        }
        other => panic!("expected DisconnectFailed, got {other:?}"),
    }
    assert_eq!(harness.broker.open_sessions(), 1);

    // The failed side can be retried
    harness.queue.disconnect(&bg()).await.unwrap();
    assert_eq!(harness.broker.open_sessions(), 0);
}

/// Verify that operations after disconnect report a connection failure
#[tokio::test]
async fn test_operations_after_disconnect_fail() {
    let harness = Harness::new().await;
    harness.queue.disconnect(&bg()).await.unwrap();

    let enqueue = harness
        .queue
        .enqueue(&bg(), &txqueue::TextMessage::new("late"))
        .await;
    let dequeue = harness.queue.dequeue(&bg()).await;

    assert!(matches!(enqueue, Err(QueueError::ConnectionFailed { .. })));
    assert!(matches!(dequeue, Err(QueueError::ConnectionFailed { .. })));
}

/// Verify that disconnect ends a dequeue that is already waiting
#[tokio::test]
async fn test_disconnect_ends_a_blocked_dequeue() {
    // Arrange
    let harness = Arc::new(Harness::new().await);
    let consumer = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.queue.dequeue(&bg()).await.map(|_| ()) })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Act
    harness.queue.disconnect(&bg()).await.unwrap();

    // Assert
    let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), consumer)
        .await
        .expect("blocked dequeue observes the disconnect")
        .unwrap();
    assert!(matches!(outcome, Err(QueueError::ConnectionFailed { .. })));

    let producer = harness.broker.open_session().unwrap();
    let mut tx = producer.begin(&bg()).unwrap();
    tx.insert(&bg(), QUEUE, "after").unwrap();
    tx.commit().unwrap();
    assert_eq!(harness.broker.pending(QUEUE), 1);
    assert_eq!(harness.broker.in_flight(QUEUE), 0);
}
