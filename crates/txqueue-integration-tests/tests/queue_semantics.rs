//! Integration tests for the core queue semantics
//!
//! These tests verify, through the facade and the memory broker:
//! - Round trip of content and identity
//! - Ack finality and nack redelivery
//! - Blocking dequeue on an empty queue
//! - Enqueue failure isolation
//! - Single resolution of a dequeue handle

mod common;

use common::{bg, within, Harness, QUEUE};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_pending;
use txqueue::{QueueError, QueueMessage, TextMessage};

/// Verify that a message comes back with its content and a backend identity
#[tokio::test]
async fn test_round_trip() {
    // Arrange
    let harness = Harness::new().await;
    let mut message = harness.queue.new_message();
    message.set_text("hello".to_string());
    assert!(message.id().is_none());

    // Act
    harness.queue.enqueue(&bg(), &message).await.unwrap();
    let handle = harness.queue.dequeue(&bg()).await.unwrap();

    // Assert
    assert_eq!(handle.message().text(), "hello");
    assert!(handle.message().id().is_some());
    handle.ack(&bg()).await.unwrap();
}

/// Verify that messages are delivered in enqueue order
#[tokio::test]
async fn test_fifo_order() {
    let harness = Harness::new().await;
    for content in ["one", "two", "three"] {
        harness.send(content).await;
    }

    for expected in ["one", "two", "three"] {
        let handle = harness.queue.dequeue(&bg()).await.unwrap();
        assert_eq!(handle.message().text(), expected);
        handle.ack(&bg()).await.unwrap();
    }
}

/// Verify that an acknowledged message is never delivered again
#[tokio::test(start_paused = true)]
async fn test_ack_finality() {
    // Arrange
    let harness = Harness::new().await;
    harness.send("once").await;

    // Act
    let handle = harness.queue.dequeue(&bg()).await.unwrap();
    handle.ack(&bg()).await.unwrap();

    // Assert
    let err = harness.queue.dequeue(&within(500)).await.unwrap_err();
    assert!(err.is_deadline_exceeded());
    assert_eq!(harness.broker.pending(QUEUE), 0);
    assert_eq!(harness.broker.in_flight(QUEUE), 0);
}

/// Verify that a rolled back message is redelivered unchanged, ahead of
/// newer messages
#[tokio::test]
async fn test_nack_redelivery() {
    // Arrange
    let harness = Harness::new().await;
    harness.send("first").await;
    harness.send("second").await;

    // Act
    let handle = harness.queue.dequeue(&bg()).await.unwrap();
    let original = handle.message().clone();
    handle.nack(&bg()).await.unwrap();

    // Assert
    let again = harness.queue.dequeue(&bg()).await.unwrap();
    assert_eq!(again.message(), &original);
    again.ack(&bg()).await.unwrap();
}

/// Verify that dequeue waits on an empty queue until a message arrives
#[tokio::test]
async fn test_dequeue_blocks_until_enqueue() {
    // Arrange
    let harness = Harness::new().await;
    let ctx = bg();

    // Act: first poll finds nothing
    let mut dequeue = tokio_test::task::spawn(harness.queue.dequeue(&ctx));
    assert_pending!(dequeue.poll());

    harness.send("late").await;

    // Assert
    assert!(dequeue.is_woken());
    let handle = match dequeue.poll() {
        std::task::Poll::Ready(result) => result.unwrap(),
        std::task::Poll::Pending => panic!("dequeue still pending after enqueue"),
    };
    assert_eq!(handle.message().text(), "late");
}

/// Verify a consumer task blocked in dequeue picks up a later enqueue
#[tokio::test]
async fn test_blocked_consumer_task_receives_message() {
    let harness = Arc::new(Harness::new().await);

    let consumer = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            let ctx = within(5_000);
            let handle = harness.queue.dequeue(&ctx).await?;
            let text = handle.message().text().to_string();
            handle.ack(&ctx).await?;
            Ok::<_, QueueError>(text)
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.send("wake up").await;

    assert_eq!(consumer.await.unwrap().unwrap(), "wake up");
}

/// Verify that a failed insert leaves the queue untouched
#[tokio::test]
async fn test_enqueue_failure_isolation() {
    // Arrange
    let harness = Harness::new().await;
    harness.broker.faults().fail_next_insert();

    // Act
    let result = harness
        .queue
        .enqueue(&bg(), &TextMessage::new("doomed"))
        .await;

    // Assert
    assert!(result.is_err());
    assert_eq!(harness.broker.pending(QUEUE), 0);

    // Queue keeps working afterwards
    harness.send("fine").await;
    assert_eq!(harness.broker.pending(QUEUE), 1);
}

/// Verify that a second ack or nack is rejected without touching the broker
#[tokio::test]
async fn test_double_resolution() {
    // Arrange
    let harness = Harness::new().await;
    harness.send("only").await;
    let handle = harness.queue.dequeue(&bg()).await.unwrap();

    // Act
    handle.ack(&bg()).await.unwrap();
    let second_ack = handle.ack(&bg()).await;
    let late_nack = handle.nack(&bg()).await;

    // Assert
    assert!(matches!(second_ack, Err(QueueError::AlreadyResolved)));
    assert!(matches!(late_nack, Err(QueueError::AlreadyResolved)));
    assert_eq!(harness.broker.pending(QUEUE), 0);
}

/// Verify that racing ack and nack resolve the handle exactly once
#[tokio::test]
async fn test_concurrent_resolution_resolves_once() {
    let harness = Harness::new().await;
    harness.send("contested").await;
    let handle = harness.queue.dequeue(&bg()).await.unwrap();

    let (ack_ctx, nack_ctx) = (bg(), bg());
    let (ack, nack) = tokio::join!(handle.ack(&ack_ctx), handle.nack(&nack_ctx));

    let outcomes = [ack.is_ok(), nack.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(harness.broker.in_flight(QUEUE), 0);

    // Whichever won decides where the message is
    let expected_pending = if nack.is_ok() { 1 } else { 0 };
    assert_eq!(harness.broker.pending(QUEUE), expected_pending);
}

/// Verify that dropping an unresolved handle makes the message visible again
#[tokio::test]
async fn test_dropped_handle_returns_message() {
    let harness = Harness::new().await;
    harness.send("abandoned").await;

    let handle = harness.queue.dequeue(&bg()).await.unwrap();
    let id = *handle.message().id().unwrap();
    drop(handle);

    let again = harness.queue.dequeue(&bg()).await.unwrap();
    assert_eq!(again.message().id(), Some(&id));
}
