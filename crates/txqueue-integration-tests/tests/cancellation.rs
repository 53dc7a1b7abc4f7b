//! Integration tests for cancellation and deadlines
//!
//! These tests verify:
//! - A dequeue on an empty queue ends with `DeadlineExceeded` at its deadline
//! - Cancelling from another task aborts a blocked dequeue
//! - The abort reaches the broker and leaves no extraction in flight
//! - Resolution with a finished context leaves the transaction open

mod common;

use common::{bg, within, Harness, QUEUE};
use std::sync::Arc;
use std::time::Duration;
use txqueue::{OperationContext, QueueMessage};

/// Verify that a dequeue gives up at its deadline
#[tokio::test(start_paused = true)]
async fn test_dequeue_deadline() {
    // Arrange
    let harness = Harness::new().await;
    let started = tokio::time::Instant::now();

    // Act
    let err = harness.queue.dequeue(&within(750)).await.unwrap_err();

    // Assert
    assert!(err.is_deadline_exceeded());
    assert!(started.elapsed() >= Duration::from_millis(750));
    assert_eq!(harness.broker.in_flight(QUEUE), 0);
}

/// Verify that cancelling from another task aborts a blocked dequeue
#[tokio::test]
async fn test_cancel_from_another_task() {
    // Arrange
    let harness = Arc::new(Harness::new().await);
    let ctx = bg();

    let consumer = {
        let harness = Arc::clone(&harness);
        let ctx = ctx.clone();
        tokio::spawn(async move { harness.queue.dequeue(&ctx).await.map(|_| ()) })
    };

    // Act
    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.cancel();

    // Assert
    let outcome = tokio::time::timeout(Duration::from_secs(5), consumer)
        .await
        .expect("dequeue observes the cancellation")
        .unwrap();
    assert!(outcome.unwrap_err().is_deadline_exceeded());
    assert_eq!(harness.broker.in_flight(QUEUE), 0);
}

/// Verify that a child context inherits its parent's cancellation
#[tokio::test]
async fn test_parent_cancellation_reaches_child_dequeue() {
    let harness = Arc::new(Harness::new().await);
    let parent = bg();
    let child = parent.child_with_timeout(Duration::from_secs(60));

    let consumer = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.queue.dequeue(&child).await.map(|_| ()) })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    parent.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), consumer)
        .await
        .expect("dequeue observes the cancellation")
        .unwrap();
    assert!(outcome.unwrap_err().is_deadline_exceeded());
}

/// Verify that an aborted dequeue does not swallow a message enqueued later
#[tokio::test(start_paused = true)]
async fn test_aborted_dequeue_loses_nothing() {
    let harness = Harness::new().await;

    let err = harness.queue.dequeue(&within(100)).await.unwrap_err();
    assert!(err.is_deadline_exceeded());

    harness.send("after").await;
    let handle = harness.queue.dequeue(&within(100)).await.unwrap();
    assert_eq!(handle.message().text(), "after");
}

/// Verify that an already finished context fails fast without touching
/// the queue
#[tokio::test]
async fn test_finished_context_fails_fast() {
    let harness = Harness::new().await;
    harness.send("waiting").await;
    let done = OperationContext::background();
    done.cancel();

    assert!(harness.queue.dequeue(&done).await.unwrap_err().is_deadline_exceeded());
    assert!(harness
        .queue
        .enqueue(&done, &txqueue::TextMessage::new("late"))
        .await
        .unwrap_err()
        .is_deadline_exceeded());
    assert_eq!(harness.broker.pending(QUEUE), 1);
}

/// Verify that acking with a finished context leaves the handle usable
#[tokio::test]
async fn test_ack_with_finished_context_keeps_transaction() {
    let harness = Harness::new().await;
    harness.send("pending").await;
    let handle = harness.queue.dequeue(&bg()).await.unwrap();

    let done = OperationContext::background();
    done.cancel();
    assert!(handle.ack(&done).await.unwrap_err().is_deadline_exceeded());
    assert!(!handle.is_resolved().await);
    assert_eq!(harness.broker.in_flight(QUEUE), 1);

    handle.ack(&bg()).await.unwrap();
    assert_eq!(harness.broker.in_flight(QUEUE), 0);
    assert_eq!(harness.broker.pending(QUEUE), 0);
}
