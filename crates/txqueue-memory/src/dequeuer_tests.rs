//! Tests for the memory dequeuer and its handles.

use super::*;
use crate::broker::MemoryBroker;
use std::time::Duration;
use txqueue::QueueMessage;

const QUEUE: &str = "text_msg_queue";

struct Fixture {
    broker: MemoryBroker,
    dequeuer: MemoryDequeuer,
}

impl Fixture {
    fn new() -> Self {
        let broker = MemoryBroker::new();
        broker.declare_queue(QUEUE);
        let dequeuer = MemoryDequeuer::new(
            broker.open_session().unwrap(),
            QueueName::new(QUEUE).unwrap(),
        );
        Self { broker, dequeuer }
    }

    fn publish(&self, content: &str) -> MessageId {
        let session = self.broker.open_session().unwrap();
        let ctx = OperationContext::background();
        let mut tx = session.begin(&ctx).unwrap();
        let id = tx.insert(&ctx, QUEUE, content).unwrap();
        tx.commit().unwrap();
        id
    }
}

// ============================================================================
// Dequeue
// ============================================================================

mod dequeue {
    use super::*;

    #[tokio::test]
    async fn test_dequeue_returns_message_with_identity() {
        let fixture = Fixture::new();
        let id = fixture.publish("hello");

        let handle = fixture
            .dequeuer
            .dequeue(&OperationContext::background())
            .await
            .unwrap();

        assert_eq!(handle.message().text(), "hello");
        assert_eq!(handle.message().id(), Some(&id));
        assert!(!handle.is_resolved().await);
        assert_eq!(fixture.broker.in_flight(QUEUE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_reported_portably() {
        let fixture = Fixture::new();
        let ctx = OperationContext::with_timeout(Duration::from_millis(100));

        let err = fixture.dequeuer.dequeue(&ctx).await.unwrap_err();

        assert!(err.is_deadline_exceeded());
        assert_eq!(fixture.broker.in_flight(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_in_band_error_is_a_protocol_error() {
        let broker = MemoryBroker::new();
        let dequeuer = MemoryDequeuer::new(
            broker.open_session().unwrap(),
            QueueName::new("undeclared").unwrap(),
        );

        let err = dequeuer
            .dequeue(&OperationContext::background())
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Protocol { .. }));
        assert!(err.to_string().contains("error occurred during dequeue"));
    }

    #[tokio::test]
    async fn test_decode_failure_rolls_back() {
        let fixture = Fixture::new();
        let id = fixture.publish("hello");
        fixture.broker.faults().corrupt_next_id();

        let err = fixture
            .dequeuer
            .dequeue(&OperationContext::background())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to decode msgid"));
        assert_eq!(fixture.broker.pending(QUEUE), 1);
        assert_eq!(fixture.broker.in_flight(QUEUE), 0);

        // Same message comes back intact
        let handle = fixture
            .dequeuer
            .dequeue(&OperationContext::background())
            .await
            .unwrap();
        assert_eq!(handle.message().id(), Some(&id));
    }

    #[tokio::test]
    async fn test_decode_and_rollback_failures_are_both_reported() {
        let fixture = Fixture::new();
        fixture.publish("hello");
        fixture.broker.faults().corrupt_next_id();
        fixture.broker.faults().fail_next_rollback();

        let err = fixture
            .dequeuer
            .dequeue(&OperationContext::background())
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::RollbackFailed { .. }));
        // The broker still undoes the extraction when the transaction drops
        assert_eq!(fixture.broker.pending(QUEUE), 1);
    }
}

// ============================================================================
// Resolution
// ============================================================================

mod resolution {
    use super::*;

    #[tokio::test]
    async fn test_ack_removes_message() {
        let fixture = Fixture::new();
        fixture.publish("hello");
        let ctx = OperationContext::background();

        let handle = fixture.dequeuer.dequeue(&ctx).await.unwrap();
        handle.ack(&ctx).await.unwrap();

        assert!(handle.is_resolved().await);
        assert_eq!(fixture.broker.pending(QUEUE), 0);
        assert_eq!(fixture.broker.in_flight(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_nack_restores_message() {
        let fixture = Fixture::new();
        fixture.publish("hello");
        let ctx = OperationContext::background();

        let handle = fixture.dequeuer.dequeue(&ctx).await.unwrap();
        handle.nack(&ctx).await.unwrap();

        assert_eq!(fixture.broker.pending(QUEUE), 1);
        assert_eq!(fixture.broker.in_flight(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_second_resolution_is_rejected() {
        let fixture = Fixture::new();
        fixture.publish("hello");
        let ctx = OperationContext::background();

        let handle = fixture.dequeuer.dequeue(&ctx).await.unwrap();
        handle.ack(&ctx).await.unwrap();

        assert!(matches!(
            handle.nack(&ctx).await,
            Err(QueueError::AlreadyResolved)
        ));
        assert!(matches!(
            handle.ack(&ctx).await,
            Err(QueueError::AlreadyResolved)
        ));
        assert_eq!(fixture.broker.pending(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_dropped_handle_restores_message() {
        let fixture = Fixture::new();
        fixture.publish("hello");

        let handle = fixture
            .dequeuer
            .dequeue(&OperationContext::background())
            .await
            .unwrap();
        drop(handle);

        assert_eq!(fixture.broker.pending(QUEUE), 1);
    }

    #[tokio::test]
    async fn test_resolution_with_finished_context_keeps_transaction() {
        let fixture = Fixture::new();
        fixture.publish("hello");

        let handle = fixture
            .dequeuer
            .dequeue(&OperationContext::background())
            .await
            .unwrap();
        let done = OperationContext::background();
        done.cancel();

        assert!(handle.ack(&done).await.unwrap_err().is_deadline_exceeded());
        assert!(!handle.is_resolved().await);

        handle.ack(&OperationContext::background()).await.unwrap();
        assert_eq!(fixture.broker.pending(QUEUE), 0);
    }
}
