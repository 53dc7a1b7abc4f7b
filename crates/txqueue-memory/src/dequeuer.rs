//! Consumer capability for the in-memory broker.

use crate::broker::{MemorySession, MemoryTransaction};
use crate::error::{classify, classify_transaction};
use async_trait::async_trait;
use tracing::{debug, warn};
use txqueue::{
    DequeueHandle, Dequeuer, MessageId, OperationContext, QueueError, QueueName, TextMessage,
    TransactionOperation, TransactionSlot,
};

#[cfg(test)]
#[path = "dequeuer_tests.rs"]
mod tests;

/// Extracts messages, each in a transaction owned by the returned handle
#[derive(Debug)]
pub struct MemoryDequeuer {
    session: MemorySession,
    queue: QueueName,
}

impl MemoryDequeuer {
    pub fn new(session: MemorySession, queue: QueueName) -> Self {
        Self { session, queue }
    }

    /// Roll back a transaction that cannot be handed to the caller
    fn abandon(&self, tx: MemoryTransaction, cause: QueueError) -> QueueError {
        warn!(queue = %self.queue, error = %cause, "Dequeue failed, rolling back");
        match tx.rollback() {
            Ok(()) => cause,
            Err(rollback) => QueueError::rollback_failed(
                cause,
                classify_transaction(TransactionOperation::Rollback, rollback),
            ),
        }
    }
}

#[async_trait]
impl Dequeuer<TextMessage> for MemoryDequeuer {
    async fn dequeue(
        &self,
        ctx: &OperationContext,
    ) -> Result<Box<dyn DequeueHandle<TextMessage>>, QueueError> {
        let mut tx = self
            .session
            .begin(ctx)
            .map_err(|e| classify_transaction(TransactionOperation::Begin, e))?;

        debug!(queue = %self.queue, "Waiting for message");
        let row = match tx.extract(ctx, self.queue.as_str()).await {
            Ok(row) => row,
            Err(err) => {
                let err = classify(err);
                debug!(queue = %self.queue, error = %err, "Extraction aborted");
                return Err(err);
            }
        };

        if let Some(errm) = row.errm {
            let cause = QueueError::protocol(format!("error occurred during dequeue: {errm}"));
            return Err(self.abandon(tx, cause));
        }

        let id = match row.msgid.parse::<MessageId>() {
            Ok(id) => id,
            Err(err) => {
                let cause = QueueError::protocol(format!("failed to decode msgid: {err}"));
                return Err(self.abandon(tx, cause));
            }
        };

        debug!(queue = %self.queue, message_id = %id, "Message dequeued");
        Ok(Box::new(MemoryDequeueHandle {
            message: TextMessage::received(id, row.content),
            slot: TransactionSlot::new(tx),
        }))
    }

    async fn disconnect(&self, _ctx: &OperationContext) -> Result<(), QueueError> {
        self.session
            .close()
            .map_err(|e| QueueError::connection(format!("dequeuer disconnect: {e}")))
    }
}

/// Received message bound to its open broker transaction
#[derive(Debug)]
pub struct MemoryDequeueHandle {
    message: TextMessage,
    slot: TransactionSlot<MemoryTransaction>,
}

#[async_trait]
impl DequeueHandle<TextMessage> for MemoryDequeueHandle {
    fn message(&self) -> &TextMessage {
        &self.message
    }

    async fn ack(&self, ctx: &OperationContext) -> Result<(), QueueError> {
        self.slot
            .resolve(ctx, |tx| async move {
                tx.commit()
                    .map_err(|e| classify_transaction(TransactionOperation::Commit, e))
            })
            .await?;
        debug!(message_id = ?self.message.id.as_ref().map(MessageId::to_hex), "Message acknowledged");
        Ok(())
    }

    async fn nack(&self, ctx: &OperationContext) -> Result<(), QueueError> {
        self.slot
            .resolve(ctx, |tx| async move {
                tx.rollback()
                    .map_err(|e| classify_transaction(TransactionOperation::Rollback, e))
            })
            .await?;
        debug!(message_id = ?self.message.id.as_ref().map(MessageId::to_hex), "Message returned to queue");
        Ok(())
    }

    async fn is_resolved(&self) -> bool {
        self.slot.is_resolved().await
    }
}
