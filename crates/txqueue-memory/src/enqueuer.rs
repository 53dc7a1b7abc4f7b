//! Producer capability for the in-memory broker.

use crate::broker::MemorySession;
use crate::error::{classify, classify_transaction};
use async_trait::async_trait;
use tracing::{debug, warn};
use txqueue::{
    Enqueuer, OperationContext, QueueError, QueueMessage, QueueName, TextMessage,
    TransactionOperation,
};

#[cfg(test)]
#[path = "enqueuer_tests.rs"]
mod tests;

/// Inserts each message in its own broker transaction
#[derive(Debug)]
pub struct MemoryEnqueuer {
    session: MemorySession,
    queue: QueueName,
}

impl MemoryEnqueuer {
    pub fn new(session: MemorySession, queue: QueueName) -> Self {
        Self { session, queue }
    }
}

#[async_trait]
impl Enqueuer<TextMessage> for MemoryEnqueuer {
    fn new_message(&self) -> TextMessage {
        TextMessage::default()
    }

    async fn enqueue(&self, ctx: &OperationContext, message: &TextMessage) -> Result<(), QueueError> {
        let mut tx = self
            .session
            .begin(ctx)
            .map_err(|e| classify_transaction(TransactionOperation::Begin, e))?;

        let id = match tx.insert(ctx, self.queue.as_str(), message.text()) {
            Ok(id) => id,
            Err(err) => {
                let cause = classify(err);
                warn!(queue = %self.queue, error = %cause, "Insert failed, rolling back");
                return match tx.rollback() {
                    Ok(()) => Err(cause),
                    Err(rollback) => Err(QueueError::rollback_failed(
                        cause,
                        classify_transaction(TransactionOperation::Rollback, rollback),
                    )),
                };
            }
        };

        tx.commit()
            .map_err(|e| classify_transaction(TransactionOperation::Commit, e))?;

        debug!(queue = %self.queue, message_id = %id, "Message enqueued");
        Ok(())
    }

    async fn disconnect(&self, _ctx: &OperationContext) -> Result<(), QueueError> {
        self.session
            .close()
            .map_err(|e| QueueError::connection(format!("enqueuer disconnect: {e}")))
    }
}
