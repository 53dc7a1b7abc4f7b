//! Producer capability for PostgreSQL.

use crate::error::{classify, classify_transaction};
use crate::message::PgMessage;
use crate::schema::ENQUEUE;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::{debug, warn};
use txqueue::{
    Enqueuer, MessageId, OperationContext, QueueError, QueueMessage, QueueName,
    TransactionOperation,
};

/// Inserts each message in its own database transaction
#[derive(Debug, Clone)]
pub struct PgEnqueuer {
    pool: PgPool,
    queue: QueueName,
}

impl PgEnqueuer {
    pub fn new(pool: PgPool, queue: QueueName) -> Self {
        Self { pool, queue }
    }
}

#[async_trait]
impl Enqueuer<PgMessage> for PgEnqueuer {
    fn new_message(&self) -> PgMessage {
        PgMessage::default()
    }

    async fn enqueue(&self, ctx: &OperationContext, message: &PgMessage) -> Result<(), QueueError> {
        let mut tx = ctx
            .run(self.pool.begin())
            .await?
            .map_err(|e| classify_transaction(TransactionOperation::Begin, e))?;

        let id = MessageId::generate();
        let inserted = ctx
            .run(
                sqlx::query(ENQUEUE)
                    .bind(&id.as_bytes()[..])
                    .bind(self.queue.as_str())
                    .bind(message.text())
                    .execute(&mut *tx),
            )
            .await
            .and_then(|result| result.map_err(classify));

        if let Err(cause) = inserted {
            warn!(queue = %self.queue, error = %cause, "Insert failed, rolling back");
            return match tx.rollback().await {
                Ok(()) => Err(cause),
                Err(rollback) => Err(QueueError::rollback_failed(
                    cause,
                    classify_transaction(TransactionOperation::Rollback, rollback),
                )),
            };
        }

        tx.commit()
            .await
            .map_err(|e| classify_transaction(TransactionOperation::Commit, e))?;

        debug!(queue = %self.queue, message_id = %id, "Message enqueued");
        Ok(())
    }

    async fn disconnect(&self, ctx: &OperationContext) -> Result<(), QueueError> {
        if let Err(err) = ctx.run(self.pool.close()).await {
            warn!(queue = %self.queue, "Enqueuer pool still has connections checked out");
            return Err(err);
        }
        debug!(queue = %self.queue, "Enqueuer pool closed");
        Ok(())
    }
}
