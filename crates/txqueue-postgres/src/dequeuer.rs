//! Consumer capability for PostgreSQL.
//!
//! Each dequeue runs `txqueue_dequeue` inside its own transaction. The call
//! blocks on the server until a message is available. When the caller's
//! context finishes first, the running statement is cancelled on the server
//! from a separate session and the resulting `query_canceled` error is
//! reported as [`QueueError::DeadlineExceeded`]. A dequeue future dropped
//! while it waits cancels its statement the same way from a spawned task.

use crate::error::{classify, classify_transaction};
use crate::message::PgMessage;
use crate::schema::{BACKEND_PID, CANCEL_BACKEND, DEQUEUE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgRow};
use sqlx::{Connection, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, warn};
use txqueue::{
    DequeueHandle, Dequeuer, MessageId, OperationContext, QueueError, QueueMessage, QueueName,
    TransactionOperation, TransactionSlot,
};

#[cfg(test)]
#[path = "dequeuer_tests.rs"]
mod tests;

type PgTransaction = Transaction<'static, Postgres>;

/// How long a cancelled extract may take to report back
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Extracts messages, each in a transaction owned by the returned handle
#[derive(Debug, Clone)]
pub struct PgDequeuer {
    pool: PgPool,
    queue: QueueName,
    poll_interval: Duration,
    cancel_options: PgConnectOptions,
}

impl PgDequeuer {
    /// `cancel_options` is used to open the session that cancels a blocked
    /// dequeue
    pub fn new(
        pool: PgPool,
        queue: QueueName,
        poll_interval: Duration,
        cancel_options: PgConnectOptions,
    ) -> Self {
        Self {
            pool,
            queue,
            poll_interval,
            cancel_options,
        }
    }

    /// Run the blocking extract, cancelling it on the server if `ctx`
    /// finishes first or the returned future is dropped unfinished
    async fn extract(
        &self,
        ctx: &OperationContext,
        tx: &mut PgTransaction,
        pid: i32,
    ) -> Result<PgRow, QueueError> {
        let mut guard = CancelOnDrop::new(pid, &self.cancel_options, &self.queue);
        let extract = sqlx::query(DEQUEUE)
            .bind(self.queue.as_str())
            .bind(self.poll_interval.as_secs_f64())
            .fetch_one(&mut **tx);
        tokio::pin!(extract);

        let outcome = tokio::select! {
            biased;
            row = &mut extract => row,
            _ = ctx.done() => {
                debug!(queue = %self.queue, pid, "Cancelling dequeue on the server");
                match cancel_backend(&self.cancel_options, pid).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(queue = %self.queue, pid, "Server did not accept the cancel request");
                        return Err(QueueError::DeadlineExceeded);
                    }
                    Err(err) => {
                        warn!(queue = %self.queue, pid, error = %err, "Could not cancel dequeue");
                        return Err(QueueError::DeadlineExceeded);
                    }
                }
                // Either the cancellation or a message that won the race
                match tokio::time::timeout(CANCEL_GRACE, &mut extract).await {
                    Ok(row) => row,
                    Err(_) => {
                        warn!(queue = %self.queue, pid, "Dequeue still running after cancel");
                        return Err(QueueError::DeadlineExceeded);
                    }
                }
            }
        };

        guard.disarm();
        outcome.map_err(classify)
    }

    /// Roll back a transaction that cannot be handed to the caller
    async fn abandon(&self, tx: PgTransaction, cause: QueueError) -> QueueError {
        warn!(queue = %self.queue, error = %cause, "Dequeue failed, rolling back");
        match tx.rollback().await {
            Ok(()) => cause,
            Err(rollback) => QueueError::rollback_failed(
                cause,
                classify_transaction(TransactionOperation::Rollback, rollback),
            ),
        }
    }
}

#[async_trait]
impl Dequeuer<PgMessage> for PgDequeuer {
    async fn dequeue(
        &self,
        ctx: &OperationContext,
    ) -> Result<Box<dyn DequeueHandle<PgMessage>>, QueueError> {
        let mut tx = ctx
            .run(self.pool.begin())
            .await?
            .map_err(|e| classify_transaction(TransactionOperation::Begin, e))?;

        let pid: i32 = ctx
            .run(sqlx::query_scalar::<_, i32>(BACKEND_PID).fetch_one(&mut *tx))
            .await?
            .map_err(classify)?;

        debug!(queue = %self.queue, pid, "Waiting for message");
        let row = match self.extract(ctx, &mut tx, pid).await {
            Ok(row) => row,
            Err(err) => {
                debug!(queue = %self.queue, error = %err, "Extraction ended without a message");
                return Err(err);
            }
        };

        let message = match read_row(&row).and_then(ExtractedRow::into_message) {
            Ok(message) => message,
            Err(cause) => return Err(self.abandon(tx, cause).await),
        };

        debug!(queue = %self.queue, message_id = ?message.id().map(MessageId::to_hex), "Message dequeued");
        Ok(Box::new(PgDequeueHandle {
            message,
            slot: TransactionSlot::new(tx),
        }))
    }

    /// Waits for open handles to release their connections until `ctx`
    /// finishes. The pool rejects new work either way.
    async fn disconnect(&self, ctx: &OperationContext) -> Result<(), QueueError> {
        if let Err(err) = ctx.run(self.pool.close()).await {
            warn!(queue = %self.queue, "Dequeuer pool still has connections checked out");
            return Err(err);
        }
        debug!(queue = %self.queue, "Dequeuer pool closed");
        Ok(())
    }
}

// ============================================================================
// Server-side cancellation
// ============================================================================

/// Ask the server to cancel the statement running on backend `pid`.
///
/// Uses a fresh session so it works while every pooled connection is
/// blocked. Returns whether the server accepted the request.
async fn cancel_backend(options: &PgConnectOptions, pid: i32) -> Result<bool, sqlx::Error> {
    let mut conn = PgConnection::connect_with(options).await?;
    let signalled = sqlx::query_scalar::<_, bool>(CANCEL_BACKEND)
        .bind(pid)
        .fetch_one(&mut conn)
        .await?;
    conn.close().await?;
    Ok(signalled)
}

/// Cancels the extract on the server unless disarmed before it is dropped
struct CancelOnDrop {
    pid: i32,
    options: PgConnectOptions,
    queue: QueueName,
    armed: bool,
}

impl CancelOnDrop {
    fn new(pid: i32, options: &PgConnectOptions, queue: &QueueName) -> Self {
        Self {
            pid,
            options: options.clone(),
            queue: queue.clone(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(queue = %self.queue, pid = self.pid, "No runtime to cancel abandoned dequeue");
            return;
        };

        let pid = self.pid;
        let options = self.options.clone();
        let queue = self.queue.clone();
        handle.spawn(async move {
            match cancel_backend(&options, pid).await {
                Ok(true) => debug!(queue = %queue, pid, "Abandoned dequeue cancelled"),
                Ok(false) => debug!(queue = %queue, pid, "Abandoned dequeue already finished"),
                Err(err) => {
                    warn!(queue = %queue, pid, error = %err, "Could not cancel abandoned dequeue")
                }
            }
        });
    }
}

// ============================================================================
// Row decoding
// ============================================================================

/// Output columns of `txqueue_dequeue`
#[derive(Debug, Default)]
struct ExtractedRow {
    msgid: Option<String>,
    content: Option<String>,
    enqueued_at: Option<DateTime<Utc>>,
    errm: Option<String>,
}

fn read_row(row: &PgRow) -> Result<ExtractedRow, QueueError> {
    Ok(ExtractedRow {
        msgid: row.try_get("msgid").map_err(classify)?,
        content: row.try_get("content").map_err(classify)?,
        enqueued_at: row.try_get("enqueued_at").map_err(classify)?,
        errm: row.try_get("errm").map_err(classify)?,
    })
}

impl ExtractedRow {
    fn into_message(self) -> Result<PgMessage, QueueError> {
        if let Some(errm) = self.errm {
            return Err(QueueError::protocol(format!(
                "error occurred during dequeue: {errm}"
            )));
        }

        let msgid = self
            .msgid
            .ok_or_else(|| QueueError::protocol("dequeue returned no msgid"))?;
        let id = msgid
            .parse::<MessageId>()
            .map_err(|e| QueueError::protocol(format!("failed to decode msgid: {e}")))?;

        Ok(PgMessage::received(
            id,
            self.content.unwrap_or_default(),
            self.enqueued_at,
        ))
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Received message bound to its open database transaction.
///
/// Dropping the handle without resolving it rolls the transaction back.
#[derive(Debug)]
pub struct PgDequeueHandle {
    message: PgMessage,
    slot: TransactionSlot<PgTransaction>,
}

#[async_trait]
impl DequeueHandle<PgMessage> for PgDequeueHandle {
    fn message(&self) -> &PgMessage {
        &self.message
    }

    async fn ack(&self, ctx: &OperationContext) -> Result<(), QueueError> {
        self.slot
            .resolve(ctx, |tx| async move {
                tx.commit()
                    .await
                    .map_err(|e| classify_transaction(TransactionOperation::Commit, e))
            })
            .await?;
        debug!(message_id = ?self.message.id().map(MessageId::to_hex), "Message acknowledged");
        Ok(())
    }

    async fn nack(&self, ctx: &OperationContext) -> Result<(), QueueError> {
        self.slot
            .resolve(ctx, |tx| async move {
                tx.rollback()
                    .await
                    .map_err(|e| classify_transaction(TransactionOperation::Rollback, e))
            })
            .await?;
        debug!(message_id = ?self.message.id().map(MessageId::to_hex), "Message returned to queue");
        Ok(())
    }

    async fn is_resolved(&self) -> bool {
        self.slot.is_resolved().await
    }
}
