//! Capability traits implemented by every backend.
//!
//! A backend provides one [`Enqueuer`] and one [`Dequeuer`] per queue. A
//! successful dequeue returns a [`DequeueHandle`] that owns the backend
//! transaction the message was extracted in; the extraction only becomes
//! permanent when the handle is acknowledged.

use crate::context::OperationContext;
use crate::error::QueueError;
use crate::message::QueueMessage;
use async_trait::async_trait;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::warn;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Producer side of a queue
#[async_trait]
pub trait Enqueuer<M: QueueMessage>: Send + Sync {
    /// Create an empty message; does not touch the backend
    fn new_message(&self) -> M;

    /// Durably insert `message` in its own transaction.
    ///
    /// Either the message is committed or the backend is left as if the call
    /// never happened.
    async fn enqueue(&self, ctx: &OperationContext, message: &M) -> Result<(), QueueError>;

    /// Release the underlying backend session
    async fn disconnect(&self, ctx: &OperationContext) -> Result<(), QueueError>;
}

/// Consumer side of a queue
#[async_trait]
pub trait Dequeuer<M: QueueMessage>: Send + Sync {
    /// Block until a message is available or `ctx` finishes.
    ///
    /// The returned handle keeps the extraction transaction open. A finished
    /// context is reported as [`QueueError::DeadlineExceeded`].
    async fn dequeue(
        &self,
        ctx: &OperationContext,
    ) -> Result<Box<dyn DequeueHandle<M>>, QueueError>;

    /// Release the underlying backend session
    async fn disconnect(&self, ctx: &OperationContext) -> Result<(), QueueError>;
}

/// A received message bound to its still-open transaction
#[async_trait]
pub trait DequeueHandle<M: QueueMessage>: Send + Sync + std::fmt::Debug {
    /// The received message
    fn message(&self) -> &M;

    /// Commit the extraction; the message is removed permanently
    async fn ack(&self, ctx: &OperationContext) -> Result<(), QueueError>;

    /// Roll back the extraction; the message becomes available again
    async fn nack(&self, ctx: &OperationContext) -> Result<(), QueueError>;

    /// Whether `ack` or `nack` has already consumed the transaction
    async fn is_resolved(&self) -> bool;
}

/// Single-use holder for a backend transaction.
///
/// The first resolution takes the transaction out under a lock, so a second
/// `ack`/`nack` on the same handle, sequential or concurrent, fails with
/// [`QueueError::AlreadyResolved`] instead of reaching the backend.
pub struct TransactionSlot<T> {
    inner: Mutex<Option<T>>,
}

impl<T: Send> TransactionSlot<T> {
    pub fn new(transaction: T) -> Self {
        Self {
            inner: Mutex::new(Some(transaction)),
        }
    }

    /// Consume the transaction with `resolve`.
    ///
    /// When `ctx` is already finished the transaction is left in place and
    /// [`QueueError::DeadlineExceeded`] is returned.
    pub async fn resolve<F, Fut>(&self, ctx: &OperationContext, resolve: F) -> Result<(), QueueError>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<(), QueueError>>,
    {
        let mut guard = self.inner.lock().await;
        if guard.is_none() {
            return Err(QueueError::AlreadyResolved);
        }
        ctx.check()?;

        match guard.take() {
            Some(transaction) => resolve(transaction).await,
            None => Err(QueueError::AlreadyResolved),
        }
    }

    pub async fn is_resolved(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

impl<T> Drop for TransactionSlot<T> {
    fn drop(&mut self) {
        if self.inner.get_mut().is_some() {
            warn!("Dequeue handle dropped without ack or nack; backend rolls the transaction back");
        }
    }
}

impl<T> std::fmt::Debug for TransactionSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.inner.try_lock() {
            Ok(guard) if guard.is_some() => "open",
            Ok(_) => "resolved",
            Err(_) => "resolving",
        };
        f.debug_struct("TransactionSlot").field("state", &state).finish()
    }
}
