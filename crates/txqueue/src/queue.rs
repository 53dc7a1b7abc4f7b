//! Queue facade composing one producer and one consumer capability.

use crate::client::{DequeueHandle, Dequeuer, Enqueuer};
use crate::config::QueueConfig;
use crate::connector::Connector;
use crate::context::OperationContext;
use crate::error::QueueError;
use crate::message::QueueMessage;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// Uniform queue API over any backend
pub struct Queue<M: QueueMessage> {
    enqueuer: Box<dyn Enqueuer<M>>,
    dequeuer: Box<dyn Dequeuer<M>>,
}

impl<M: QueueMessage> Queue<M> {
    /// Compose a queue from a matched producer/consumer pair
    pub fn new(enqueuer: Box<dyn Enqueuer<M>>, dequeuer: Box<dyn Dequeuer<M>>) -> Self {
        Self { enqueuer, dequeuer }
    }

    /// Create an empty message for this queue's backend
    pub fn new_message(&self) -> M {
        self.enqueuer.new_message()
    }

    pub async fn enqueue(&self, ctx: &OperationContext, message: &M) -> Result<(), QueueError> {
        self.enqueuer.enqueue(ctx, message).await
    }

    pub async fn dequeue(
        &self,
        ctx: &OperationContext,
    ) -> Result<Box<dyn DequeueHandle<M>>, QueueError> {
        self.dequeuer.dequeue(ctx).await
    }

    /// Disconnect both sides concurrently.
    ///
    /// Both disconnects always run to completion. Any failure is reported in
    /// a single [`QueueError::DisconnectFailed`] carrying each side's error.
    pub async fn disconnect(&self, ctx: &OperationContext) -> Result<(), QueueError> {
        let (enqueuer, dequeuer) = tokio::join!(
            self.enqueuer.disconnect(ctx),
            self.dequeuer.disconnect(ctx)
        );

        match (enqueuer, dequeuer) {
            (Ok(()), Ok(())) => {
                debug!("Queue disconnected");
                Ok(())
            }
            (enqueuer, dequeuer) => {
                let enqueuer = enqueuer.err().map(Box::new);
                let dequeuer = dequeuer.err().map(Box::new);
                warn!(
                    enqueuer_failed = enqueuer.is_some(),
                    dequeuer_failed = dequeuer.is_some(),
                    "Queue disconnect failed"
                );
                Err(QueueError::DisconnectFailed { enqueuer, dequeuer })
            }
        }
    }
}

impl<M: QueueMessage> std::fmt::Debug for Queue<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").finish_non_exhaustive()
    }
}

/// Connect to a backend and compose the resulting capabilities into a queue
pub async fn connect<C>(connector: &C, config: &QueueConfig) -> Result<Queue<C::Message>, QueueError>
where
    C: Connector + ?Sized,
{
    debug!(
        backend = connector.backend(),
        queue = %config.queue_name(),
        "Connecting queue"
    );
    let (enqueuer, dequeuer) = connector.connect(config).await?;
    Ok(Queue::new(enqueuer, dequeuer))
}
