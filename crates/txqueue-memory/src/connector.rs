//! Connector for the in-memory broker.

use crate::broker::{MemoryBroker, MemorySession};
use crate::dequeuer::MemoryDequeuer;
use crate::enqueuer::MemoryEnqueuer;
use async_trait::async_trait;
use tracing::debug;
use txqueue::{Capabilities, Connector, QueueConfig, QueueError, TextMessage};

#[cfg(test)]
#[path = "connector_tests.rs"]
mod tests;

/// Opens producer and consumer sessions against a [`MemoryBroker`].
///
/// Location, credentials and extensions in the configuration are accepted
/// and ignored; only the queue name matters.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    broker: MemoryBroker,
}

impl MemoryConnector {
    pub fn new(broker: MemoryBroker) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    fn open_checked(&self, role: &'static str) -> Result<MemorySession, QueueError> {
        let session = self
            .broker
            .open_session()
            .map_err(|e| QueueError::connection(format!("{role} session: {e}")))?;
        session
            .ping()
            .map_err(|e| QueueError::connection(format!("{role} ping: {e}")))?;
        Ok(session)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Message = TextMessage;

    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, config: &QueueConfig) -> Result<Capabilities<TextMessage>, QueueError> {
        let queue = config.queue_name().clone();

        let producer = self.open_checked("enqueuer")?;
        let consumer = self.open_checked("dequeuer")?;

        debug!(queue = %queue, "Opened memory broker sessions");
        Ok((
            Box::new(MemoryEnqueuer::new(producer, queue.clone())),
            Box::new(MemoryDequeuer::new(consumer, queue)),
        ))
    }
}
