//! Backend factory contract.

use crate::client::{Dequeuer, Enqueuer};
use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::message::QueueMessage;
use async_trait::async_trait;

/// Matched producer/consumer pair returned by a [`Connector`]
pub type Capabilities<M> = (Box<dyn Enqueuer<M>>, Box<dyn Dequeuer<M>>);

/// Turns a validated [`QueueConfig`] into a working producer/consumer pair.
///
/// Implemented once per backend and chosen by the caller at composition
/// time. Implementations open one backend session per capability and check
/// each session is alive before returning.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Message type produced and consumed by this backend
    type Message: QueueMessage;

    /// Short backend name used in logs
    fn backend(&self) -> &'static str;

    async fn connect(&self, config: &QueueConfig) -> Result<Capabilities<Self::Message>, QueueError>;
}
