//! # txqueue
//!
//! Backend-agnostic message queue client with transactional consumption.
//!
//! Producers and consumers use one API to push messages onto, and pull
//! messages off, a named durable queue. A dequeue returns a handle bound to an
//! open backend transaction; the message is only removed once the handle is
//! acknowledged, and a negative acknowledgement makes it visible again.
//!
//! ## Module Organization
//!
//! - [`error`] - Error taxonomy for all queue operations
//! - [`message`] - Message envelope, identities and queue names
//! - [`config`] - Validated queue configuration, builder and loader
//! - [`context`] - Cancellation and deadline context
//! - [`client`] - Enqueuer, Dequeuer and DequeueHandle capabilities
//! - [`connector`] - Backend factory contract
//! - [`queue`] - Queue facade
//!
//! ## Usage
//!
//! ```no_run
//! use txqueue::{connect, Connector, OperationContext, QueueConfig, QueueError, QueueMessage};
//! use std::time::Duration;
//!
//! # async fn example<C: Connector>(connector: C) -> Result<(), QueueError> {
//! let config = QueueConfig::builder("text_msg_queue")
//!     .located_at("localhost", 5432)
//!     .authenticated_with("app", "secret")
//!     .build()?;
//!
//! let queue = connect(&connector, &config).await?;
//!
//! let mut message = queue.new_message();
//! message.set_text("hello".to_string());
//! queue.enqueue(&OperationContext::background(), &message).await?;
//!
//! let ctx = OperationContext::with_timeout(Duration::from_secs(30));
//! let handle = queue.dequeue(&ctx).await?;
//! println!("received {}", handle.message().text());
//! handle.ack(&ctx).await?;
//!
//! queue.disconnect(&OperationContext::background()).await?;
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod client;
pub mod config;
pub mod connector;
pub mod context;
pub mod error;
pub mod message;
pub mod queue;

// Re-export commonly used types at crate root for convenience
pub use client::{DequeueHandle, Dequeuer, Enqueuer, TransactionSlot};
pub use config::{Credentials, Location, QueueConfig, QueueConfigBuilder, QueueSettings};
pub use connector::{Capabilities, Connector};
pub use context::OperationContext;
pub use error::{ConfigurationError, QueueError, TransactionOperation};
pub use message::{MessageId, MessageIdError, QueueMessage, QueueName, TextMessage};
pub use queue::{connect, Queue};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
