//! # txqueue-memory
//!
//! In-process transactional broker and its [`txqueue::Connector`].
//!
//! The broker keeps committed messages in FIFO order, runs every insert and
//! extraction in a transaction, blocks extractions until a message arrives
//! or the caller's context finishes, and can be told to fail specific
//! operations through its [`FaultPlan`]. It is meant for development and
//! tests.
//!
//! ```no_run
//! use txqueue::{connect, OperationContext, QueueConfig, QueueError, QueueMessage};
//! use txqueue_memory::{MemoryBroker, MemoryConnector};
//!
//! # async fn example() -> Result<(), QueueError> {
//! let broker = MemoryBroker::new();
//! broker.declare_queue("text_msg_queue");
//!
//! let config = QueueConfig::builder("text_msg_queue").build()?;
//! let queue = connect(&MemoryConnector::new(broker), &config).await?;
//!
//! let ctx = OperationContext::background();
//! queue.enqueue(&ctx, &txqueue::TextMessage::new("hello")).await?;
//! let handle = queue.dequeue(&ctx).await?;
//! assert_eq!(handle.message().text(), "hello");
//! handle.ack(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod connector;
pub mod dequeuer;
pub mod enqueuer;
pub mod error;
pub mod faults;

pub use broker::{ExtractedRow, MemoryBroker, MemorySession, MemoryTransaction};
pub use connector::MemoryConnector;
pub use dequeuer::{MemoryDequeueHandle, MemoryDequeuer};
pub use enqueuer::MemoryEnqueuer;
pub use error::{classify, classify_transaction, MemoryError};
pub use faults::FaultPlan;
