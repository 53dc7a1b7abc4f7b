//! # txqueue-postgres
//!
//! PostgreSQL backend for txqueue built on `sqlx`.
//!
//! Messages are rows in `txqueue_messages`. Enqueue inserts a row in its own
//! transaction; dequeue deletes the oldest row of the queue with
//! `FOR UPDATE SKIP LOCKED` inside a transaction that stays open until the
//! handle is acknowledged (commit) or negatively acknowledged (rollback).
//!
//! ## Module Organization
//!
//! - [`schema`] - Tables, the blocking dequeue function and queue declaration
//! - [`options`] - Connection settings derived from a `QueueConfig`
//! - [`connector`] - Pool setup and liveness checks
//! - [`enqueuer`] / [`dequeuer`] - Producer and consumer capabilities
//! - [`error`] - Classification of sqlx errors
//!
//! ## Usage
//!
//! ```no_run
//! use txqueue::{connect, OperationContext, QueueConfig, QueueError};
//! use txqueue_postgres::PgConnector;
//!
//! # async fn example() -> Result<(), QueueError> {
//! let config = QueueConfig::builder("text_msg_queue")
//!     .located_at("localhost", 5432)
//!     .authenticated_with("app", "secret")
//!     .using_service("orders")
//!     .with_extension("poll_interval_ms", "100")
//!     .build()?;
//!
//! let queue = connect(&PgConnector::new(), &config).await?;
//! let ctx = OperationContext::background();
//! queue.enqueue(&ctx, &txqueue_postgres::PgMessage::new("hello")).await?;
//! # Ok(())
//! # }
//! ```

pub mod connector;
pub mod dequeuer;
pub mod enqueuer;
pub mod error;
pub mod message;
pub mod options;
pub mod schema;

pub use connector::PgConnector;
pub use dequeuer::{PgDequeueHandle, PgDequeuer};
pub use enqueuer::PgEnqueuer;
pub use error::{classify, classify_database, classify_transaction};
pub use message::{PgMessage, PgRawMessage};
pub use options::{connect_options, PgSettings};
pub use schema::{declare_queue, install_schema};
