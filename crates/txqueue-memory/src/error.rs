//! Native broker errors and their classification into [`QueueError`].

use thiserror::Error;
use txqueue::{QueueError, TransactionOperation};

/// Errors raised by the in-memory broker itself
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The caller's context finished while the broker was working on the call
    #[error("operation aborted by caller")]
    Aborted,

    #[error("broker unavailable")]
    Unavailable,

    #[error("session closed")]
    SessionClosed,

    #[error("queue '{queue}' does not exist")]
    QueueNotFound { queue: String },

    #[error("injected fault: {0}")]
    Injected(&'static str),
}

/// Map a broker error raised by a data operation
pub fn classify(err: MemoryError) -> QueueError {
    match err {
        MemoryError::Aborted => QueueError::DeadlineExceeded,
        MemoryError::Unavailable | MemoryError::SessionClosed => {
            QueueError::connection(err.to_string())
        }
        MemoryError::QueueNotFound { .. } | MemoryError::Injected(_) => {
            QueueError::protocol(err.to_string())
        }
    }
}

/// Map a broker error raised while beginning or finishing a transaction
pub fn classify_transaction(operation: TransactionOperation, err: MemoryError) -> QueueError {
    match err {
        MemoryError::Aborted => QueueError::DeadlineExceeded,
        MemoryError::Unavailable | MemoryError::SessionClosed => {
            QueueError::connection(err.to_string())
        }
        other => QueueError::transaction(operation, other.to_string()),
    }
}
