//! Classification of sqlx errors into [`QueueError`].

use txqueue::{QueueError, TransactionOperation};

/// SQLSTATE raised when a running statement is cancelled
pub const QUERY_CANCELED: &str = "57014";

/// SQLSTATE raised when the server terminates the session
pub const ADMIN_SHUTDOWN: &str = "57P01";

/// Map an sqlx error raised by a data operation
pub fn classify(err: sqlx::Error) -> QueueError {
    match &err {
        sqlx::Error::Database(db) => classify_database(db.code().as_deref(), db.message()),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => QueueError::connection(err.to_string()),
        _ => QueueError::protocol(err.to_string()),
    }
}

/// Map an sqlx error raised while beginning or finishing a transaction
pub fn classify_transaction(operation: TransactionOperation, err: sqlx::Error) -> QueueError {
    match classify(err) {
        QueueError::Protocol { message } => QueueError::transaction(operation, message),
        other => other,
    }
}

/// Map a server-reported error by its SQLSTATE
pub fn classify_database(code: Option<&str>, message: &str) -> QueueError {
    match code {
        Some(QUERY_CANCELED) => QueueError::DeadlineExceeded,
        Some(ADMIN_SHUTDOWN) => QueueError::connection(message),
        // Class 08: connection exception
        Some(code) if code.starts_with("08") => QueueError::connection(message),
        Some(code) => QueueError::protocol(format!("{message} (SQLSTATE {code})")),
        None => QueueError::protocol(message),
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
