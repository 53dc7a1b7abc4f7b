//! Error types for queue operations.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Transaction {operation} failed: {message}")]
    TransactionFailed {
        operation: TransactionOperation,
        message: String,
    },

    /// A rollback issued to recover from `cause` failed as well.
    #[error("{cause}; rollback also failed: {rollback}")]
    RollbackFailed {
        cause: Box<QueueError>,
        #[source]
        rollback: Box<QueueError>,
    },

    /// Portable outcome for a cancelled or expired operation context.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Transaction already resolved")]
    AlreadyResolved,

    #[error("Disconnect failed: {}", describe_disconnect(.enqueuer, .dequeuer))]
    DisconnectFailed {
        enqueuer: Option<Box<QueueError>>,
        dequeuer: Option<Box<QueueError>>,
    },
}

impl QueueError {
    /// Shorthand for a [`QueueError::ConnectionFailed`].
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Shorthand for a [`QueueError::Protocol`].
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Shorthand for a [`QueueError::TransactionFailed`].
    pub fn transaction(operation: TransactionOperation, message: impl Into<String>) -> Self {
        Self::TransactionFailed {
            operation,
            message: message.into(),
        }
    }

    /// Combine a failure with the failure of the rollback that tried to undo it
    pub fn rollback_failed(cause: QueueError, rollback: QueueError) -> Self {
        Self::RollbackFailed {
            cause: Box::new(cause),
            rollback: Box::new(rollback),
        }
    }

    /// Check if the operation was cut short by its context
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Configuration(_) => false,
            Self::ConnectionFailed { .. } => true,
            Self::TransactionFailed { .. } => true,
            Self::RollbackFailed { cause, .. } => cause.is_transient(),
            Self::DeadlineExceeded => true,
            Self::Protocol { .. } => false,
            Self::AlreadyResolved => false,
            Self::DisconnectFailed { .. } => false,
        }
    }

    /// Check if error should be retried
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ConnectionFailed { .. } => Some(Duration::from_secs(5)),
            Self::TransactionFailed { .. } => Some(Duration::from_secs(1)),
            Self::RollbackFailed { cause, .. } => cause.retry_after(),
            Self::DeadlineExceeded => Some(Duration::ZERO),
            _ => None,
        }
    }
}

fn describe_disconnect(
    enqueuer: &Option<Box<QueueError>>,
    dequeuer: &Option<Box<QueueError>>,
) -> String {
    match (enqueuer, dequeuer) {
        (Some(e), Some(d)) => format!("enqueuer: {e}; dequeuer: {d}"),
        (Some(e), None) => format!("enqueuer: {e}"),
        (None, Some(d)) => format!("dequeuer: {d}"),
        (None, None) => "no failure recorded".to_string(),
    }
}

/// Transaction step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOperation {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => Self::Missing { key },
            other => Self::Parsing {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
