//! Cancellation and deadline context carried by every queue operation.
//!
//! An [`OperationContext`] is the portable way for callers to bound a blocking
//! call. Backends observe it while a request is in flight and abort the
//! request on the backend side when the context finishes; the resulting
//! backend-native error is reported as [`QueueError::DeadlineExceeded`].

use crate::error::QueueError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline
#[derive(Debug, Clone)]
pub struct OperationContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OperationContext {
    /// Context that never expires unless cancelled explicitly
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context cancelled with this one and expiring no later than
    /// `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token observed by backends
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Check whether the context has been cancelled or has expired
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail with [`QueueError::DeadlineExceeded`] when the context is done
    pub fn check(&self) -> Result<(), QueueError> {
        if self.is_done() {
            Err(QueueError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Resolve once the context is cancelled or its deadline passes
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Race `fut` against the context.
    ///
    /// `fut` is dropped when the context finishes first, so it must be safe
    /// to abandon. Requests that block on the backend indefinitely have to be
    /// aborted on the backend instead.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, QueueError>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            output = fut => Ok(output),
            _ = self.done() => Err(QueueError::DeadlineExceeded),
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
