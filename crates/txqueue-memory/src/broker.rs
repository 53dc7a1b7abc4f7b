//! In-process transactional message broker.
//!
//! This module provides a fully functional in-memory broker that:
//! - Keeps declared queues in FIFO order by commit sequence
//! - Runs every insert and extraction inside a transaction
//! - Makes extractions permanent only on commit and restores them, identity
//!   and position unchanged, on rollback or drop
//! - Blocks extractions until a message is committed or the caller's
//!   context finishes
//!
//! The broker plays the role of a remote backend: connectors open
//! [`MemorySession`]s against it and only see its native [`MemoryError`]s.

use crate::error::MemoryError;
use crate::faults::FaultPlan;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use txqueue::{MessageId, OperationContext};

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A committed message waiting to be extracted
#[derive(Debug, Clone)]
struct StoredMessage {
    id: MessageId,
    content: String,
}

/// Internal state for a single queue
#[derive(Debug, Default)]
struct QueueState {
    /// Committed messages keyed by commit sequence
    pending: BTreeMap<u64, StoredMessage>,
    /// Extracted by a transaction that has not finished yet
    in_flight: usize,
    /// Woken whenever `pending` gains a message
    notify: Arc<Notify>,
}

#[derive(Debug)]
struct BrokerState {
    queues: Mutex<HashMap<String, QueueState>>,
    available: AtomicBool,
    open_sessions: AtomicUsize,
    next_sequence: AtomicU64,
    faults: FaultPlan,
}

impl BrokerState {
    fn queues(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), MemoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MemoryError::Unavailable)
        }
    }
}

// ============================================================================
// MemoryBroker
// ============================================================================

/// Shared in-memory broker; clones refer to the same broker
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState {
                queues: Mutex::new(HashMap::new()),
                available: AtomicBool::new(true),
                open_sessions: AtomicUsize::new(0),
                next_sequence: AtomicU64::new(0),
                faults: FaultPlan::default(),
            }),
        }
    }

    /// Create `name` if it does not exist yet
    pub fn declare_queue(&self, name: &str) {
        self.state.queues().entry(name.to_string()).or_default();
    }

    /// Committed messages waiting in `name`
    pub fn pending(&self, name: &str) -> usize {
        self.state
            .queues()
            .get(name)
            .map_or(0, |queue| queue.pending.len())
    }

    /// Messages of `name` held by unfinished transactions
    pub fn in_flight(&self, name: &str) -> usize {
        self.state
            .queues()
            .get(name)
            .map_or(0, |queue| queue.in_flight)
    }

    /// Simulate the broker going down or coming back
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::SeqCst);
    }

    pub fn open_sessions(&self) -> usize {
        self.state.open_sessions.load(Ordering::SeqCst)
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.state.faults
    }

    /// Open a new session against the broker
    pub fn open_session(&self) -> Result<MemorySession, MemoryError> {
        self.state.ensure_available()?;
        self.state.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            state: Arc::clone(&self.state),
            link: Arc::new(SessionLink {
                open: AtomicBool::new(true),
                closed: Notify::new(),
            }),
        })
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MemorySession
// ============================================================================

/// Open/closed state shared by a session and its transactions
#[derive(Debug)]
struct SessionLink {
    open: AtomicBool,
    /// Woken when the session closes
    closed: Notify,
}

impl SessionLink {
    fn ensure_open(&self) -> Result<(), MemoryError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MemoryError::SessionClosed)
        }
    }

    /// Returns whether this call did the closing
    fn shut(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        if was_open {
            self.closed.notify_waiters();
        }
        was_open
    }
}

/// One client session; safe for concurrent use by many transactions
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<BrokerState>,
    link: Arc<SessionLink>,
}

impl MemorySession {
    /// Liveness check
    pub fn ping(&self) -> Result<(), MemoryError> {
        self.link.ensure_open()?;
        self.state.ensure_available()
    }

    /// Begin a transaction on this session
    pub fn begin(&self, ctx: &OperationContext) -> Result<MemoryTransaction, MemoryError> {
        if ctx.is_done() {
            return Err(MemoryError::Aborted);
        }
        self.ping()?;
        Ok(MemoryTransaction {
            state: Arc::clone(&self.state),
            session: Arc::clone(&self.link),
            staged: Vec::new(),
            extracted: Vec::new(),
            finished: false,
        })
    }

    /// Close the session; closing twice is a no-op.
    ///
    /// Extractions still waiting on this session end with
    /// [`MemoryError::SessionClosed`].
    pub fn close(&self) -> Result<(), MemoryError> {
        if self.state.faults.take_disconnect() {
            return Err(MemoryError::Injected("disconnect"));
        }
        if self.link.shut() {
            self.state.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if self.link.shut() {
            self.state.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ============================================================================
// MemoryTransaction
// ============================================================================

/// Result of an extraction, shaped like the output parameters of a stored
/// procedure: hex identity, content and an in-band error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRow {
    pub msgid: String,
    pub content: String,
    pub errm: Option<String>,
}

impl ExtractedRow {
    fn failed(errm: String) -> Self {
        Self {
            msgid: String::new(),
            content: String::new(),
            errm: Some(errm),
        }
    }
}

/// Unit of work against the broker.
///
/// Dropping an unfinished transaction rolls it back.
#[derive(Debug)]
pub struct MemoryTransaction {
    state: Arc<BrokerState>,
    session: Arc<SessionLink>,
    staged: Vec<(String, StoredMessage)>,
    extracted: Vec<(String, u64, StoredMessage)>,
    finished: bool,
}

impl MemoryTransaction {
    /// Stage a new message for `queue`; it becomes visible on commit
    pub fn insert(
        &mut self,
        ctx: &OperationContext,
        queue: &str,
        content: &str,
    ) -> Result<MessageId, MemoryError> {
        if ctx.is_done() {
            return Err(MemoryError::Aborted);
        }
        self.session.ensure_open()?;
        self.state.ensure_available()?;
        if self.state.faults.take_insert() {
            return Err(MemoryError::Injected("insert"));
        }
        if !self.state.queues().contains_key(queue) {
            return Err(MemoryError::QueueNotFound {
                queue: queue.to_string(),
            });
        }

        let id = MessageId::generate();
        self.staged.push((
            queue.to_string(),
            StoredMessage {
                id,
                content: content.to_string(),
            },
        ));
        Ok(id)
    }

    /// Extract the oldest committed message of `queue`, waiting for one if
    /// the queue is empty.
    ///
    /// Removal only becomes permanent on commit. Broker-side failures such as
    /// an unknown queue are reported in-band through [`ExtractedRow::errm`];
    /// a finished context aborts the wait with [`MemoryError::Aborted`] and a
    /// closed session with [`MemoryError::SessionClosed`].
    pub async fn extract(
        &mut self,
        ctx: &OperationContext,
        queue: &str,
    ) -> Result<ExtractedRow, MemoryError> {
        let session = Arc::clone(&self.session);
        loop {
            let closed = session.closed.notified();
            tokio::pin!(closed);
            closed.as_mut().enable();

            if ctx.is_done() {
                return Err(MemoryError::Aborted);
            }
            session.ensure_open()?;
            self.state.ensure_available()?;

            let notify = match self.state.queues().get(queue) {
                Some(state) => Arc::clone(&state.notify),
                None => {
                    let errm = MemoryError::QueueNotFound {
                        queue: queue.to_string(),
                    };
                    return Ok(ExtractedRow::failed(errm.to_string()));
                }
            };

            // Register before looking so a commit in between still wakes us
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(row) = self.try_extract(queue) {
                return Ok(row);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = &mut closed => return Err(MemoryError::SessionClosed),
                _ = ctx.done() => return Err(MemoryError::Aborted),
            }
        }
    }

    fn try_extract(&mut self, queue: &str) -> Option<ExtractedRow> {
        let mut queues = self.state.queues();
        let state = queues.get_mut(queue)?;
        let (sequence, message) = state.pending.pop_first()?;
        state.in_flight += 1;

        let msgid = if self.state.faults.take_corrupt_id() {
            "zz-not-a-message-id".to_string()
        } else {
            message.id.to_hex()
        };
        let row = ExtractedRow {
            msgid,
            content: message.content.clone(),
            errm: None,
        };
        self.extracted.push((queue.to_string(), sequence, message));
        Some(row)
    }

    /// Make staged inserts visible and extractions permanent
    pub fn commit(mut self) -> Result<(), MemoryError> {
        if self.state.faults.take_commit() {
            self.restore();
            return Err(MemoryError::Injected("commit"));
        }

        self.finished = true;
        let mut queues = self.state.queues();
        for (queue, message) in self.staged.drain(..) {
            if let Some(state) = queues.get_mut(&queue) {
                let sequence = self.state.next_sequence();
                state.pending.insert(sequence, message);
                state.notify.notify_waiters();
            }
        }
        for (queue, _, _) in self.extracted.drain(..) {
            if let Some(state) = queues.get_mut(&queue) {
                state.in_flight = state.in_flight.saturating_sub(1);
            }
        }
        Ok(())
    }

    /// Discard staged inserts and return extracted messages to their queues
    pub fn rollback(mut self) -> Result<(), MemoryError> {
        if self.state.faults.take_rollback() {
            // Work is still undone when the transaction drops
            return Err(MemoryError::Injected("rollback"));
        }
        self.restore();
        Ok(())
    }

    fn restore(&mut self) {
        self.finished = true;
        self.staged.clear();
        if self.extracted.is_empty() {
            return;
        }

        let mut queues = self.state.queues();
        for (queue, sequence, message) in self.extracted.drain(..) {
            if let Some(state) = queues.get_mut(&queue) {
                state.in_flight = state.in_flight.saturating_sub(1);
                state.pending.insert(sequence, message);
                state.notify.notify_waiters();
            }
        }
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.restore();
        }
    }
}
