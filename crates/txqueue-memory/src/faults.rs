//! One-shot fault injection for the in-memory broker.

use std::sync::atomic::{AtomicBool, Ordering};

/// Faults armed on a broker; each one fires once and then disarms
#[derive(Debug, Default)]
pub struct FaultPlan {
    insert: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
    disconnect: AtomicBool,
    corrupt_id: AtomicBool,
}

impl FaultPlan {
    /// Fail the next insert inside an enqueue transaction
    pub fn fail_next_insert(&self) {
        self.insert.store(true, Ordering::SeqCst);
    }

    /// Fail the next commit; the transaction's work is discarded
    pub fn fail_next_commit(&self) {
        self.commit.store(true, Ordering::SeqCst);
    }

    /// Fail the next rollback request
    pub fn fail_next_rollback(&self) {
        self.rollback.store(true, Ordering::SeqCst);
    }

    /// Fail the next session close
    pub fn fail_next_disconnect(&self) {
        self.disconnect.store(true, Ordering::SeqCst);
    }

    /// Hand out a malformed identity on the next extraction
    pub fn corrupt_next_id(&self) {
        self.corrupt_id.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_insert(&self) -> bool {
        self.insert.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_commit(&self) -> bool {
        self.commit.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_rollback(&self) -> bool {
        self.rollback.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_disconnect(&self) -> bool {
        self.disconnect.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_corrupt_id(&self) -> bool {
        self.corrupt_id.swap(false, Ordering::SeqCst)
    }
}
