//! Injection point for profiling and tracing hooks
//!
//! The engine calls a [`TransactionObserver`] at every lifecycle transition.
//! Observers must not call back into the transaction that triggered them.

use strata_core::{Error, TxnId, Version};

/// Lifecycle callbacks, all defaulting to no-ops
pub trait TransactionObserver: Send + Sync {
    /// A transaction (or a restart after retry) began at `version`
    fn on_begin(&self, _txn_id: TxnId, _version: Version) {}

    /// A commit succeeded; `writes` is 0 for read-only commits
    fn on_commit(&self, _txn_id: TxnId, _version: Version, _writes: usize) {}

    /// A transaction was aborted
    fn on_abort(&self, _txn_id: TxnId, _reason: &str) {}

    /// A transaction is about to block waiting on `read_set` handles
    fn on_retry(&self, _txn_id: TxnId, _read_set: usize) {}

    /// A commit failed with a write conflict or lock failure
    fn on_conflict(&self, _txn_id: TxnId, _error: &Error) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransactionObserver for NoopObserver {}
