//! Transaction manager for coordinating commits
//!
//! Owns everything transactions share: the heap, the advisory lock table,
//! the listener registry, liveness tracking, statistics and the configured
//! observer.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Empty write set: read-only fast path, return the current version
//! 2. Lock every written handle (all or nothing)
//! 3. Heap commit: version check against the start snapshot, then CAS
//! 4. Release the locks (whatever happened in 3)
//! 5. On success: wake listeners of every written handle
//! ```
//!
//! Write conflicts and lock failures are returned to the caller, never
//! retried here. [`TransactionManager::atomically`] is the driver that
//! re-runs a body on those errors and on `Error::Retry`.

use crate::config::StmConfig;
use crate::latch::Latch;
use crate::listeners::ListenerRegistry;
use crate::liveness::LivenessRegistry;
use crate::lock::LockTable;
use crate::observer::{NoopObserver, TransactionObserver};
use crate::stats::{StatisticsSnapshot, StmStatistics};
use crate::transaction::Transaction;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::{Error, Handle, PendingRecord, Result, TxnId, Version};
use strata_storage::{Heap, HeapSnapshot};
use tracing::{debug, warn};

/// Shared state behind every transaction
///
/// Always used through an `Arc`: each [`Transaction`] keeps one.
pub struct TransactionManager {
    heap: Heap,
    locks: LockTable,
    listeners: ListenerRegistry,
    liveness: LivenessRegistry,
    stats: StmStatistics,
    config: StmConfig,
    observer: Arc<dyn TransactionObserver>,
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    /// Manager over an empty heap with default configuration
    pub fn new() -> Arc<Self> {
        Self::with_config(StmConfig::default(), Arc::new(NoopObserver))
    }

    /// Manager over an empty heap
    pub fn with_config(config: StmConfig, observer: Arc<dyn TransactionObserver>) -> Arc<Self> {
        let heap = Heap::with_initial_version(config.initial_version)
            .with_backoff(config.commit_backoff);
        Arc::new(TransactionManager {
            heap,
            locks: LockTable::new(),
            listeners: ListenerRegistry::new(),
            liveness: LivenessRegistry::new(),
            stats: StmStatistics::new(),
            config,
            observer,
            next_txn_id: AtomicU64::new(1),
        })
    }

    /// Start a transaction reading the newest snapshot
    pub fn begin(self: &Arc<Self>) -> Transaction {
        let snapshot = self.heap.head();
        Transaction::new(Arc::clone(self), self.allocate_txn_id(), snapshot)
    }

    /// Start a transaction reading an older snapshot
    ///
    /// Fails with [`Error::SnapshotTooOld`] when `version` is no longer
    /// retained and with [`Error::InvalidOperation`] when it is in the future.
    pub fn begin_at(self: &Arc<Self>, version: Version) -> Result<Transaction> {
        let current = self.heap.current_version();
        if version > current {
            return Err(Error::InvalidOperation(format!(
                "cannot begin at version {}, heap is at {}",
                version, current
            )));
        }
        let snapshot = self.heap.snapshot_at(version)?;
        Ok(Transaction::new(
            Arc::clone(self),
            self.allocate_txn_id(),
            snapshot,
        ))
    }

    fn allocate_txn_id(&self) -> TxnId {
        self.next_txn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Run `body` in a transaction until it commits
    ///
    /// - `Err(Error::Retry)` from the body blocks until something it read
    ///   changes, then re-runs it
    /// - a write conflict or lock failure at commit re-runs it on a fresh
    ///   snapshot, up to `max_conflict_retries` times
    /// - any other error aborts the transaction and is returned
    ///
    /// The body may run many times; it must not have side effects outside
    /// the transaction.
    pub fn atomically<R, F>(self: &Arc<Self>, mut body: F) -> Result<R>
    where
        F: FnMut(&mut Transaction) -> Result<R>,
    {
        let mut txn = self.begin();
        let mut conflicts = 0u32;
        loop {
            match body(&mut txn) {
                Ok(value) => match txn.commit() {
                    Ok(_) => return Ok(value),
                    Err(e) if e.is_retryable() => {
                        conflicts += 1;
                        if let Some(max) = self.config.max_conflict_retries {
                            if conflicts > max {
                                warn!(txn_id = txn.id(), conflicts, error = %e, "Giving up after repeated conflicts");
                                return Err(e);
                            }
                        }
                        debug!(txn_id = txn.id(), conflicts, error = %e, "Restarting after conflict");
                        self.config.conflict_backoff.snooze(conflicts);
                        txn = self.begin();
                    }
                    Err(e) => return Err(e),
                },
                Err(Error::Retry) => {
                    if let Err(e) = txn.abort_and_retry() {
                        if txn.is_active() {
                            txn.abort()?;
                        }
                        return Err(e);
                    }
                }
                Err(e) => {
                    if txn.is_active() {
                        txn.abort()?;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Commit `writes` read from `start` on behalf of `txn_id`
    pub(crate) fn commit(
        &self,
        txn_id: TxnId,
        start: &HeapSnapshot,
        writes: &[PendingRecord],
    ) -> Result<Version> {
        if writes.is_empty() {
            let version = self.heap.current_version();
            self.stats.record_commit(true);
            self.observer.on_commit(txn_id, version, 0);
            return Ok(version);
        }

        let handles: SmallVec<[Handle; 8]> = writes.iter().map(PendingRecord::handle).collect();
        let result = match self.locks.acquire(txn_id, &handles, self.config.lock_policy) {
            Ok(_locks) => self.heap.commit(start, writes),
            Err(e) => {
                self.stats.record_lock_failure();
                self.observer.on_conflict(txn_id, &e);
                return Err(e);
            }
        };

        match result {
            Ok(version) => {
                self.listeners.notify_committed(handles.iter().copied(), version);
                self.stats.record_commit(false);
                self.observer.on_commit(txn_id, version, writes.len());
                debug!(txn_id, version, writes = writes.len(), "Transaction committed");
                Ok(version)
            }
            Err(e) => {
                if e.is_conflict() {
                    self.stats.record_write_conflict();
                    self.observer.on_conflict(txn_id, &e);
                }
                Err(e)
            }
        }
    }

    /// File `latch` against `handles` read at `start_version`
    pub(crate) fn listen(
        &self,
        handles: &[Handle],
        start_version: Version,
        latch: &Arc<Latch>,
    ) -> Result<Vec<Handle>> {
        self.listeners
            .register(&self.heap, handles, start_version, latch)
    }

    /// Withdraw a latch filed by [`TransactionManager::listen`]
    pub(crate) fn unlisten(
        &self,
        handles: &[Handle],
        start_version: Version,
        latch: &Arc<Latch>,
    ) {
        self.listeners.deregister(handles, start_version, latch);
    }

    pub(crate) fn stats(&self) -> &StmStatistics {
        &self.stats
    }

    pub(crate) fn liveness(&self) -> &LivenessRegistry {
        &self.liveness
    }

    pub(crate) fn observer(&self) -> &dyn TransactionObserver {
        self.observer.as_ref()
    }

    /// The heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Active configuration
    pub fn config(&self) -> &StmConfig {
        &self.config
    }

    /// Version of the newest snapshot
    pub fn current_version(&self) -> Version {
        self.heap.current_version()
    }

    /// Oldest start version of any live transaction
    pub fn oldest_live_version(&self) -> Option<Version> {
        self.liveness.oldest_live_version()
    }

    /// Number of live transactions
    pub fn live_transactions(&self) -> usize {
        self.liveness.live_count()
    }

    /// Counters, heap counters included
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot(&self.heap.stats())
    }

    /// Handle currently locked by a committer, if any
    pub fn lock_holder(&self, handle: Handle) -> Option<TxnId> {
        self.locks.holder_of(handle)
    }

    /// Number of latch buckets waiting on future commits
    pub fn waiting_buckets(&self) -> usize {
        self.listeners.bucket_count()
    }

    /// Number of handles with a listener group
    pub fn listened_handles(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("heap", &self.heap)
            .field("config", &self.config)
            .field("next_txn_id", &self.next_txn_id.load(Ordering::Relaxed))
            .finish()
    }
}
