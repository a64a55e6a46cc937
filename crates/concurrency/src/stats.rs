//! Transaction counters
//!
//! Observability only: nothing in the engine reads these to make decisions.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use strata_storage::HeapStats;

/// Live counters, updated with relaxed atomics
#[derive(Debug, Default)]
pub struct StmStatistics {
    started: AtomicU64,
    committed: AtomicU64,
    read_only_commits: AtomicU64,
    aborted: AtomicU64,
    retries: AtomicU64,
    write_conflicts: AtomicU64,
    lock_failures: AtomicU64,
}

impl StmStatistics {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self, read_only: bool) {
        self.committed.fetch_add(1, Ordering::Relaxed);
        if read_only {
            self.read_only_commits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_abort(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_conflict(&self) {
        self.write_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_failure(&self) {
        self.lock_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy, merged with the heap's own counters
    pub fn snapshot(&self, heap: &HeapStats) -> StatisticsSnapshot {
        StatisticsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            read_only_commits: self.read_only_commits.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
            lock_failures: self.lock_failures.load(Ordering::Relaxed),
            cas_failures: heap.cas_failures,
        }
    }
}

/// Serializable statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Transactions begun, including restarts after retry
    pub started: u64,
    /// Successful commits, read-only ones included
    pub committed: u64,
    /// Commits with an empty write set
    pub read_only_commits: u64,
    /// Explicit aborts and failed commits
    pub aborted: u64,
    /// Blocking retries
    pub retries: u64,
    /// Commits rejected by the version check
    pub write_conflicts: u64,
    /// Commits rejected by a held commit lock
    pub lock_failures: u64,
    /// Snapshot CAS attempts lost to a concurrent commit
    pub cas_failures: u64,
}

impl StatisticsSnapshot {
    /// Commits that published a new version
    pub fn update_commits(&self) -> u64 {
        self.committed - self.read_only_commits
    }
}
