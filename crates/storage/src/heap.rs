//! The multi-versioned heap
//!
//! [`Heap`] owns the snapshot chain. The newest snapshot sits in a single
//! `ArcSwap` cell; readers load it without locking, committers extend the
//! chain with compare-and-swap.
//!
//! # Commit protocol
//!
//! 1. Load the current head
//! 2. For every pending write whose handle existed in the committer's start
//!    snapshot, compare the version visible now with the version seen then;
//!    any difference is a write conflict and nothing is applied
//! 3. Build the next tree over all writes at `head.version + 1`
//! 4. CAS the head; on failure another commit won, back off and go to 1
//!
//! The loop is unbounded. [`Backoff`] only spaces the attempts out.

use crate::backoff::Backoff;
use crate::snapshot::HeapSnapshot;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::{DematerializedRecord, Error, Handle, PendingRecord, Result, Version};
use tracing::{debug, trace, warn};

/// Counters kept by the heap itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapStats {
    /// Snapshots published
    pub commits: u64,
    /// CAS attempts lost to a concurrent commit
    pub cas_failures: u64,
    /// Commits rejected by the version check
    pub write_conflicts: u64,
}

/// Versioned object store shared by all transactions
pub struct Heap {
    head: ArcSwap<HeapSnapshot>,
    oldest: Version,
    backoff: Backoff,
    commits: AtomicU64,
    cas_failures: AtomicU64,
    write_conflicts: AtomicU64,
}

impl Heap {
    /// Empty heap at version 0
    pub fn new() -> Self {
        Self::with_initial_version(0)
    }

    /// Empty heap whose first snapshot has `version`
    ///
    /// Nothing older than `version` is ever retained.
    pub fn with_initial_version(version: Version) -> Self {
        Heap {
            head: ArcSwap::from_pointee(HeapSnapshot::genesis(version)),
            oldest: version,
            backoff: Backoff::None,
            commits: AtomicU64::new(0),
            cas_failures: AtomicU64::new(0),
            write_conflicts: AtomicU64::new(0),
        }
    }

    /// Set the pause between lost CAS attempts
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Newest snapshot
    pub fn head(&self) -> Arc<HeapSnapshot> {
        self.head.load_full()
    }

    /// Version of the newest snapshot
    pub fn current_version(&self) -> Version {
        self.head.load().version()
    }

    /// Oldest version still resolvable
    pub fn oldest_version(&self) -> Version {
        self.oldest
    }

    /// Newest snapshot whose version is `<= version`
    ///
    /// Walks the parent chain down from the head. Fails with
    /// [`Error::SnapshotTooOld`] when the walk falls off the end.
    pub fn snapshot_at(&self, version: Version) -> Result<Arc<HeapSnapshot>> {
        let mut current = self.head.load_full();
        loop {
            if current.version() <= version {
                return Ok(current);
            }
            let parent = match current.parent() {
                Some(parent) => parent.clone(),
                None => {
                    return Err(Error::SnapshotTooOld {
                        requested: version,
                        oldest: current.version(),
                    })
                }
            };
            current = parent;
        }
    }

    /// Record for `handle` as of `version`, `None` if not yet committed then
    pub fn read_at(
        &self,
        handle: Handle,
        version: Version,
    ) -> Result<Option<Arc<DematerializedRecord>>> {
        Ok(self.snapshot_at(version)?.read(handle))
    }

    /// Publish `writes` as one new version
    ///
    /// `start` is the snapshot the writing transaction read from. Returns the
    /// new version, or the current one when `writes` is empty.
    pub fn commit(&self, start: &HeapSnapshot, writes: &[PendingRecord]) -> Result<Version> {
        if writes.is_empty() {
            return Ok(self.current_version());
        }

        let mut attempt = 0u32;
        loop {
            let current = self.head.load_full();
            if let Err(e) = check_conflicts(start, &current, writes) {
                self.write_conflicts.fetch_add(1, Ordering::Relaxed);
                warn!(start = start.version(), head = current.version(), error = %e, "Write conflict");
                return Err(e);
            }

            let version = current.version() + 1;
            let tree = writes
                .iter()
                .fold(current.tree().clone(), |tree, write| tree.insert(write.to_record(version)));
            let next = Arc::new(HeapSnapshot::new(version, tree, current.clone()));

            let previous = self.head.compare_and_swap(&current, next);
            if Arc::ptr_eq(&previous, &current) {
                self.commits.fetch_add(1, Ordering::Relaxed);
                debug!(version, writes = writes.len(), attempts = attempt + 1, "Published snapshot");
                return Ok(version);
            }

            attempt += 1;
            self.cas_failures.fetch_add(1, Ordering::Relaxed);
            trace!(attempt, lost_to = previous.version(), "Snapshot CAS lost, retrying");
            self.backoff.snooze(attempt);
        }
    }

    /// Counters since creation
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            commits: self.commits.load(Ordering::Relaxed),
            cas_failures: self.cas_failures.load(Ordering::Relaxed),
            write_conflicts: self.write_conflicts.load(Ordering::Relaxed),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("version", &self.current_version())
            .field("oldest", &self.oldest)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// New handles never conflict; a handle seen at start must still be at the
/// same version.
fn check_conflicts(
    start: &HeapSnapshot,
    current: &HeapSnapshot,
    writes: &[PendingRecord],
) -> Result<()> {
    if std::ptr::eq(start, current) {
        return Ok(());
    }
    for write in writes {
        let handle = write.handle();
        let Some(expected) = start.version_of(handle) else {
            continue;
        };
        let actual = current.version_of(handle);
        if actual != Some(expected) {
            return Err(Error::WriteConflict {
                handle,
                expected: Some(expected),
                actual,
            });
        }
    }
    Ok(())
}
