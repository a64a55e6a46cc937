//! Advisory per-object commit locks
//!
//! Before its version check a committer takes one lock per written handle.
//! Handles are locked in ascending order, and a lock held by another
//! transaction fails the whole acquisition: everything taken so far is
//! released and the commit reports [`Error::FailedToObtainLocks`]. Nothing
//! ever waits on a lock beyond the configured spin.
//!
//! Locks are released when the returned [`LockGuard`] drops, whatever the
//! outcome of the commit.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strata_core::{Error, Handle, Result, TxnId};
use tracing::warn;

/// What to do when a commit lock is held by someone else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LockPolicy {
    /// Give up on the first held lock
    #[default]
    FailFast,
    /// Re-try each held lock up to `attempts` times before giving up
    Spin {
        /// Extra attempts per lock
        attempts: u32,
    },
}

/// Owner table for advisory locks
#[derive(Debug, Default)]
pub struct LockTable {
    owners: DashMap<Handle, TxnId>,
}

impl LockTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every handle for `owner`, or none of them
    pub fn acquire(
        &self,
        owner: TxnId,
        handles: &[Handle],
        policy: LockPolicy,
    ) -> Result<LockGuard<'_>> {
        let mut sorted: SmallVec<[Handle; 8]> = handles.iter().copied().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guard = LockGuard {
            table: self,
            owner,
            held: SmallVec::with_capacity(sorted.len()),
        };
        for handle in sorted {
            if let Err(holder) = self.lock_one(owner, handle, policy) {
                warn!(txn_id = owner, %handle, holder, "Commit lock held by another transaction");
                // dropping the guard releases what was taken
                return Err(Error::FailedToObtainLocks {
                    handle,
                    owner: holder,
                });
            }
            guard.held.push(handle);
        }
        Ok(guard)
    }

    fn lock_one(&self, owner: TxnId, handle: Handle, policy: LockPolicy) -> std::result::Result<(), TxnId> {
        let attempts = match policy {
            LockPolicy::FailFast => 0,
            LockPolicy::Spin { attempts } => attempts,
        };
        let mut tried = 0;
        loop {
            match self.try_lock(owner, handle) {
                Ok(()) => return Ok(()),
                Err(holder) if tried >= attempts => return Err(holder),
                Err(_) => {
                    tried += 1;
                    std::hint::spin_loop();
                    std::thread::yield_now();
                }
            }
        }
    }

    fn try_lock(&self, owner: TxnId, handle: Handle) -> std::result::Result<(), TxnId> {
        match self.owners.entry(handle) {
            Entry::Occupied(entry) if *entry.get() == owner => Ok(()),
            Entry::Occupied(entry) => Err(*entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(owner);
                Ok(())
            }
        }
    }

    fn release(&self, owner: TxnId, handle: Handle) {
        self.owners.remove_if(&handle, |_, held_by| *held_by == owner);
    }

    /// Transaction currently holding `handle`
    pub fn holder_of(&self, handle: Handle) -> Option<TxnId> {
        self.owners.get(&handle).map(|owner| *owner)
    }

    /// Number of handles currently locked
    pub fn locked_count(&self) -> usize {
        self.owners.len()
    }
}

/// Releases a set of held commit locks on drop
#[derive(Debug)]
pub struct LockGuard<'a> {
    table: &'a LockTable,
    owner: TxnId,
    held: SmallVec<[Handle; 8]>,
}

impl LockGuard<'_> {
    /// Handles held, ascending
    pub fn handles(&self) -> &[Handle] {
        &self.held
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        for &handle in &self.held {
            self.table.release(self.owner, handle);
        }
    }
}
