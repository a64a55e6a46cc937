//! Per-object listener registry
//!
//! Maps every handle some transaction has waited on to a
//! [`VersionedLatchGroup`] whose active version is the newest commit that
//! wrote that handle. A retrying transaction files one latch in the group of
//! every handle it read; a commit activates the groups of every handle it
//! wrote.
//!
//! Registration inserts the group before it reads the heap, and a commit
//! publishes its snapshot before it looks groups up, so at least one side
//! always observes the other.

use crate::latch::Latch;
use crate::latch_group::VersionedLatchGroup;
use dashmap::DashMap;
use std::sync::Arc;
use strata_core::{Error, Handle, Result, Version};
use strata_storage::Heap;
use tracing::trace;

/// Handle-keyed latch groups shared by all transactions
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    groups: DashMap<Handle, Arc<VersionedLatchGroup>>,
}

impl ListenerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, handle: Handle) -> Arc<VersionedLatchGroup> {
        self.groups
            .entry(handle)
            .or_insert_with(|| Arc::new(VersionedLatchGroup::new(0)))
            .clone()
    }

    /// File `latch` so it opens once any of `handles` is written after
    /// `start_version`
    ///
    /// Opens the latch immediately if one of them already has been. Fails
    /// with [`Error::NoProgressPossible`] when `handles` is empty.
    ///
    /// Returns the handles the latch was filed under; pass them to
    /// [`ListenerRegistry::deregister`] once the latch has been observed.
    pub fn register(
        &self,
        heap: &Heap,
        handles: &[Handle],
        start_version: Version,
        latch: &Arc<Latch>,
    ) -> Result<Vec<Handle>> {
        if handles.is_empty() {
            return Err(Error::NoProgressPossible(
                "no read dependencies to wait on".to_string(),
            ));
        }

        let mut filed = Vec::with_capacity(handles.len());
        for &handle in handles {
            let group = self.group(handle);
            let written = match heap.head().version_of(handle) {
                Some(written) => written,
                None => {
                    self.deregister(&filed, start_version, latch);
                    return Err(Error::Internal(format!(
                        "listened object {} is not in the heap",
                        handle
                    )));
                }
            };
            group.activate_version(written);
            group.add_latch(start_version + 1, latch);
            filed.push(handle);
            if latch.is_open() {
                trace!(%handle, written, start_version, "Read dependency already changed");
                break;
            }
        }
        Ok(filed)
    }

    /// Withdraw `latch` from the groups of `handles` it was filed under
    pub fn deregister(&self, handles: &[Handle], start_version: Version, latch: &Arc<Latch>) {
        for handle in handles {
            let group = self.groups.get(handle).map(|g| Arc::clone(g.value()));
            if let Some(group) = group {
                group.remove_latch(start_version + 1, latch);
            }
        }
    }

    /// Wake every latch waiting on `handles` that `version` satisfies
    pub fn notify_committed(&self, handles: impl IntoIterator<Item = Handle>, version: Version) {
        for handle in handles {
            let group = self.groups.get(&handle).map(|g| Arc::clone(g.value()));
            if let Some(group) = group {
                group.activate_version(version);
            }
        }
    }

    /// Number of trigger buckets still holding latches, over all handles
    pub fn bucket_count(&self) -> usize {
        self.groups.iter().map(|g| g.value().bucket_count()).sum()
    }

    /// Number of handles with a latch group
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if no handle has ever been listened on
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
