//! Heap snapshots
//!
//! A [`HeapSnapshot`] is the whole object store as of one commit version: a
//! tree root, the version number and a pointer to the snapshot it replaced.
//! Snapshots are never mutated. Older snapshots stay alive as long as
//! something (a newer snapshot's parent link, or a transaction) holds them.

use crate::tree::HeapTree;
use std::sync::Arc;
use strata_core::{DematerializedRecord, Handle, Version};

/// Immutable view of the heap at one version
#[derive(Debug)]
pub struct HeapSnapshot {
    version: Version,
    tree: HeapTree,
    parent: Option<Arc<HeapSnapshot>>,
}

impl HeapSnapshot {
    /// First snapshot of a chain
    pub fn genesis(version: Version) -> Self {
        HeapSnapshot {
            version,
            tree: HeapTree::new(),
            parent: None,
        }
    }

    pub(crate) fn new(version: Version, tree: HeapTree, parent: Arc<HeapSnapshot>) -> Self {
        HeapSnapshot {
            version,
            tree,
            parent: Some(parent),
        }
    }

    /// Commit version of this snapshot
    pub fn version(&self) -> Version {
        self.version
    }

    /// Handle index as of this version
    pub fn tree(&self) -> &HeapTree {
        &self.tree
    }

    /// The snapshot this one replaced
    pub fn parent(&self) -> Option<&Arc<HeapSnapshot>> {
        self.parent.as_ref()
    }

    /// Commit version of the newest record for `handle`, `None` if absent
    pub fn version_of(&self, handle: Handle) -> Option<Version> {
        self.tree.find(handle).map(|node| node.version())
    }

    /// Newest record for `handle` as of this snapshot
    pub fn read(&self, handle: Handle) -> Option<Arc<DematerializedRecord>> {
        self.tree.get(handle).cloned()
    }

    /// Check if `handle` has been committed as of this snapshot
    pub fn contains(&self, handle: Handle) -> bool {
        self.tree.find(handle).is_some()
    }

    /// Number of objects visible in this snapshot
    pub fn object_count(&self) -> usize {
        self.tree.len()
    }
}

impl Drop for HeapSnapshot {
    // Unlink the parent chain one snapshot at a time; the default drop would
    // recurse once per version.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(snapshot) = next {
            match Arc::try_unwrap(snapshot) {
                Ok(mut owned) => next = owned.parent.take(),
                Err(_) => break,
            }
        }
    }
}
