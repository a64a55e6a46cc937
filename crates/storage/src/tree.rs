//! Persistent AVL tree keyed by handle
//!
//! Every node is immutable and reference counted. `insert` never touches the
//! receiver: it rebuilds only the nodes on the path from the root to the
//! insertion point (plus the nodes a rotation rearranges) and shares every
//! other subtree with the previous tree. Keeping the old [`HeapTree`] around
//! is therefore an O(1) snapshot.
//!
//! # Balance
//!
//! - Height of an empty child is 0, a leaf is 1
//! - Balance factor is `height(right) - height(left)`, always in {-1, 0, +1}
//!   once `insert` returns
//!
//! Insert recurses once per level. AVL height is below `1.45 * log2(n + 2)`,
//! so a tree of a billion objects stays under 45 frames.

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::sync::Arc;
use strata_core::{DematerializedRecord, Error, Handle, Result, Version};

type Link = Option<Arc<Node>>;

/// Immutable tree node
#[derive(Debug)]
pub struct Node {
    handle: Handle,
    record: Arc<DematerializedRecord>,
    version: Version,
    left: Link,
    right: Link,
    height: u32,
}

impl Node {
    fn build(
        handle: Handle,
        record: Arc<DematerializedRecord>,
        version: Version,
        left: Link,
        right: Link,
    ) -> Arc<Node> {
        let height = 1 + height(&left).max(height(&right));
        Arc::new(Node {
            handle,
            record,
            version,
            left,
            right,
            height,
        })
    }

    /// Copy of this node's payload over new children
    fn with_children(&self, left: Link, right: Link) -> Arc<Node> {
        Node::build(self.handle, self.record.clone(), self.version, left, right)
    }

    /// Search key
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Newest record for this handle as of the owning tree
    pub fn record(&self) -> &Arc<DematerializedRecord> {
        &self.record
    }

    /// Commit version of the record
    pub fn version(&self) -> Version {
        self.version
    }

    /// Left subtree (smaller handles)
    pub fn left(&self) -> Option<&Arc<Node>> {
        self.left.as_ref()
    }

    /// Right subtree (larger handles)
    pub fn right(&self) -> Option<&Arc<Node>> {
        self.right.as_ref()
    }

    /// Cached height of the subtree rooted here
    pub fn height(&self) -> u32 {
        self.height
    }

    fn balance_factor(&self) -> i64 {
        height(&self.right) as i64 - height(&self.left) as i64
    }
}

fn height(link: &Link) -> u32 {
    link.as_ref().map_or(0, |n| n.height)
}

/// Build a node from parts, rotating if its children differ in height by 2
///
/// Only `pivot` and the nodes it rotates with are allocated; grandchildren
/// are moved across by pointer.
fn balanced(pivot: &Node, left: Link, right: Link) -> Arc<Node> {
    let factor = height(&right) as i64 - height(&left) as i64;

    if factor > 1 {
        // factor > 1 implies a right child
        let Some(r) = right else {
            return pivot.with_children(left, None);
        };
        if r.balance_factor() >= 0 {
            // single left rotation
            let new_left = pivot.with_children(left, r.left.clone());
            return r.with_children(Some(new_left), r.right.clone());
        }
        // right-left rotation
        let Some(rl) = r.left.clone() else {
            return pivot.with_children(left, Some(r));
        };
        let new_left = pivot.with_children(left, rl.left.clone());
        let new_right = r.with_children(rl.right.clone(), r.right.clone());
        return rl.with_children(Some(new_left), Some(new_right));
    }

    if factor < -1 {
        let Some(l) = left else {
            return pivot.with_children(None, right);
        };
        if l.balance_factor() <= 0 {
            // single right rotation
            let new_right = pivot.with_children(l.right.clone(), right);
            return l.with_children(l.left.clone(), Some(new_right));
        }
        // left-right rotation
        let Some(lr) = l.right.clone() else {
            return pivot.with_children(Some(l), right);
        };
        let new_left = l.with_children(l.left.clone(), lr.left.clone());
        let new_right = pivot.with_children(lr.right.clone(), right);
        return lr.with_children(Some(new_left), Some(new_right));
    }

    pivot.with_children(left, right)
}

/// Returns the new subtree and whether a key was added
fn insert_into(link: &Link, record: &Arc<DematerializedRecord>, version: Version) -> (Arc<Node>, bool) {
    let Some(node) = link else {
        let leaf = Node::build(record.handle(), record.clone(), version, None, None);
        return (leaf, true);
    };

    match record.handle().cmp(&node.handle) {
        Ordering::Equal => {
            // payload rewrite, structure below is kept
            let replaced = Node::build(
                node.handle,
                record.clone(),
                version,
                node.left.clone(),
                node.right.clone(),
            );
            (replaced, false)
        }
        Ordering::Less => {
            let (left, added) = insert_into(&node.left, record, version);
            (balanced(node, Some(left), node.right.clone()), added)
        }
        Ordering::Greater => {
            let (right, added) = insert_into(&node.right, record, version);
            (balanced(node, node.left.clone(), Some(right)), added)
        }
    }
}

/// Persistent handle-to-record index
#[derive(Debug, Clone, Default)]
pub struct HeapTree {
    root: Link,
    len: usize,
}

impl HeapTree {
    /// Empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct handles
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the tree has no entries
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Height of the tree (0 when empty)
    pub fn height(&self) -> u32 {
        height(&self.root)
    }

    /// Root node
    pub fn root(&self) -> Option<&Arc<Node>> {
        self.root.as_ref()
    }

    /// Look up a handle
    ///
    /// Plain descent: no allocation, no rotation.
    pub fn find(&self, handle: Handle) -> Option<&Node> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match handle.cmp(&node.handle) {
                Ordering::Equal => return Some(node),
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
            };
        }
        None
    }

    /// Newest record for a handle
    pub fn get(&self, handle: Handle) -> Option<&Arc<DematerializedRecord>> {
        self.find(handle).map(Node::record)
    }

    /// Insert or replace the record for its handle, returning the new tree
    pub fn insert(&self, record: Arc<DematerializedRecord>) -> HeapTree {
        let version = record.version();
        let (root, added) = insert_into(&self.root, &record, version);
        HeapTree {
            root: Some(root),
            len: self.len + usize::from(added),
        }
    }

    /// In-order iteration over nodes (ascending handle)
    pub fn iter(&self) -> Iter<'_> {
        let mut iter = Iter {
            stack: SmallVec::new(),
        };
        iter.push_left_spine(self.root.as_deref());
        iter
    }

    /// Check ordering, balance, cached heights and length
    pub fn validate(&self) -> Result<()> {
        let mut previous: Option<Handle> = None;
        let mut count = 0usize;
        check_subtree(self.root.as_deref(), &mut previous, &mut count)?;
        if count != self.len {
            return Err(Error::Internal(format!(
                "tree length {} but {} nodes reachable",
                self.len, count
            )));
        }
        Ok(())
    }
}

fn check_subtree(node: Option<&Node>, previous: &mut Option<Handle>, count: &mut usize) -> Result<u32> {
    let Some(node) = node else {
        return Ok(0);
    };

    let left = check_subtree(node.left.as_deref(), previous, count)?;
    if let Some(prev) = *previous {
        if prev >= node.handle {
            return Err(Error::Internal(format!(
                "order violated: {} before {}",
                prev, node.handle
            )));
        }
    }
    *previous = Some(node.handle);
    *count += 1;
    let right = check_subtree(node.right.as_deref(), previous, count)?;

    let expected = 1 + left.max(right);
    if node.height != expected {
        return Err(Error::Internal(format!(
            "node {} caches height {} but measures {}",
            node.handle, node.height, expected
        )));
    }
    if (right as i64 - left as i64).abs() > 1 {
        return Err(Error::Internal(format!(
            "node {} out of balance: left {} right {}",
            node.handle, left, right
        )));
    }
    Ok(expected)
}

/// In-order node iterator
pub struct Iter<'a> {
    stack: SmallVec<[&'a Node; 32]>,
}

impl<'a> Iter<'a> {
    fn push_left_spine(&mut self, mut node: Option<&'a Node>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.left.as_deref();
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left_spine(node.right.as_deref());
        Some(node)
    }
}
