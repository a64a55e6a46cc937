//! Storage layer for the strata transactional heap
//!
//! This crate implements the multi-versioned object store:
//! - HeapTree: persistent AVL tree from handle to newest record
//! - HeapSnapshot: immutable heap view at one version, linked to its parent
//! - Heap: lock-free snapshot chain advanced by compare-and-swap
//! - Backoff: pause policy for optimistic retry loops

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod heap;
pub mod snapshot;
pub mod tree;

pub use backoff::Backoff;
pub use heap::{Heap, HeapStats};
pub use snapshot::HeapSnapshot;
pub use tree::{HeapTree, Node};
