//! Concurrency layer for the transactional heap
//!
//! This crate runs transactions over the versioned heap:
//! - Transaction: private read/write set over one snapshot
//! - TransactionManager: commit orchestration and the `atomically` driver
//! - Commit locks, blocking retry via versioned latches, or-else branches

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod latch;
pub mod latch_group;
pub mod listeners;
pub mod liveness;
pub mod lock;
pub mod manager;
pub mod observer;
pub mod stats;
pub mod tranlocal;
pub mod transaction;

pub use config::StmConfig;
pub use latch::Latch;
pub use latch_group::VersionedLatchGroup;
pub use listeners::ListenerRegistry;
pub use liveness::LivenessRegistry;
pub use lock::{LockGuard, LockPolicy, LockTable};
pub use manager::TransactionManager;
pub use observer::{NoopObserver, TransactionObserver};
pub use stats::{StatisticsSnapshot, StmStatistics};
pub use tranlocal::{DirtinessStatus, OrElseFrame, Tranlocal};
pub use transaction::{Loaded, ReadPolicy, Transaction, TransactionStatus};
