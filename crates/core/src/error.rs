//! Error types for the transactional heap
//!
//! This is the canonical error type for every layer: the storage heap, the
//! concurrency layer and the public facade all return [`Error`].
//!
//! ## Classes
//!
//! | Variant | Meaning | Retry the body? |
//! |---------|---------|-----------------|
//! | `WriteConflict` | A written object changed since the transaction started | Yes |
//! | `FailedToObtainLocks` | Another committer holds a commit lock | Yes |
//! | `SnapshotTooOld` | Start version is no longer retained | Restart |
//! | `LoadUncommitted` | Handle was never committed | No (bug) |
//! | `DeadTransaction` | Operation on a committed/aborted transaction | No (bug) |
//! | `NoProgressPossible` | Retry with nothing to wait on | No (bug) |
//! | `Retry` | Control-flow signal, handled by the retry driver | - |

use crate::types::{Handle, TxnId, Version};
use thiserror::Error;

/// All transactional heap errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A handle in the write set was overwritten after the transaction began
    #[error("write conflict on {handle}: read at version {expected:?}, now at {actual:?}")]
    WriteConflict {
        /// The conflicting object
        handle: Handle,
        /// Version observed at transaction start
        expected: Option<Version>,
        /// Version found at commit time
        actual: Option<Version>,
    },

    /// An advisory commit lock is held by another transaction
    #[error("failed to obtain commit locks: {handle} is held by transaction {owner}")]
    FailedToObtainLocks {
        /// The contended object
        handle: Handle,
        /// Transaction currently holding the lock
        owner: TxnId,
    },

    /// The requested version is older than the oldest retained snapshot
    #[error("snapshot too old: requested version {requested}, oldest retained {oldest}")]
    SnapshotTooOld {
        /// Requested version
        requested: Version,
        /// Oldest version still reachable
        oldest: Version,
    },

    /// A handle was referenced that has never been committed
    #[error("load of uncommitted object {0}")]
    LoadUncommitted(Handle),

    /// Operation on a transaction that already committed or aborted
    #[error("transaction {txn_id} is {state}")]
    DeadTransaction {
        /// Transaction identity
        txn_id: TxnId,
        /// Terminal state name
        state: &'static str,
    },

    /// Retry requested without any read dependency to wait on
    #[error("no progress possible: {0}")]
    NoProgressPossible(String),

    /// Block until a read dependency changes, then re-execute
    #[error("retry requested")]
    Retry,

    /// Materialized type does not match the requested type
    #[error("wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// Requested type
        expected: &'static str,
        /// Stored type
        actual: &'static str,
    },

    /// Operation not valid in the current state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Field decoding failed while rematerializing
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be parsed or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for transactional heap operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if re-running the whole transaction body may succeed.
    ///
    /// Write conflicts and lock contention are transient; everything else is
    /// either a programming error or needs special handling.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::WriteConflict { .. } | Error::FailedToObtainLocks { .. }
        )
    }

    /// Check if this is a write conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::WriteConflict { .. })
    }

    /// Check if this is the retry control signal.
    pub fn is_retry(&self) -> bool {
        matches!(self, Error::Retry)
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}
