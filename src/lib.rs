//! # stratastm
//!
//! Software transactional memory over a multi-versioned object heap.
//!
//! Objects live in an immutable, structurally shared heap snapshot. A
//! transaction reads one snapshot, buffers its changes privately and
//! publishes them atomically as the next version. Conflicting writers are
//! detected at commit time; readers never block and never see a torn state.
//!
//! ## Quick Start
//!
//! ```
//! use stratastm::prelude::*;
//!
//! #[derive(Debug)]
//! struct Account {
//!     balance: i64,
//! }
//!
//! impl Transactable for Account {
//!     fn dematerialize(&self) -> Fields {
//!         Fields::new().int(self.balance)
//!     }
//!
//!     fn rematerialize(reader: &mut FieldReader<'_>) -> Result<Self> {
//!         Ok(Account { balance: reader.next_int()? })
//!     }
//! }
//!
//! let stm = Stm::new();
//! let (from, to) = stm.atomically(|txn| {
//!     Ok((txn.attach(Account { balance: 100 })?, txn.attach(Account { balance: 0 })?))
//! })?;
//!
//! stm.atomically(|txn| {
//!     // block until the balance allows the transfer
//!     guard(txn.read(&from)?.balance >= 30)?;
//!     txn.write(&from)?.balance -= 30;
//!     txn.write(&to)?.balance += 30;
//!     Ok(())
//! })?;
//! # Ok::<(), stratastm::Error>(())
//! ```
//!
//! ## Blocking
//!
//! Returning [`retry()`] from a body passed to [`Stm::atomically`] parks the
//! thread until another transaction overwrites something the body read, then
//! runs it again. [`Transaction::or_else`] composes two alternatives: the
//! second runs only if the first retries.

#![warn(missing_docs)]

mod stm;

pub mod prelude;

// Re-export main entry points
pub use stm::{Stm, StmBuilder};

// Re-export the layers
pub use strata_concurrency::{
    DirtinessStatus, Loaded, LockPolicy, NoopObserver, ReadPolicy, StatisticsSnapshot, StmConfig,
    Transaction, TransactionManager, TransactionObserver, TransactionStatus,
};
pub use strata_core::{
    Error, FieldReader, FieldValue, Fields, Handle, Result, Transactable, TxRef, TxnId, Version,
};
pub use strata_storage::Backoff;

/// Ask the enclosing [`Stm::atomically`] to block until something read so far
/// changes, then run the body again.
///
/// ```
/// # use stratastm::prelude::*;
/// fn pop(queue: &mut Vec<i64>) -> Result<i64> {
///     match queue.pop() {
///         Some(item) => Ok(item),
///         None => retry(),
///     }
/// }
/// assert!(pop(&mut Vec::new()).unwrap_err().is_retry());
/// ```
pub fn retry<T>() -> Result<T> {
    Err(Error::Retry)
}

/// Continue only if `condition` holds, otherwise [`retry()`].
pub fn guard(condition: bool) -> Result<()> {
    if condition {
        Ok(())
    } else {
        retry()
    }
}

/// Unwrap `value`, or [`retry()`] if it is `None`.
pub fn unwrap_or_retry<T>(value: Option<T>) -> Result<T> {
    value.ok_or(Error::Retry)
}
