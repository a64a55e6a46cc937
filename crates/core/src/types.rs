//! Core identity types for the transactional heap
//!
//! This module defines the fundamental types used throughout the system:
//! - [`Handle`]: Stable identity of one logical transactable object
//! - [`TxRef`]: Typed handle used by application code and child references
//! - [`Version`]: Heap commit version
//! - [`TxnId`]: Transaction identity (owner of advisory commit locks)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Heap commit version
///
/// Monotonically increasing. Version 0 is the empty heap; every successful
/// commit that changes at least one object produces exactly one new version.
pub type Version = u64;

/// Transaction identifier
pub type TxnId = u64;

/// Source of fresh handle ids. Id 0 is never handed out.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Globally unique identity of a transactable object
///
/// A handle is created once, when the object is first attached, and is never
/// reused or mutated. Every revision of the object stored in the heap carries
/// the same handle, which is what lets a transaction refer to "the same
/// logical object" across many immutable revisions.
///
/// Handles are totally ordered; the heap's search tree is keyed by them.
///
/// # Examples
///
/// ```
/// use strata_core::types::Handle;
///
/// let a = Handle::new();
/// let b = Handle::new();
/// assert_ne!(a, b); // Each Handle is unique
/// assert!(a < b);   // Later handles sort after earlier ones
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// Allocate a fresh handle
    ///
    /// Does not require a transaction, so objects can be created before any
    /// transaction exists.
    pub fn new() -> Self {
        Handle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Re-create a handle from its raw id
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_core::types::Handle;
    ///
    /// let h = Handle::new();
    /// assert_eq!(Handle::from_raw(h.as_u64()), h);
    /// ```
    pub fn from_raw(id: u64) -> Self {
        Handle(id)
    }

    /// Get the raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed reference to a transactable object
///
/// `TxRef<T>` is a [`Handle`] tagged with the live type it materializes to.
/// It is `Copy`, `Send` and `Sync` regardless of `T`: it only names the
/// object, it never owns it. Objects reference their children through
/// `TxRef`s, and a transaction resolves them on demand.
///
/// # Examples
///
/// ```
/// use strata_core::types::TxRef;
///
/// struct Account;
///
/// let r: TxRef<Account> = TxRef::new();
/// let copy = r;
/// assert_eq!(r, copy);
/// ```
pub struct TxRef<T> {
    handle: Handle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TxRef<T> {
    /// Allocate a reference with a fresh handle
    pub fn new() -> Self {
        Self::from_handle(Handle::new())
    }

    /// Wrap an existing handle
    pub fn from_handle(handle: Handle) -> Self {
        TxRef {
            handle,
            _marker: PhantomData,
        }
    }

    /// The untyped handle
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl<T> Default for TxRef<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TxRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TxRef<T> {}

impl<T> PartialEq for TxRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<T> Eq for TxRef<T> {}

impl<T> Hash for TxRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl<T> fmt::Debug for TxRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TxRef").field(&self.handle).finish()
    }
}

impl<T> From<TxRef<T>> for Handle {
    fn from(r: TxRef<T>) -> Handle {
        r.handle
    }
}
