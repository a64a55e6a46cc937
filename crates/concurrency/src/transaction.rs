//! Transaction state machine
//!
//! A [`Transaction`] reads from one immutable heap snapshot (its start
//! version) and buffers every change in a private read/write set of
//! [`Tranlocal`]s. Nothing is visible to other transactions until
//! [`Transaction::commit`] publishes the write set as a new heap version.
//!
//! ## States
//!
//! ```text
//! Active --commit--> Committed
//!   |  \
//!   |   `--abort / failed commit--> Aborted
//!   `--abort_and_retry--> (blocks) --> Active on a fresh snapshot
//! ```
//!
//! After `Committed` or `Aborted` every operation fails with
//! [`Error::DeadTransaction`], except `commit` on a committed transaction and
//! `abort` on an aborted one, which are no-ops.
//!
//! Transactions are confined to the thread that created them.

use crate::latch::Latch;
use crate::manager::TransactionManager;
use crate::tranlocal::{DirtinessStatus, OrElseFrame, Tranlocal};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use strata_core::{Error, Handle, PendingRecord, Result, Transactable, TxRef, TxnId, Version};
use strata_storage::HeapSnapshot;
use tracing::{debug, trace};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and writes
    Active,
    /// Committed; `version` is what commit returned
    Committed {
        /// Commit version
        version: Version,
    },
    /// Aborted explicitly or by a failed commit
    Aborted {
        /// Why the transaction ended
        reason: String,
    },
}

impl TransactionStatus {
    fn name(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Committed { .. } => "committed",
            TransactionStatus::Aborted { .. } => "aborted",
        }
    }
}

/// How [`Transaction::load`] brings an object in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Materialize the object and everything reachable from it now
    #[default]
    Eager,
    /// Track the read, materialize on first access
    Lazy,
    /// Return a private copy that is neither tracked nor committed
    Unmanaged,
}

/// Result of [`Transaction::load`]
#[derive(Debug)]
pub enum Loaded<T> {
    /// Materialized and tracked in the read set
    Tracked(TxRef<T>),
    /// Tracked in the read set, not yet materialized
    Deferred(TxRef<T>),
    /// Untracked copy; writes to it are never committed
    Detached(T),
}

impl<T: Transactable> Loaded<T> {
    /// Borrow the object, materializing a deferred one
    pub fn get<'a>(&'a self, txn: &'a mut Transaction) -> Result<&'a T> {
        match self {
            Loaded::Tracked(r) | Loaded::Deferred(r) => txn.read(r),
            Loaded::Detached(value) => Ok(value),
        }
    }

    /// Check if the object is part of the transaction's read set
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Loaded::Detached(_))
    }

    /// Take the detached copy
    pub fn into_detached(self) -> Option<T> {
        match self {
            Loaded::Detached(value) => Some(value),
            _ => None,
        }
    }
}

/// One transaction over the heap
pub struct Transaction {
    id: TxnId,
    manager: Arc<TransactionManager>,
    snapshot: Arc<HeapSnapshot>,
    tranlocals: FxHashMap<Handle, Tranlocal>,
    or_else_stack: Vec<OrElseFrame>,
    outcome: FxHashMap<Handle, DirtinessStatus>,
    status: TransactionStatus,
    live_version: Option<Version>,
}

impl Transaction {
    pub(crate) fn new(
        manager: Arc<TransactionManager>,
        id: TxnId,
        snapshot: Arc<HeapSnapshot>,
    ) -> Self {
        let version = snapshot.version();
        manager.liveness().register(version);
        manager.stats().record_start();
        manager.observer().on_begin(id, version);
        trace!(txn_id = id, version, "Transaction started");
        Transaction {
            id,
            manager,
            snapshot,
            tranlocals: FxHashMap::default(),
            or_else_stack: Vec::new(),
            outcome: FxHashMap::default(),
            status: TransactionStatus::Active,
            live_version: Some(version),
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Transaction identity
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Current state
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Check if still accepting operations
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Version of the snapshot this transaction reads
    pub fn start_version(&self) -> Version {
        self.snapshot.version()
    }

    /// Version returned by a successful commit
    pub fn commit_version(&self) -> Option<Version> {
        match self.status {
            TransactionStatus::Committed { version } => Some(version),
            _ => None,
        }
    }

    /// Handles loaded from the heap, ascending
    pub fn read_set(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self
            .tranlocals
            .values()
            .filter(|t| t.is_read_dependency())
            .map(Tranlocal::handle)
            .collect();
        handles.sort_unstable();
        handles
    }

    /// Number of entries that are fresh or opened for writing
    pub fn write_set_len(&self) -> usize {
        self.tranlocals
            .values()
            .filter(|t| t.status().is_write_candidate())
            .count()
    }

    /// Status of the entry for `handle`, if tracked
    ///
    /// After commit or abort this is the entry's final status.
    pub fn status_of(&self, handle: Handle) -> Option<DirtinessStatus> {
        self.tranlocals
            .get(&handle)
            .map(Tranlocal::status)
            .or_else(|| self.outcome.get(&handle).copied())
    }

    /// Check if `handle` has a materialized entry
    pub fn is_materialized(&self, handle: Handle) -> bool {
        self.tranlocals
            .get(&handle)
            .map_or(false, Tranlocal::is_materialized)
    }

    /// Depth of open `or_else` branches
    pub fn or_else_depth(&self) -> usize {
        self.or_else_stack.len()
    }

    fn ensure_active(&self) -> Result<()> {
        match self.status {
            TransactionStatus::Active => Ok(()),
            ref other => Err(Error::DeadTransaction {
                txn_id: self.id,
                state: other.name(),
            }),
        }
    }

    // ========================================================================
    // Attach
    // ========================================================================

    /// Add a new object under a fresh handle
    pub fn attach<T: Transactable>(&mut self, value: T) -> Result<TxRef<T>> {
        let r = TxRef::new();
        self.attach_to(&r, value)?;
        Ok(r)
    }

    /// Add a new object under a handle created outside the transaction
    ///
    /// Attaching to the same handle again replaces the pending object. Fails
    /// with [`Error::InvalidOperation`] if the handle is already committed.
    pub fn attach_to<T: Transactable>(&mut self, r: &TxRef<T>, value: T) -> Result<()> {
        self.ensure_active()?;
        let handle = r.handle();
        match self.tranlocals.entry(handle) {
            Entry::Occupied(mut entry) => entry.get_mut().replace_fresh(value),
            Entry::Vacant(entry) => {
                if self.snapshot.contains(handle) {
                    return Err(Error::InvalidOperation(format!(
                        "object {} is already committed",
                        handle
                    )));
                }
                entry.insert(Tranlocal::fresh(handle, value));
                Ok(())
            }
        }
    }

    // ========================================================================
    // Read / Write
    // ========================================================================

    /// Get the entry for `handle`, loading it from the start snapshot
    fn entry(&mut self, handle: Handle) -> Result<&mut Tranlocal> {
        match self.tranlocals.entry(handle) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let record = self
                    .snapshot
                    .read(handle)
                    .ok_or(Error::LoadUncommitted(handle))?;
                Ok(entry.insert(Tranlocal::deferred(record)))
            }
        }
    }

    fn open(&mut self, handle: Handle) -> Result<&mut Tranlocal> {
        let tranlocal = self.entry(handle)?;
        tranlocal.materialize()?;
        Ok(tranlocal)
    }

    /// Borrow the object behind `r`
    ///
    /// Repeated reads return the same cached object, including this
    /// transaction's own uncommitted changes.
    pub fn read<T: Transactable>(&mut self, r: &TxRef<T>) -> Result<&T> {
        self.ensure_active()?;
        self.open(r.handle())?.get::<T>()
    }

    /// Mutably borrow the object behind `r`, adding it to the write set
    pub fn write<T: Transactable>(&mut self, r: &TxRef<T>) -> Result<&mut T> {
        self.ensure_active()?;
        self.open(r.handle())?.get_mut::<T>()
    }

    /// Bring `r` in under an explicit [`ReadPolicy`]
    pub fn load<T: Transactable>(&mut self, r: &TxRef<T>, policy: ReadPolicy) -> Result<Loaded<T>> {
        self.ensure_active()?;
        match policy {
            ReadPolicy::Eager => {
                self.load_graph(r.handle())?;
                self.tranlocals
                    .get(&r.handle())
                    .ok_or_else(|| Error::Internal(format!("{} vanished after loading", r.handle())))?
                    .get::<T>()?;
                Ok(Loaded::Tracked(*r))
            }
            ReadPolicy::Lazy => {
                let tranlocal = self.entry(r.handle())?;
                if let Some(origin) = tranlocal.origin() {
                    if !origin.type_tag().is::<T>() {
                        return Err(Error::WrongType {
                            expected: std::any::type_name::<T>(),
                            actual: origin.type_tag().name(),
                        });
                    }
                }
                Ok(Loaded::Deferred(*r))
            }
            ReadPolicy::Unmanaged => {
                let copy = match self.tranlocals.get(&r.handle()) {
                    Some(tranlocal) => {
                        let fields = tranlocal.dematerialize()?;
                        let mut reader = strata_core::FieldReader::new(fields.as_slice());
                        T::rematerialize(&mut reader)?
                    }
                    None => self
                        .snapshot
                        .read(r.handle())
                        .ok_or(Error::LoadUncommitted(r.handle()))?
                        .rematerialize_as::<T>()?,
                };
                Ok(Loaded::Detached(copy))
            }
        }
    }

    /// Materialize `root` and every object reachable from it
    fn load_graph(&mut self, root: Handle) -> Result<()> {
        let mut pending: SmallVec<[Handle; 16]> = smallvec![root];
        let mut seen = FxHashSet::default();
        while let Some(handle) = pending.pop() {
            if !seen.insert(handle) {
                continue;
            }
            let object = self.open(handle)?.object()?;
            object.for_each_child_erased(&mut |child| {
                if !seen.contains(&child) {
                    pending.push(child);
                }
            });
        }
        Ok(())
    }

    // ========================================================================
    // Commit / Abort
    // ========================================================================

    /// Publish the write set
    ///
    /// Returns the new heap version, or the current one for a read-only
    /// transaction. Any failure aborts the transaction.
    pub fn commit(&mut self) -> Result<Version> {
        match self.status {
            TransactionStatus::Committed { version } => return Ok(version),
            TransactionStatus::Aborted { .. } => {
                return Err(Error::DeadTransaction {
                    txn_id: self.id,
                    state: "aborted",
                })
            }
            TransactionStatus::Active => {}
        }
        if !self.or_else_stack.is_empty() {
            return Err(Error::InvalidOperation(format!(
                "commit with {} open or-else branches",
                self.or_else_stack.len()
            )));
        }

        let writes = match self.collect_writes() {
            Ok(writes) => writes,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        match self.manager.commit(self.id, &self.snapshot, &writes) {
            Ok(version) => {
                for write in &writes {
                    if let Some(t) = self.tranlocals.get_mut(&write.handle()) {
                        t.set_status(DirtinessStatus::Committed);
                    }
                }
                self.finish(TransactionStatus::Committed { version });
                Ok(version)
            }
            Err(e) => {
                if let Error::WriteConflict { handle, .. } = e {
                    if let Some(t) = self.tranlocals.get_mut(&handle) {
                        t.set_status(DirtinessStatus::Conflict);
                    }
                }
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn collect_writes(&mut self) -> Result<Vec<PendingRecord>> {
        let mut writes = Vec::new();
        for tranlocal in self.tranlocals.values_mut() {
            if let Some(write) = tranlocal.prepare_write()? {
                writes.push(write);
            }
        }
        Ok(writes)
    }

    /// Abort; a no-op if already aborted
    pub fn abort(&mut self) -> Result<()> {
        match self.status {
            TransactionStatus::Aborted { .. } => Ok(()),
            TransactionStatus::Committed { .. } => Err(Error::DeadTransaction {
                txn_id: self.id,
                state: "committed",
            }),
            TransactionStatus::Active => {
                self.manager.stats().record_abort();
                self.manager.observer().on_abort(self.id, "aborted by caller");
                debug!(txn_id = self.id, "Transaction aborted");
                self.finish(TransactionStatus::Aborted {
                    reason: "aborted by caller".to_string(),
                });
                Ok(())
            }
        }
    }

    fn fail(&mut self, error: &Error) {
        let reason = error.to_string();
        self.manager.stats().record_abort();
        self.manager.observer().on_abort(self.id, &reason);
        debug!(txn_id = self.id, %reason, "Commit failed, transaction aborted");
        self.finish(TransactionStatus::Aborted { reason });
    }

    /// Terminal transition; only entry statuses outlive it
    fn finish(&mut self, status: TransactionStatus) {
        self.outcome = self
            .tranlocals
            .drain()
            .map(|(handle, tranlocal)| (handle, tranlocal.status()))
            .collect();
        self.or_else_stack.clear();
        self.release_liveness();
        self.status = status;
    }

    fn release_liveness(&mut self) {
        if let Some(version) = self.live_version.take() {
            self.manager.liveness().release(version);
        }
    }

    // ========================================================================
    // Retry
    // ========================================================================

    /// Block until something this transaction read is overwritten, then
    /// restart on the newest snapshot
    ///
    /// Fails with [`Error::NoProgressPossible`] (leaving the transaction
    /// active) when nothing has been read: no commit could ever wake it.
    pub fn abort_and_retry(&mut self) -> Result<()> {
        self.ensure_active()?;
        let reads = self.read_set();
        if reads.is_empty() {
            return Err(Error::NoProgressPossible(format!(
                "transaction {} retried without reading anything",
                self.id
            )));
        }

        let start = self.start_version();
        let latch = Arc::new(Latch::new());
        let filed = self.manager.listen(&reads, start, &latch)?;

        self.manager.stats().record_retry();
        self.manager.observer().on_retry(self.id, reads.len());
        debug!(txn_id = self.id, start, reads = reads.len(), "Blocking until a read dependency changes");

        self.tranlocals.clear();
        self.or_else_stack.clear();
        self.release_liveness();
        latch.wait();
        self.manager.unlisten(&filed, start, &latch);

        self.restart();
        Ok(())
    }

    fn restart(&mut self) {
        self.snapshot = self.manager.heap().head();
        let version = self.snapshot.version();
        self.manager.liveness().register(version);
        self.live_version = Some(version);
        self.manager.stats().record_start();
        self.manager.observer().on_begin(self.id, version);
        debug!(txn_id = self.id, version, "Transaction restarted after retry");
    }

    // ========================================================================
    // Or-else
    // ========================================================================

    /// Open an alternative branch, saving the current read/write set
    pub fn start_or(&mut self) -> Result<()> {
        self.ensure_active()?;
        let frame = OrElseFrame::capture(&self.tranlocals)?;
        self.or_else_stack.push(frame);
        Ok(())
    }

    /// Close the innermost branch, keeping its effects
    pub fn end_or(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.or_else_stack
            .pop()
            .map(|_| ())
            .ok_or_else(|| Error::InvalidOperation("end_or without start_or".to_string()))
    }

    /// Close the innermost branch, rolling its effects back
    ///
    /// Objects first read inside the branch remain read dependencies.
    pub fn end_or_else(&mut self) -> Result<()> {
        self.ensure_active()?;
        let frame = self
            .or_else_stack
            .pop()
            .ok_or_else(|| Error::InvalidOperation("end_or_else without start_or".to_string()))?;
        frame.restore(&mut self.tranlocals)
    }

    /// Run `first`; if it asks to retry, roll it back and run `second`
    ///
    /// A retry from `second` propagates, waiting on what both branches read.
    pub fn or_else<R, F, G>(&mut self, first: F, second: G) -> Result<R>
    where
        F: FnOnce(&mut Transaction) -> Result<R>,
        G: FnOnce(&mut Transaction) -> Result<R>,
    {
        self.start_or()?;
        match first(self) {
            Ok(value) => {
                self.end_or()?;
                Ok(value)
            }
            Err(Error::Retry) => {
                trace!(txn_id = self.id, "First branch retried, trying alternative");
                self.end_or_else()?;
                second(self)
            }
            Err(e) => {
                self.or_else_stack.pop();
                Err(e)
            }
        }
    }

    /// Manager this transaction belongs to
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            trace!(txn_id = self.id, "Active transaction dropped");
        }
        self.release_liveness();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("start_version", &self.snapshot.version())
            .field("tranlocals", &self.tranlocals.len())
            .field("or_else_depth", &self.or_else_stack.len())
            .finish()
    }
}
