//! Transaction-local object cache entries
//!
//! A [`Tranlocal`] is what a transaction keeps for one handle: the live object
//! (once materialized), the record it was loaded from and a
//! [`DirtinessStatus`]. Entries with an origin record are read dependencies;
//! entries without one were attached by this transaction.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use strata_core::{
    downcast_mut, downcast_ref, DematerializedRecord, Error, Fields, Handle, Materialized,
    Materializer, PendingRecord, Result, Transactable,
};

/// Write-set classification of a tranlocal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirtinessStatus {
    /// Attached by this transaction, never committed
    Fresh,
    /// Loaded and not opened for writing
    Clean,
    /// Opened for writing
    Dirty,
    /// Already persisted by this transaction's commit
    Committed,
    /// Known to be stale: a newer revision beat this transaction's commit
    Conflict,
}

impl DirtinessStatus {
    /// Check if this status puts the entry in the write set
    pub fn is_write_candidate(&self) -> bool {
        match self {
            DirtinessStatus::Fresh | DirtinessStatus::Dirty => true,
            DirtinessStatus::Clean | DirtinessStatus::Committed | DirtinessStatus::Conflict => {
                false
            }
        }
    }
}

/// One handle's transaction-local state
pub struct Tranlocal {
    handle: Handle,
    object: Option<Box<dyn Materialized>>,
    origin: Option<Arc<DematerializedRecord>>,
    materializer: Materializer,
    status: DirtinessStatus,
}

impl Tranlocal {
    /// Entry for an object attached by this transaction
    pub fn fresh<T: Transactable>(handle: Handle, value: T) -> Self {
        Tranlocal {
            handle,
            object: Some(Box::new(value)),
            origin: None,
            materializer: strata_core::materializer_of::<T>(),
            status: DirtinessStatus::Fresh,
        }
    }

    /// Read dependency whose object is built on first access
    pub fn deferred(record: Arc<DematerializedRecord>) -> Self {
        Tranlocal {
            handle: record.handle(),
            object: None,
            materializer: record.materializer(),
            origin: Some(record),
            status: DirtinessStatus::Clean,
        }
    }

    /// Object identity
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Current status
    pub fn status(&self) -> DirtinessStatus {
        self.status
    }

    /// Record this entry was loaded from
    pub fn origin(&self) -> Option<&Arc<DematerializedRecord>> {
        self.origin.as_ref()
    }

    /// Check if this entry was loaded from the heap
    pub fn is_read_dependency(&self) -> bool {
        self.origin.is_some()
    }

    /// Check if the live object has been built
    pub fn is_materialized(&self) -> bool {
        self.object.is_some()
    }

    /// Build the live object from the origin record if not done yet
    pub fn materialize(&mut self) -> Result<&dyn Materialized> {
        if self.object.is_none() {
            let origin = self.origin.as_ref().ok_or_else(|| {
                Error::Internal(format!("tranlocal {} has neither object nor origin", self.handle))
            })?;
            self.object = Some(origin.rematerialize()?);
        }
        self.object()
    }

    /// The live object; fails if not materialized
    pub fn object(&self) -> Result<&dyn Materialized> {
        self.object
            .as_deref()
            .ok_or_else(|| Error::Internal(format!("tranlocal {} is not materialized", self.handle)))
    }

    /// The live object as `T`
    pub fn get<T: Transactable>(&self) -> Result<&T> {
        downcast_ref::<T>(self.object()?)
    }

    /// The live object as `T`, moving the entry into the write set
    pub fn get_mut<T: Transactable>(&mut self) -> Result<&mut T> {
        let object = self.object.as_deref_mut().ok_or_else(|| {
            Error::Internal(format!("tranlocal {} is not materialized", self.handle))
        })?;
        let typed = downcast_mut::<T>(object)?;
        if matches!(self.status, DirtinessStatus::Clean | DirtinessStatus::Committed) {
            self.status = DirtinessStatus::Dirty;
        }
        Ok(typed)
    }

    /// Replace the object of a fresh entry
    pub(crate) fn replace_fresh<T: Transactable>(&mut self, value: T) -> Result<()> {
        if self.status != DirtinessStatus::Fresh {
            return Err(Error::InvalidOperation(format!(
                "object {} was loaded from the heap and cannot be attached",
                self.handle
            )));
        }
        self.object = Some(Box::new(value));
        self.materializer = strata_core::materializer_of::<T>();
        Ok(())
    }

    /// Dematerialize the live object
    pub fn dematerialize(&self) -> Result<Fields> {
        match &self.object {
            Some(object) => Ok(object.dematerialize_erased()),
            None => self
                .origin
                .as_ref()
                .map(|origin| Fields::from(origin.fields().to_vec()))
                .ok_or_else(|| {
                    Error::Internal(format!("tranlocal {} has neither object nor origin", self.handle))
                }),
        }
    }

    /// Pending record if this entry must be written
    ///
    /// A dirty entry whose fields still equal its origin is downgraded to
    /// [`DirtinessStatus::Clean`] and produces nothing.
    pub fn prepare_write(&mut self) -> Result<Option<PendingRecord>> {
        if !self.status.is_write_candidate() {
            return Ok(None);
        }
        let object = self.object()?;
        let fields = object.dematerialize_erased();
        let type_tag = object.type_tag();

        if self.status == DirtinessStatus::Dirty {
            if let Some(origin) = &self.origin {
                if origin.type_tag() == type_tag && origin.same_fields(&fields) {
                    self.status = DirtinessStatus::Clean;
                    return Ok(None);
                }
            }
        }
        Ok(Some(PendingRecord::from_parts(
            self.handle,
            type_tag,
            self.materializer,
            fields,
        )))
    }

    pub(crate) fn set_status(&mut self, status: DirtinessStatus) {
        self.status = status;
    }

    /// Capture enough state to rebuild this entry later
    pub(crate) fn save(&self) -> Result<SavedEntry> {
        let state = match self.status {
            DirtinessStatus::Fresh | DirtinessStatus::Dirty => {
                Some(self.object()?.dematerialize_erased())
            }
            // unchanged since loading, the origin is enough
            _ => None,
        };
        Ok(SavedEntry {
            origin: self.origin.clone(),
            materializer: self.materializer,
            status: self.status,
            state,
        })
    }

    /// Rebuild an entry captured by [`Tranlocal::save`]
    pub(crate) fn restore(handle: Handle, saved: SavedEntry) -> Result<Self> {
        let object = match &saved.state {
            Some(fields) => Some((saved.materializer)(fields.as_slice())?),
            None => None,
        };
        if object.is_none() && saved.origin.is_none() {
            return Err(Error::Internal(format!(
                "saved tranlocal {} has neither state nor origin",
                handle
            )));
        }
        Ok(Tranlocal {
            handle,
            object,
            origin: saved.origin,
            materializer: saved.materializer,
            status: saved.status,
        })
    }
}

impl std::fmt::Debug for Tranlocal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tranlocal")
            .field("handle", &self.handle)
            .field("status", &self.status)
            .field("materialized", &self.object.is_some())
            .field("origin", &self.origin.as_ref().map(|o| o.version()))
            .finish()
    }
}

/// A tranlocal frozen by [`OrElseFrame`]
#[derive(Debug)]
pub(crate) struct SavedEntry {
    origin: Option<Arc<DematerializedRecord>>,
    materializer: Materializer,
    status: DirtinessStatus,
    state: Option<Fields>,
}

/// Saved read/write set for one `or_else` branch
#[derive(Debug, Default)]
pub struct OrElseFrame {
    entries: FxHashMap<Handle, SavedEntry>,
}

impl OrElseFrame {
    /// Freeze the current read/write set
    pub fn capture(tranlocals: &FxHashMap<Handle, Tranlocal>) -> Result<Self> {
        let mut entries = FxHashMap::with_capacity_and_hasher(tranlocals.len(), Default::default());
        for (&handle, tranlocal) in tranlocals {
            entries.insert(handle, tranlocal.save()?);
        }
        Ok(OrElseFrame { entries })
    }

    /// Roll the read/write set back to this frame
    ///
    /// Objects attached since the frame are dropped. Objects first read since
    /// the frame stay as unmaterialized read dependencies so that a later
    /// retry still waits on them.
    pub fn restore(self, tranlocals: &mut FxHashMap<Handle, Tranlocal>) -> Result<()> {
        let mut restored = FxHashMap::with_capacity_and_hasher(tranlocals.len(), Default::default());
        for (handle, tranlocal) in tranlocals.drain() {
            if self.entries.contains_key(&handle) {
                continue;
            }
            if let Some(origin) = tranlocal.origin {
                restored.insert(handle, Tranlocal::deferred(origin));
            }
        }
        for (handle, saved) in self.entries {
            restored.insert(handle, Tranlocal::restore(handle, saved)?);
        }
        *tranlocals = restored;
        Ok(())
    }

    /// Number of saved entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was saved
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
