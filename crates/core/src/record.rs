//! Dematerialized records
//!
//! A [`DematerializedRecord`] is the immutable, flattened revision of one
//! object at one commit version. Records are created during commit from a
//! [`PendingRecord`] and never change afterwards; every heap snapshot that
//! does not overwrite the handle shares the same `Arc`'d record.

use crate::error::{Error, Result};
use crate::fields::Fields;
use crate::traits::{materializer_of, Materialized, Materializer, Transactable, TypeTag};
use crate::types::{Handle, Version};
use crate::value::FieldValue;
use std::fmt;
use std::sync::Arc;

/// Immutable revision of an object at a commit version
#[derive(Clone)]
pub struct DematerializedRecord {
    handle: Handle,
    version: Version,
    type_tag: TypeTag,
    materializer: Materializer,
    fields: Arc<[FieldValue]>,
}

impl DematerializedRecord {
    /// Object identity
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Commit version that produced this revision
    pub fn version(&self) -> Version {
        self.version
    }

    /// Stored type
    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    /// Rebuild function for the stored type
    pub fn materializer(&self) -> Materializer {
        self.materializer
    }

    /// Flattened field values
    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// Rebuild a live object of the stored type
    pub fn rematerialize(&self) -> Result<Box<dyn Materialized>> {
        (self.materializer)(&self.fields)
    }

    /// Rebuild a live object, checking that it is a `T`
    pub fn rematerialize_as<T: Transactable>(&self) -> Result<T> {
        if !self.type_tag.is::<T>() {
            return Err(Error::WrongType {
                expected: std::any::type_name::<T>(),
                actual: self.type_tag.name(),
            });
        }
        let mut reader = crate::fields::FieldReader::new(&self.fields);
        T::rematerialize(&mut reader)
    }

    /// Check whether `fields` equal this record's fields (dirty check)
    pub fn same_fields(&self, fields: &Fields) -> bool {
        *self.fields == *fields.as_slice()
    }

    /// Handles of all children referenced by this revision
    pub fn child_handles(&self) -> Vec<Handle> {
        let mut out = Vec::new();
        for field in self.fields.iter() {
            field.visit_refs(&mut |h| out.push(h));
        }
        out
    }
}

impl fmt::Debug for DematerializedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DematerializedRecord")
            .field("handle", &self.handle)
            .field("version", &self.version)
            .field("type", &self.type_tag)
            .field("fields", &self.fields)
            .finish()
    }
}

/// A write-set entry awaiting a commit version
pub struct PendingRecord {
    handle: Handle,
    type_tag: TypeTag,
    materializer: Materializer,
    fields: Fields,
}

impl PendingRecord {
    /// Dematerialize a typed object
    pub fn new<T: Transactable>(handle: Handle, object: &T) -> Self {
        PendingRecord {
            handle,
            type_tag: TypeTag::of::<T>(),
            materializer: materializer_of::<T>(),
            fields: object.dematerialize(),
        }
    }

    /// Build from already dematerialized parts
    pub fn from_parts(
        handle: Handle,
        type_tag: TypeTag,
        materializer: Materializer,
        fields: Fields,
    ) -> Self {
        PendingRecord {
            handle,
            type_tag,
            materializer,
            fields,
        }
    }

    /// Object identity
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Pending field values
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Stamp with a commit version
    ///
    /// Takes `&self` because a commit attempt that loses the CAS race rebuilds
    /// its records for the next version.
    pub fn to_record(&self, version: Version) -> Arc<DematerializedRecord> {
        Arc::new(DematerializedRecord {
            handle: self.handle,
            version,
            type_tag: self.type_tag,
            materializer: self.materializer,
            fields: Arc::from(self.fields.as_slice()),
        })
    }
}

impl fmt::Debug for PendingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRecord")
            .field("handle", &self.handle)
            .field("type", &self.type_tag)
            .field("fields", &self.fields)
            .finish()
    }
}
