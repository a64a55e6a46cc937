//! The transactable-object contract
//!
//! The heap never stores live objects. A type takes part in transactions by
//! implementing [`Transactable`]: it must be able to flatten itself into
//! [`Fields`] and rebuild itself from them. Child objects are referenced by
//! [`TxRef`](crate::types::TxRef), never embedded.
//!
//! [`Materialized`] is the object-safe face of the same contract. A
//! transaction's read/write set holds `Box<dyn Materialized>` so that one map
//! can cache objects of many types, and a stored record rebuilds its object
//! through a [`Materializer`] function pointer without knowing the type
//! statically.

use crate::error::{Error, Result};
use crate::fields::{FieldReader, Fields};
use crate::types::Handle;
use crate::value::FieldValue;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Runtime identity of a transactable type
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for `T`
    pub fn of<T: 'static>() -> Self {
        TypeTag {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Full type name, for error messages
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check if this tag names `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type whose instances can be stored in the transactional heap
///
/// `dematerialize` must be a pure function of the object's field state: two
/// calls on an unchanged object must yield equal [`Fields`]. Commit relies on
/// this to skip objects that were opened for writing but not changed.
///
/// # Example
///
/// ```
/// use strata_core::{FieldReader, Fields, Result, Transactable};
///
/// struct Counter {
///     value: i64,
/// }
///
/// impl Transactable for Counter {
///     fn dematerialize(&self) -> Fields {
///         Fields::new().int(self.value)
///     }
///
///     fn rematerialize(reader: &mut FieldReader<'_>) -> Result<Self> {
///         Ok(Counter { value: reader.next_int()? })
///     }
/// }
/// ```
pub trait Transactable: Sized + 'static {
    /// Flatten into field values; children become handle references
    fn dematerialize(&self) -> Fields;

    /// Rebuild from fields previously produced by `dematerialize`
    fn rematerialize(reader: &mut FieldReader<'_>) -> Result<Self>;

    /// Visit the handle of every directly referenced child
    ///
    /// The default walks the references in `dematerialize`'s output.
    fn for_each_child(&self, visit: &mut dyn FnMut(Handle)) {
        for handle in self.dematerialize().handles() {
            visit(handle);
        }
    }
}

/// Type-erased view of a live transactable object
pub trait Materialized: Any {
    /// [`Transactable::dematerialize`] through a trait object
    fn dematerialize_erased(&self) -> Fields;

    /// [`Transactable::for_each_child`] through a trait object
    fn for_each_child_erased(&self, visit: &mut dyn FnMut(Handle));

    /// Concrete type of the object
    fn type_tag(&self) -> TypeTag;

    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Transactable> Materialized for T {
    fn dematerialize_erased(&self) -> Fields {
        self.dematerialize()
    }

    fn for_each_child_erased(&self, visit: &mut dyn FnMut(Handle)) {
        self.for_each_child(visit)
    }

    fn type_tag(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Rebuilds a live object from stored fields without static type knowledge
pub type Materializer = fn(&[FieldValue]) -> Result<Box<dyn Materialized>>;

/// The [`Materializer`] for `T`
pub fn materializer_of<T: Transactable>() -> Materializer {
    materialize::<T>
}

fn materialize<T: Transactable>(fields: &[FieldValue]) -> Result<Box<dyn Materialized>> {
    let mut reader = FieldReader::new(fields);
    let value = T::rematerialize(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(Error::Serialization(format!(
            "{} left {} unread fields",
            std::any::type_name::<T>(),
            reader.remaining()
        )));
    }
    Ok(Box::new(value))
}

/// Downcast a materialized object to `T`
pub fn downcast_ref<T: Transactable>(object: &dyn Materialized) -> Result<&T> {
    let actual = object.type_tag().name();
    object.as_any().downcast_ref::<T>().ok_or(Error::WrongType {
        expected: std::any::type_name::<T>(),
        actual,
    })
}

/// Mutably downcast a materialized object to `T`
pub fn downcast_mut<T: Transactable>(object: &mut dyn Materialized) -> Result<&mut T> {
    let actual = object.type_tag().name();
    object.as_any_mut().downcast_mut::<T>().ok_or(Error::WrongType {
        expected: std::any::type_name::<T>(),
        actual,
    })
}
