//! Building and decoding flattened field lists
//!
//! [`Fields`] is the builder a [`Transactable`](crate::traits::Transactable)
//! type fills in `dematerialize`; [`FieldReader`] is the cursor it consumes in
//! `rematerialize`. Fields are positional: the reader must take them back in
//! the order the builder pushed them.

use crate::error::{Error, Result};
use crate::types::{Handle, TxRef};
use crate::value::FieldValue;
use std::sync::Arc;

/// Ordered list of field values produced by dematerialization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<FieldValue>);

impl Fields {
    /// Create an empty field list
    pub fn new() -> Self {
        Fields(Vec::new())
    }

    /// Create an empty field list with room for `capacity` fields
    pub fn with_capacity(capacity: usize) -> Self {
        Fields(Vec::with_capacity(capacity))
    }

    /// Append any value
    pub fn value(mut self, value: impl Into<FieldValue>) -> Self {
        self.0.push(value.into());
        self
    }

    /// Append a null
    pub fn null(self) -> Self {
        self.value(FieldValue::Null)
    }

    /// Append a bool
    pub fn bool(self, b: bool) -> Self {
        self.value(FieldValue::Bool(b))
    }

    /// Append an integer
    pub fn int(self, i: i64) -> Self {
        self.value(FieldValue::Int(i))
    }

    /// Append a float
    pub fn float(self, f: f64) -> Self {
        self.value(FieldValue::Float(f))
    }

    /// Append a string
    pub fn string(self, s: impl Into<String>) -> Self {
        self.value(FieldValue::String(s.into()))
    }

    /// Append raw bytes
    pub fn bytes(self, b: impl Into<Vec<u8>>) -> Self {
        self.value(FieldValue::Bytes(b.into()))
    }

    /// Append a reference to a child object
    pub fn reference<T>(self, r: &TxRef<T>) -> Self {
        self.value(FieldValue::Ref(r.handle()))
    }

    /// Append an optional child reference (`None` is stored as null)
    pub fn opt_reference<T>(self, r: Option<&TxRef<T>>) -> Self {
        match r {
            Some(r) => self.reference(r),
            None => self.null(),
        }
    }

    /// Append a list of child references
    pub fn references<'a, T: 'a>(self, refs: impl IntoIterator<Item = &'a TxRef<T>>) -> Self {
        let items = refs
            .into_iter()
            .map(|r| FieldValue::Ref(r.handle()))
            .collect();
        self.value(FieldValue::Array(items))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the fields
    pub fn as_slice(&self) -> &[FieldValue] {
        &self.0
    }

    /// Every handle referenced by these fields, in field order
    pub fn handles(&self) -> Vec<Handle> {
        let mut out = Vec::new();
        for field in &self.0 {
            field.visit_refs(&mut |h| out.push(h));
        }
        out
    }

    /// Freeze into the shared representation stored by records
    pub fn into_shared(self) -> Arc<[FieldValue]> {
        Arc::from(self.0)
    }
}

impl From<Vec<FieldValue>> for Fields {
    fn from(values: Vec<FieldValue>) -> Self {
        Fields(values)
    }
}

impl FromIterator<FieldValue> for Fields {
    fn from_iter<I: IntoIterator<Item = FieldValue>>(iter: I) -> Self {
        Fields(iter.into_iter().collect())
    }
}

/// Sequential cursor over a record's fields
#[derive(Debug)]
pub struct FieldReader<'a> {
    fields: &'a [FieldValue],
    position: usize,
}

impl<'a> FieldReader<'a> {
    /// Start reading at the first field
    pub fn new(fields: &'a [FieldValue]) -> Self {
        FieldReader {
            fields,
            position: 0,
        }
    }

    /// Fields not yet consumed
    pub fn remaining(&self) -> usize {
        self.fields.len() - self.position
    }

    /// Take the next raw value
    pub fn next_value(&mut self) -> Result<&'a FieldValue> {
        let value = self.fields.get(self.position).ok_or_else(|| {
            Error::Serialization(format!(
                "field {} requested but record has {} fields",
                self.position,
                self.fields.len()
            ))
        })?;
        self.position += 1;
        Ok(value)
    }

    fn mismatch(&self, expected: &str, found: &FieldValue) -> Error {
        Error::Serialization(format!(
            "field {}: expected {}, found {}",
            self.position - 1,
            expected,
            found.type_name()
        ))
    }

    /// Take the next field as a bool
    pub fn next_bool(&mut self) -> Result<bool> {
        let value = self.next_value()?;
        value.as_bool().ok_or_else(|| self.mismatch("Bool", value))
    }

    /// Take the next field as an integer
    pub fn next_int(&mut self) -> Result<i64> {
        let value = self.next_value()?;
        value.as_int().ok_or_else(|| self.mismatch("Int", value))
    }

    /// Take the next field as a float
    pub fn next_float(&mut self) -> Result<f64> {
        let value = self.next_value()?;
        value.as_float().ok_or_else(|| self.mismatch("Float", value))
    }

    /// Take the next field as a borrowed string
    pub fn next_str(&mut self) -> Result<&'a str> {
        let value = self.next_value()?;
        value.as_str().ok_or_else(|| self.mismatch("String", value))
    }

    /// Take the next field as an owned string
    pub fn next_string(&mut self) -> Result<String> {
        self.next_str().map(str::to_string)
    }

    /// Take the next field as bytes
    pub fn next_bytes(&mut self) -> Result<Vec<u8>> {
        let value = self.next_value()?;
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| self.mismatch("Bytes", value))
    }

    /// Take the next field as a child reference
    pub fn next_ref<T>(&mut self) -> Result<TxRef<T>> {
        let value = self.next_value()?;
        value
            .as_ref_handle()
            .map(TxRef::from_handle)
            .ok_or_else(|| self.mismatch("Ref", value))
    }

    /// Take the next field as an optional child reference
    pub fn next_opt_ref<T>(&mut self) -> Result<Option<TxRef<T>>> {
        let value = self.next_value()?;
        match value {
            FieldValue::Null => Ok(None),
            FieldValue::Ref(h) => Ok(Some(TxRef::from_handle(*h))),
            other => Err(self.mismatch("Ref or Null", other)),
        }
    }

    /// Take the next field as a list of child references
    pub fn next_refs<T>(&mut self) -> Result<Vec<TxRef<T>>> {
        let value = self.next_value()?;
        let items = value
            .as_array()
            .ok_or_else(|| self.mismatch("Array", value))?;
        items
            .iter()
            .map(|item| {
                item.as_ref_handle()
                    .map(TxRef::from_handle)
                    .ok_or_else(|| self.mismatch("Ref", item))
            })
            .collect()
    }
}
