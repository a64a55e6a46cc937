//! Field values for dematerialized records
//!
//! A dematerialized record is a flat list of [`FieldValue`]s. Each field is
//! either an inline value or a [`Handle`] reference to another transactable
//! object. Child objects are never embedded; they are referenced by identity
//! so that unchanged children are shared across versions.
//!
//! ## Equality Rules
//!
//! Equality is used for dirty-checking, so it must be reflexive:
//! - Different variants are NEVER equal (no type coercion)
//! - `Float` compares by bit pattern: `NaN == NaN` (same bits), `-0.0 != 0.0`
//!
//! Two dematerializations of an unchanged object therefore always compare equal.

use crate::types::Handle;
use serde::{Deserialize, Serialize};

/// One flattened field of a dematerialized object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    /// Absent value (also used for an empty reference)
    Null,

    /// Boolean true or false
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit IEEE-754 floating point
    Float(f64),

    /// UTF-8 encoded string
    String(String),

    /// Arbitrary binary data
    Bytes(Vec<u8>),

    /// Reference to another transactable object
    Ref(Handle),

    /// Ordered sequence of values
    Array(Vec<FieldValue>),
}

impl FieldValue {
    /// Returns the variant name (for error messages)
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "Null",
            FieldValue::Bool(_) => "Bool",
            FieldValue::Int(_) => "Int",
            FieldValue::Float(_) => "Float",
            FieldValue::String(_) => "String",
            FieldValue::Bytes(_) => "Bytes",
            FieldValue::Ref(_) => "Ref",
            FieldValue::Array(_) => "Array",
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes slice
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as a reference
    pub fn as_ref_handle(&self) -> Option<Handle> {
        match self {
            FieldValue::Ref(h) => Some(*h),
            _ => None,
        }
    }

    /// Try to get as array slice
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Visit every handle referenced by this value, including nested arrays
    pub fn visit_refs(&self, visit: &mut dyn FnMut(Handle)) {
        match self {
            FieldValue::Ref(h) => visit(*h),
            FieldValue::Array(items) => {
                for item in items {
                    item.visit_refs(visit);
                }
            }
            _ => {}
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::String(a), FieldValue::String(b)) => a == b,
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => a == b,
            (FieldValue::Ref(a), FieldValue::Ref(b)) => a == b,
            (FieldValue::Array(a), FieldValue::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Bytes(b)
    }
}

impl From<Handle> for FieldValue {
    fn from(h: Handle) -> Self {
        FieldValue::Ref(h)
    }
}
