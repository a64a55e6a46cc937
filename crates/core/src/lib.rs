//! Core types for the strata transactional heap
//!
//! This crate defines the object model shared by every layer:
//! - Handle / TxRef: stable object identity
//! - FieldValue / Fields / FieldReader: flattened object state
//! - DematerializedRecord: immutable revision at a commit version
//! - Transactable / Materialized: the contract live objects implement
//! - Error: the canonical error type

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod fields;
pub mod record;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use fields::{FieldReader, Fields};
pub use record::{DematerializedRecord, PendingRecord};
pub use traits::{
    downcast_mut, downcast_ref, materializer_of, Materialized, Materializer, Transactable, TypeTag,
};
pub use types::{Handle, TxRef, TxnId, Version};
pub use value::FieldValue;
