//! Convenient imports for stratastm.
//!
//! ```
//! use stratastm::prelude::*;
//!
//! let stm = Stm::new();
//! assert_eq!(stm.current_version(), 0);
//! ```

// Main entry point
pub use crate::stm::{Stm, StmBuilder};

// Error handling
pub use crate::{Error, Result};

// Blocking combinators
pub use crate::{guard, retry, unwrap_or_retry};

// Object contract
pub use crate::{FieldReader, Fields, Transactable, TxRef};

// Transactions
pub use crate::{Loaded, ReadPolicy, Transaction, Version};
