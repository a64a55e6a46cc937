//! STM Comprehensive Test Suite
//!
//! End-to-end tests of the public `Stm` facade: transaction lifecycle,
//! write conflicts, blocking retry, or-else composition, snapshot isolation
//! and multi-threaded stress.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run everything
//! cargo test --test stm_comprehensive
//!
//! # Run retry tests only
//! cargo test --test stm_comprehensive retry::
//! ```

use stratastm::prelude::*;

// Test modules
pub mod concurrency;
pub mod conflicts;
pub mod or_else;
pub mod retry;
pub mod snapshot_isolation;
pub mod transaction_lifecycle;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Route `tracing` output through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// Fresh instance with tracing installed
pub fn create_stm() -> Stm {
    init_tracing();
    Stm::new()
}

/// Bank account fixture
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub owner: String,
    pub balance: i64,
}

impl Account {
    pub fn new(owner: &str, balance: i64) -> Self {
        Account {
            owner: owner.to_string(),
            balance,
        }
    }
}

impl Transactable for Account {
    fn dematerialize(&self) -> Fields {
        Fields::new().string(self.owner.as_str()).int(self.balance)
    }

    fn rematerialize(reader: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Account {
            owner: reader.next_string()?,
            balance: reader.next_int()?,
        })
    }
}

/// Singly linked list node fixture
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub value: i64,
    pub next: Option<TxRef<Node>>,
}

impl Transactable for Node {
    fn dematerialize(&self) -> Fields {
        Fields::new().int(self.value).opt_reference(self.next.as_ref())
    }

    fn rematerialize(reader: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Node {
            value: reader.next_int()?,
            next: reader.next_opt_ref()?,
        })
    }
}

/// Commit a list holding `values` in order, returning its head
pub fn create_list(stm: &Stm, values: &[i64]) -> Option<TxRef<Node>> {
    stm.atomically(|txn| {
        let mut next = None;
        for &value in values.iter().rev() {
            next = Some(txn.attach(Node { value, next })?);
        }
        Ok(next)
    })
    .unwrap()
}

/// Read every value reachable from `head`
pub fn list_values(txn: &mut Transaction, head: Option<TxRef<Node>>) -> Result<Vec<i64>> {
    let mut values = Vec::new();
    let mut cursor = head;
    while let Some(r) = cursor {
        let node = txn.read(&r)?;
        values.push(node.value);
        cursor = node.next;
    }
    Ok(values)
}
