//! Write Conflict Tests
//!
//! First committer wins; the loser aborts and `atomically` re-runs it.

use crate::*;
use parking_lot::Mutex;
use std::sync::Arc;
use stratastm::{LockPolicy, TransactionObserver, TxnId};

// =============================================================================
// DETECTION TESTS
// =============================================================================

#[test]
fn test_second_writer_of_same_object_conflicts() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("x", 0))).unwrap();

    let mut t1 = stm.begin();
    let mut t2 = stm.begin();
    t1.read(&r).unwrap();
    t2.read(&r).unwrap();
    t1.write(&r).unwrap().balance = 1;
    t2.write(&r).unwrap().balance = 2;

    assert_eq!(t1.commit().unwrap(), 2);
    let err = t2.commit().unwrap_err();
    assert!(matches!(err, Error::WriteConflict { handle, .. } if handle == r.handle()));
    assert!(err.is_retryable());

    assert_eq!(stm.current_version(), 2);
    assert_eq!(stm.read_at(&r, 2).unwrap().unwrap().balance, 1);
    assert_eq!(stm.statistics().write_conflicts, 1);
}

#[test]
fn test_disjoint_writers_both_commit() {
    let stm = create_stm();
    let (a, b) = stm
        .atomically(|txn| Ok((txn.attach(Account::new("a", 0))?, txn.attach(Account::new("b", 0))?)))
        .unwrap();

    let mut t1 = stm.begin();
    let mut t2 = stm.begin();
    t1.write(&a).unwrap().balance = 1;
    t2.write(&b).unwrap().balance = 2;

    assert_eq!(t1.commit().unwrap(), 2);
    assert_eq!(t2.commit().unwrap(), 3);

    let mut check = stm.begin();
    assert_eq!(check.read(&a).unwrap().balance, 1);
    assert_eq!(check.read(&b).unwrap().balance, 2);
}

#[test]
fn test_stale_read_without_write_does_not_conflict() {
    let stm = create_stm();
    let (a, b) = stm
        .atomically(|txn| Ok((txn.attach(Account::new("a", 0))?, txn.attach(Account::new("b", 0))?)))
        .unwrap();

    let mut t1 = stm.begin();
    t1.read(&a).unwrap();

    stm.atomically(|txn| {
        txn.write(&a)?.balance = 9;
        Ok(())
    })
    .unwrap();

    // only the write set is validated
    t1.write(&b).unwrap().balance = 1;
    assert_eq!(t1.commit().unwrap(), 3);
}

#[test]
fn test_unchanged_write_is_not_a_conflict() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 5))).unwrap();

    let mut t1 = stm.begin();
    let balance = t1.write(&r).unwrap().balance;
    t1.write(&r).unwrap().balance = balance;

    stm.atomically(|txn| {
        txn.write(&r)?.balance = 6;
        Ok(())
    })
    .unwrap();

    assert_eq!(t1.commit().unwrap(), 2);
}

// =============================================================================
// DRIVER TESTS
// =============================================================================

#[test]
fn test_atomically_reruns_after_conflict() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 0))).unwrap();
    let other = stm.clone();
    let mut runs = 0;

    stm.atomically(|txn| {
        runs += 1;
        txn.write(&r)?.balance += 1;
        if runs == 1 {
            other.atomically(|inner| {
                inner.write(&r)?.balance += 100;
                Ok(())
            })?;
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(runs, 2);
    let mut check = stm.begin();
    assert_eq!(check.read(&r).unwrap().balance, 101);
    assert_eq!(stm.statistics().write_conflicts, 1);
}

#[test]
fn test_conflict_retry_limit() {
    init_tracing();
    let stm = Stm::builder()
        .max_conflict_retries(0)
        .conflict_backoff(stratastm::Backoff::None)
        .build()
        .unwrap();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 0))).unwrap();
    let other = stm.clone();

    let err = stm
        .atomically(|txn| {
            txn.write(&r)?.balance += 1;
            other.atomically(|inner| {
                inner.write(&r)?.balance += 1;
                Ok(())
            })
        })
        .unwrap_err();
    assert!(err.is_conflict());
}

// =============================================================================
// LOCK POLICY TESTS
// =============================================================================

#[test]
fn test_spin_policy_configured_from_toml() {
    init_tracing();
    let stm = Stm::from_toml("lock_policy = { kind = \"spin\", attempts = 4 }").unwrap();
    assert_eq!(stm.config().lock_policy, LockPolicy::Spin { attempts: 4 });

    let r = stm.atomically(|txn| txn.attach(Account::new("a", 0))).unwrap();
    stm.atomically(|txn| {
        txn.write(&r)?.balance = 3;
        Ok(())
    })
    .unwrap();
    assert_eq!(stm.manager().lock_holder(r.handle()), None);
}

// =============================================================================
// OBSERVER TESTS
// =============================================================================

#[derive(Default)]
struct ConflictCounter {
    conflicts: Mutex<Vec<TxnId>>,
}

impl TransactionObserver for ConflictCounter {
    fn on_conflict(&self, txn_id: TxnId, _error: &Error) {
        self.conflicts.lock().push(txn_id);
    }
}

#[test]
fn test_observer_sees_conflicts() {
    init_tracing();
    let observer = Arc::new(ConflictCounter::default());
    let stm = Stm::builder().observer(observer.clone()).build().unwrap();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 0))).unwrap();

    let mut t1 = stm.begin();
    let mut t2 = stm.begin();
    t1.write(&r).unwrap().balance = 1;
    t2.write(&r).unwrap().balance = 2;
    t1.commit().unwrap();
    t2.commit().unwrap_err();

    assert_eq!(*observer.conflicts.lock(), vec![t2.id()]);
}
