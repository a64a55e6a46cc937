//! Transaction Lifecycle Tests
//!
//! Attach, read, write, commit and abort through the facade.

use crate::*;

// =============================================================================
// COMMIT TESTS
// =============================================================================

#[test]
fn test_attach_commit_then_read_at() {
    let stm = create_stm();
    assert_eq!(stm.current_version(), 0);

    let mut txn = stm.begin();
    let r = txn.attach(Account::new("alice", 42)).unwrap();
    assert_eq!(txn.commit().unwrap(), 1);

    assert_eq!(stm.current_version(), 1);
    assert_eq!(stm.read_at(&r, 1).unwrap(), Some(Account::new("alice", 42)));
    assert_eq!(stm.read_at(&r, 0).unwrap(), None);
}

#[test]
fn test_each_write_commit_advances_version_by_one() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 0))).unwrap();

    for expected in 2..12 {
        let mut txn = stm.begin();
        txn.write(&r).unwrap().balance += 1;
        assert_eq!(txn.commit().unwrap(), expected);
    }

    let mut txn = stm.begin();
    assert_eq!(txn.read(&r).unwrap().balance, 10);
}

#[test]
fn test_read_only_commit_keeps_version() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 1))).unwrap();

    let mut txn = stm.begin();
    txn.read(&r).unwrap();
    assert_eq!(txn.commit().unwrap(), 1);
    assert_eq!(stm.current_version(), 1);
    assert_eq!(stm.statistics().read_only_commits, 1);
}

#[test]
fn test_multi_object_commit_is_one_version() {
    let stm = create_stm();
    let (a, b) = stm
        .atomically(|txn| Ok((txn.attach(Account::new("a", 50))?, txn.attach(Account::new("b", 50))?)))
        .unwrap();

    stm.atomically(|txn| {
        txn.write(&a)?.balance -= 20;
        txn.write(&b)?.balance += 20;
        Ok(())
    })
    .unwrap();
    assert_eq!(stm.current_version(), 2);

    let before_a = stm.read_at(&a, 1).unwrap().unwrap();
    let after_b = stm.read_at(&b, 2).unwrap().unwrap();
    assert_eq!(before_a.balance, 50);
    assert_eq!(after_b.balance, 70);
}

#[test]
fn test_linked_structure_round_trips() {
    let stm = create_stm();
    let head = create_list(&stm, &[1, 2, 3, 4]);

    let mut txn = stm.begin();
    assert_eq!(list_values(&mut txn, head).unwrap(), vec![1, 2, 3, 4]);
}

// =============================================================================
// ABORT TESTS
// =============================================================================

#[test]
fn test_abort_discards_changes() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 10))).unwrap();

    let mut txn = stm.begin();
    txn.write(&r).unwrap().balance = 0;
    txn.abort().unwrap();
    assert_eq!(stm.current_version(), 1);

    let mut check = stm.begin();
    assert_eq!(check.read(&r).unwrap().balance, 10);
}

#[test]
fn test_operations_after_commit_fail() {
    let stm = create_stm();
    let mut txn = stm.begin();
    let r = txn.attach(Account::new("a", 1)).unwrap();
    txn.commit().unwrap();

    assert!(matches!(txn.read(&r), Err(Error::DeadTransaction { .. })));
    assert!(matches!(txn.write(&r), Err(Error::DeadTransaction { .. })));
    assert!(matches!(txn.abort(), Err(Error::DeadTransaction { .. })));
}

#[test]
fn test_body_error_aborts_and_propagates() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 5))).unwrap();

    let err = stm
        .atomically(|txn| {
            txn.write(&r)?.balance = -1;
            Err::<(), _>(Error::InvalidOperation("overdrawn".into()))
        })
        .unwrap_err();

    assert_eq!(err, Error::InvalidOperation("overdrawn".into()));
    assert_eq!(stm.current_version(), 1);
    assert_eq!(stm.statistics().aborted, 1);
    assert_eq!(stm.live_transactions(), 0);
}

// =============================================================================
// ERROR TESTS
// =============================================================================

#[test]
fn test_read_of_never_committed_handle() {
    let stm = create_stm();
    let r: TxRef<Account> = TxRef::new();
    let mut txn = stm.begin();
    assert_eq!(txn.read(&r).unwrap_err(), Error::LoadUncommitted(r.handle()));
}

#[test]
fn test_statistics_serialize() {
    let stm = create_stm();
    stm.atomically(|txn| txn.attach(Account::new("a", 1))).unwrap();

    let json = serde_json::to_value(stm.statistics()).unwrap();
    assert_eq!(json["committed"], 1);
    assert_eq!(json["started"], 1);
}
