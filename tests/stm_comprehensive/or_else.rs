//! Or-else Composition Tests
//!
//! The second alternative runs only when the first retries, and sees none of
//! the first's changes.

use crate::*;
use std::thread;
use std::time::Duration;

/// Take `amount` from `account`, retrying while it is short
fn withdraw(txn: &mut Transaction, account: TxRef<Account>, amount: i64) -> Result<&'static str> {
    let balance = txn.read(&account)?.balance;
    guard(balance >= amount)?;
    txn.write(&account)?.balance -= amount;
    Ok("withdrew")
}

#[test]
fn test_first_branch_taken_when_possible() {
    let stm = create_stm();
    let (a, b) = stm
        .atomically(|txn| Ok((txn.attach(Account::new("a", 50))?, txn.attach(Account::new("b", 50))?)))
        .unwrap();

    let from = stm
        .atomically(|txn| {
            txn.or_else(
                |t| withdraw(t, a, 30).map(|_| "a"),
                |t| withdraw(t, b, 30).map(|_| "b"),
            )
        })
        .unwrap();

    assert_eq!(from, "a");
    assert_eq!(stm.read_at(&a, 2).unwrap().unwrap().balance, 20);
    assert_eq!(stm.read_at(&b, 2).unwrap().unwrap().balance, 50);
}

#[test]
fn test_second_branch_taken_after_retry() {
    let stm = create_stm();
    let (a, b) = stm
        .atomically(|txn| Ok((txn.attach(Account::new("a", 10))?, txn.attach(Account::new("b", 50))?)))
        .unwrap();

    let from = stm
        .atomically(|txn| {
            txn.or_else(
                |t| {
                    // partial effect that must be rolled back
                    t.write(&a)?.owner = "tampered".to_string();
                    withdraw(t, a, 30).map(|_| "a")
                },
                |t| withdraw(t, b, 30).map(|_| "b"),
            )
        })
        .unwrap();

    assert_eq!(from, "b");
    let a_now = stm.read_at(&a, 2).unwrap().unwrap();
    assert_eq!(a_now, Account::new("a", 10));
    assert_eq!(stm.read_at(&b, 2).unwrap().unwrap().balance, 20);
}

#[test]
fn test_both_branches_retry_waits_on_both() {
    let stm = create_stm();
    let (a, b) = stm
        .atomically(|txn| Ok((txn.attach(Account::new("a", 0))?, txn.attach(Account::new("b", 0))?)))
        .unwrap();

    let writer = stm.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        // only the second alternative's dependency changes
        writer
            .atomically(|txn| {
                txn.write(&b)?.balance = 100;
                Ok(())
            })
            .unwrap();
    });

    let from = stm
        .atomically(|txn| {
            txn.or_else(
                |t| withdraw(t, a, 30).map(|_| "a"),
                |t| withdraw(t, b, 30).map(|_| "b"),
            )
        })
        .unwrap();

    handle.join().unwrap();
    assert_eq!(from, "b");
}

#[test]
fn test_nested_or_else() {
    let stm = create_stm();
    let (a, b, c) = stm
        .atomically(|txn| {
            Ok((
                txn.attach(Account::new("a", 0))?,
                txn.attach(Account::new("b", 0))?,
                txn.attach(Account::new("c", 40))?,
            ))
        })
        .unwrap();

    let from = stm
        .atomically(|txn| {
            txn.or_else(
                |t| {
                    t.or_else(
                        |t| withdraw(t, a, 10).map(|_| "a"),
                        |t| withdraw(t, b, 10).map(|_| "b"),
                    )
                },
                |t| withdraw(t, c, 10).map(|_| "c"),
            )
        })
        .unwrap();

    assert_eq!(from, "c");
    let mut check = stm.begin();
    assert_eq!(check.read(&c).unwrap().balance, 30);
    assert_eq!(check.or_else_depth(), 0);
}

#[test]
fn test_manual_start_or_end_or_else() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 1))).unwrap();

    let mut txn = stm.begin();
    txn.start_or().unwrap();
    txn.write(&r).unwrap().balance = 99;
    txn.end_or_else().unwrap();
    assert_eq!(txn.read(&r).unwrap().balance, 1);

    txn.start_or().unwrap();
    txn.write(&r).unwrap().balance = 2;
    txn.end_or().unwrap();
    assert_eq!(txn.commit().unwrap(), 2);
    assert_eq!(stm.read_at(&r, 2).unwrap().unwrap().balance, 2);
}

#[test]
fn test_non_retry_error_skips_second_branch() {
    let stm = create_stm();
    let mut second_ran = false;
    let err = stm
        .atomically(|txn| {
            txn.or_else(
                |_| Err::<(), _>(Error::InvalidOperation("boom".into())),
                |_| {
                    second_ran = true;
                    Ok(())
                },
            )
        })
        .unwrap_err();

    assert!(matches!(err, Error::InvalidOperation(_)));
    assert!(!second_ran);
}
