//! Blocking Retry Tests
//!
//! A retrying transaction parks until a commit overwrites something it read.

use crate::*;
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// =============================================================================
// WAKEUP TESTS
// =============================================================================

#[test]
fn test_retry_wakes_when_read_object_changes() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 0))).unwrap();
    let writer = stm.clone();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        writer
            .atomically(|txn| {
                txn.write(&r)?.balance = 1;
                Ok(())
            })
            .unwrap();
    });

    let mut runs = 0;
    let seen = stm
        .atomically(|txn| {
            runs += 1;
            let balance = txn.read(&r)?.balance;
            guard(balance > 0)?;
            Ok(balance)
        })
        .unwrap();

    handle.join().unwrap();
    assert_eq!(seen, 1);
    assert!(runs >= 2);
    assert!(stm.statistics().retries >= 1);
}

#[test]
fn test_explicit_abort_and_retry() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 0))).unwrap();
    let writer = stm.clone();
    let (ready_tx, ready_rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        ready_rx.recv().unwrap();
        writer
            .atomically(|txn| {
                txn.write(&r)?.balance = 7;
                Ok(())
            })
            .unwrap();
    });

    let mut txn = stm.begin();
    assert_eq!(txn.read(&r).unwrap().balance, 0);
    ready_tx.send(()).unwrap();
    txn.abort_and_retry().unwrap();

    assert!(txn.start_version() >= 2);
    assert_eq!(txn.read(&r).unwrap().balance, 7);
    handle.join().unwrap();
}

#[test]
fn test_unrelated_commit_does_not_wake() {
    let stm = create_stm();
    let (watched, other) = stm
        .atomically(|txn| Ok((txn.attach(Account::new("w", 0))?, txn.attach(Account::new("o", 0))?)))
        .unwrap();
    let writer = stm.clone();
    let (done_tx, done_rx) = mpsc::channel();

    let waiter_stm = stm.clone();
    let waiter = thread::spawn(move || {
        let balance = waiter_stm
            .atomically(|txn| {
                let balance = txn.read(&watched)?.balance;
                guard(balance != 0)?;
                Ok(balance)
            })
            .unwrap();
        done_tx.send(balance).unwrap();
    });

    thread::sleep(Duration::from_millis(30));
    writer
        .atomically(|txn| {
            txn.write(&other)?.balance = 1;
            Ok(())
        })
        .unwrap();
    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

    writer
        .atomically(|txn| {
            txn.write(&watched)?.balance = 5;
            Ok(())
        })
        .unwrap();
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(10)).unwrap(), 5);
    waiter.join().unwrap();
}

#[test]
fn test_many_waiters_all_wake() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("gate", 0))).unwrap();
    let waiters = 8;
    let barrier = Arc::new(Barrier::new(waiters + 1));

    let handles: Vec<_> = (0..waiters)
        .map(|_| {
            let stm = stm.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                stm.atomically(|txn| {
                    let open = txn.read(&r)?.balance;
                    guard(open == 1)
                })
                .unwrap();
            })
        })
        .collect();

    barrier.wait();
    thread::sleep(Duration::from_millis(30));
    stm.atomically(|txn| {
        txn.write(&r)?.balance = 1;
        Ok(())
    })
    .unwrap();

    for handle in handles {
        handle.join().unwrap();
    }
}

// =============================================================================
// NO PROGRESS TESTS
// =============================================================================

#[test]
fn test_retry_without_reads_is_no_progress() {
    let stm = create_stm();
    let err = stm
        .atomically(|txn| {
            txn.attach(Account::new("a", 0))?;
            retry::<()>()
        })
        .unwrap_err();
    assert!(matches!(err, Error::NoProgressPossible(_)));
    assert_eq!(stm.current_version(), 0);
    assert_eq!(stm.live_transactions(), 0);
}

#[test]
fn test_unwrap_or_retry_blocks_on_empty_slot() {
    let stm = create_stm();
    let head = create_list(&stm, &[]);
    assert!(head.is_none());

    let slot = stm.atomically(|txn| txn.attach(Node { value: -1, next: None })).unwrap();
    let producer = stm.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        producer
            .atomically(|txn| {
                let next = txn.attach(Node { value: 9, next: None })?;
                txn.write(&slot)?.next = Some(next);
                Ok(())
            })
            .unwrap();
    });

    let value = stm
        .atomically(|txn| {
            let next = unwrap_or_retry(txn.read(&slot)?.next)?;
            Ok(txn.read(&next)?.value)
        })
        .unwrap();
    assert_eq!(value, 9);
    handle.join().unwrap();
}
