//! Multi-threaded Stress Tests
//!
//! Many threads transferring between shared accounts must never create or
//! destroy money, and every commit must land as its own version.

use crate::*;
use rand::Rng;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const ACCOUNTS: usize = 16;
const TRANSFERS_PER_THREAD: usize = 200;
const INITIAL_BALANCE: i64 = 1_000;

fn seed_accounts(stm: &Stm) -> Vec<TxRef<Account>> {
    stm.atomically(|txn| {
        (0..ACCOUNTS)
            .map(|i| txn.attach(Account::new(&format!("acct-{}", i), INITIAL_BALANCE)))
            .collect()
    })
    .unwrap()
}

fn total(stm: &Stm, accounts: &[TxRef<Account>]) -> i64 {
    let mut txn = stm.begin();
    accounts
        .iter()
        .map(|r| txn.read(r).map(|a| a.balance))
        .sum::<Result<i64>>()
        .unwrap()
}

#[test]
fn test_concurrent_transfers_preserve_total() {
    let stm = create_stm();
    let accounts = Arc::new(seed_accounts(&stm));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let stm = stm.clone();
            let accounts = Arc::clone(&accounts);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..TRANSFERS_PER_THREAD {
                    let from = accounts[rng.gen_range(0..ACCOUNTS)];
                    let to = accounts[rng.gen_range(0..ACCOUNTS)];
                    let amount = rng.gen_range(1..50);
                    stm.atomically(|txn| {
                        if from == to {
                            return Ok(());
                        }
                        txn.write(&from)?.balance -= amount;
                        txn.write(&to)?.balance += amount;
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(total(&stm, &accounts), INITIAL_BALANCE * ACCOUNTS as i64);
    let stats = stm.statistics();
    assert_eq!(stats.update_commits(), stm.current_version());
    assert_eq!(stm.live_transactions(), 0);
}

#[test]
fn test_concurrent_counter_increments() {
    let stm = create_stm();
    let counter = stm.atomically(|txn| txn.attach(Account::new("counter", 0))).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let stm = stm.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..100 {
                    stm.atomically(|txn| {
                        txn.write(&counter)?.balance += 1;
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut txn = stm.begin();
    assert_eq!(txn.read(&counter).unwrap().balance, (THREADS * 100) as i64);
    assert_eq!(stm.current_version(), 1 + (THREADS * 100) as u64);
}

#[test]
fn test_readers_see_consistent_snapshots_under_writes() {
    let stm = create_stm();
    let accounts = Arc::new(seed_accounts(&stm));
    let expected = INITIAL_BALANCE * ACCOUNTS as i64;
    let barrier = Arc::new(Barrier::new(2));

    let writer = {
        let stm = stm.clone();
        let accounts = Arc::clone(&accounts);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for i in 0..300 {
                let from = accounts[i % ACCOUNTS];
                let to = accounts[(i * 7 + 3) % ACCOUNTS];
                if from == to {
                    continue;
                }
                stm.atomically(|txn| {
                    txn.write(&from)?.balance -= 5;
                    txn.write(&to)?.balance += 5;
                    Ok(())
                })
                .unwrap();
            }
        })
    };

    barrier.wait();
    for _ in 0..100 {
        assert_eq!(total(&stm, &accounts), expected);
    }
    writer.join().unwrap();
}
