//! Snapshot Isolation Tests
//!
//! A transaction sees exactly the heap as of its start version.

use crate::*;
use stratastm::ReadPolicy;

#[test]
fn test_reader_ignores_later_commits() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 1))).unwrap();

    let mut reader = stm.begin();
    for i in 2..5 {
        stm.atomically(|txn| {
            txn.write(&r)?.balance = i;
            Ok(())
        })
        .unwrap();
    }

    assert_eq!(reader.start_version(), 1);
    assert_eq!(reader.read(&r).unwrap().balance, 1);
    assert_eq!(stm.current_version(), 4);
}

#[test]
fn test_object_attached_later_is_invisible() {
    let stm = create_stm();
    let mut reader = stm.begin();
    let r = stm.atomically(|txn| txn.attach(Account::new("late", 0))).unwrap();
    assert_eq!(reader.read(&r).unwrap_err(), Error::LoadUncommitted(r.handle()));
}

#[test]
fn test_begin_at_reads_history() {
    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Account::new("a", 10))).unwrap();
    stm.atomically(|txn| {
        txn.write(&r)?.balance = 20;
        Ok(())
    })
    .unwrap();

    let mut past = stm.begin_at(1).unwrap();
    assert_eq!(past.read(&r).unwrap().balance, 10);
    assert_eq!(stm.oldest_live_version(), Some(1));

    assert!(matches!(stm.begin_at(3), Err(Error::InvalidOperation(_))));
}

#[test]
fn test_begin_at_before_initial_version() {
    init_tracing();
    let stm = Stm::builder().initial_version(10).build().unwrap();
    assert!(matches!(
        stm.begin_at(9),
        Err(Error::SnapshotTooOld {
            requested: 9,
            oldest: 10
        })
    ));
    assert_eq!(stm.begin_at(10).unwrap().start_version(), 10);
}

#[test]
fn test_lazy_and_unmanaged_reads_respect_snapshot() {
    let stm = create_stm();
    let head = create_list(&stm, &[1, 2, 3]).unwrap();

    let mut reader = stm.begin();
    stm.atomically(|txn| {
        txn.write(&head)?.value = 100;
        Ok(())
    })
    .unwrap();

    let lazy = reader.load(&head, ReadPolicy::Lazy).unwrap();
    assert_eq!(lazy.get(&mut reader).unwrap().value, 1);

    let detached = reader
        .load(&head, ReadPolicy::Unmanaged)
        .unwrap()
        .into_detached()
        .unwrap();
    assert_eq!(detached.value, 1);
}

#[test]
fn test_eager_load_tracks_whole_list() {
    let stm = create_stm();
    let head = create_list(&stm, &[1, 2, 3, 4, 5]).unwrap();

    let mut txn = stm.begin();
    txn.load(&head, ReadPolicy::Eager).unwrap();
    assert_eq!(txn.read_set().len(), 5);
    assert_eq!(list_values(&mut txn, Some(head)).unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_float_fields_compare_bitwise() {
    #[derive(Debug)]
    struct Reading(f64);

    impl Transactable for Reading {
        fn dematerialize(&self) -> Fields {
            Fields::new().float(self.0)
        }

        fn rematerialize(reader: &mut FieldReader<'_>) -> Result<Self> {
            Ok(Reading(reader.next_float()?))
        }
    }

    let stm = create_stm();
    let r = stm.atomically(|txn| txn.attach(Reading(f64::NAN))).unwrap();

    // rewriting NaN with the same NaN leaves nothing to commit
    let mut txn = stm.begin();
    let value = txn.read(&r).unwrap().0;
    txn.write(&r).unwrap().0 = value;
    assert_eq!(txn.commit().unwrap(), 1);
    assert_eq!(stm.current_version(), 1);
}
