//! Version-keyed latch buckets
//!
//! A [`VersionedLatchGroup`] tracks one monotonically advancing "active
//! version" and a set of latches waiting for it to reach some trigger
//! version. Latches are filed into one [`LatchBucket`] per trigger version.
//!
//! # No lost wakeups
//!
//! `add_latch` checks the active version, files the latch, then checks again.
//! `activate_version` advances the active version first and sweeps second.
//! Whichever side runs second sees the other's effect:
//!
//! ```text
//! registrant                     activator
//! ----------                     ---------
//! active >= trigger? open        CAS active := new
//! file latch in bucket           sweep buckets <= new
//! active >= trigger? open
//! ```

use crate::latch::Latch;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_core::Version;

#[derive(Debug, Default)]
struct BucketState {
    open: bool,
    retired: bool,
    latches: Vec<Arc<Latch>>,
}

/// Latches waiting for one trigger version
#[derive(Debug, Default)]
pub struct LatchBucket {
    state: Mutex<BucketState>,
}

impl LatchBucket {
    /// Empty, closed bucket
    pub fn new() -> Self {
        Self::default()
    }

    /// File a latch; an already opened bucket opens it immediately
    ///
    /// Returns `false` without filing if the bucket was retired.
    pub fn add(&self, latch: Arc<Latch>) -> bool {
        let mut state = self.state.lock();
        if state.retired {
            return false;
        }
        if state.open {
            drop(state);
            latch.open();
            return true;
        }
        state.latches.push(latch);
        true
    }

    /// Withdraw a filed latch, returning whether it was present
    pub fn remove(&self, latch: &Arc<Latch>) -> bool {
        let mut state = self.state.lock();
        let before = state.latches.len();
        state.latches.retain(|filed| !Arc::ptr_eq(filed, latch));
        state.latches.len() != before
    }

    /// Refuse further latches if none are filed
    fn retire_if_empty(&self) -> bool {
        let mut state = self.state.lock();
        if state.latches.is_empty() {
            state.retired = true;
        }
        state.retired
    }

    /// Open every filed latch and drop the references
    pub fn open(&self) {
        let latches = {
            let mut state = self.state.lock();
            if state.open {
                return;
            }
            state.open = true;
            std::mem::take(&mut state.latches)
        };
        for latch in latches {
            latch.open();
        }
    }

    /// Check if the bucket has been opened
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Number of latches still filed
    pub fn len(&self) -> usize {
        self.state.lock().latches.len()
    }

    /// Check if no latches are filed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Latches keyed by the minimum version that releases them
#[derive(Debug)]
pub struct VersionedLatchGroup {
    active: AtomicU64,
    buckets: DashMap<Version, Arc<LatchBucket>>,
}

impl VersionedLatchGroup {
    /// New group whose active version is `active`
    pub fn new(active: Version) -> Self {
        VersionedLatchGroup {
            active: AtomicU64::new(active),
            buckets: DashMap::new(),
        }
    }

    /// Highest version activated so far
    pub fn active_version(&self) -> Version {
        self.active.load(Ordering::SeqCst)
    }

    /// Open `latch` once the active version reaches `trigger`
    pub fn add_latch(&self, trigger: Version, latch: &Arc<Latch>) {
        if latch.is_open() {
            return;
        }
        if self.active_version() >= trigger {
            latch.open();
            return;
        }

        // a retired bucket is already out of the map, look it up again
        let bucket = loop {
            let bucket = self
                .buckets
                .entry(trigger)
                .or_insert_with(|| Arc::new(LatchBucket::new()))
                .clone();
            if bucket.add(Arc::clone(latch)) {
                break bucket;
            }
        };

        // an activation may have swept between the first check and filing
        if self.active_version() >= trigger {
            bucket.open();
            self.buckets
                .remove_if(&trigger, |_, filed| Arc::ptr_eq(filed, &bucket));
        }
    }

    /// Withdraw `latch` from the `trigger` bucket, dropping the bucket once
    /// it is empty
    pub fn remove_latch(&self, trigger: Version, latch: &Arc<Latch>) {
        let bucket = match self.buckets.get(&trigger) {
            Some(bucket) => Arc::clone(bucket.value()),
            None => return,
        };
        bucket.remove(latch);
        self.buckets.remove_if(&trigger, |_, filed| {
            Arc::ptr_eq(filed, &bucket) && filed.retire_if_empty()
        });
    }

    /// Advance the active version and open every bucket it satisfies
    ///
    /// No-op when the active version is already at or past `version`. The
    /// caller that wins the advance performs the sweep.
    pub fn activate_version(&self, version: Version) {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current >= version {
                return;
            }
            match self.active.compare_exchange_weak(
                current,
                version,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        self.buckets.retain(|trigger, bucket| {
            if *trigger <= version {
                bucket.open();
                false
            } else {
                true
            }
        });
    }

    /// Number of trigger versions with waiting latches
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for VersionedLatchGroup {
    fn default() -> Self {
        Self::new(0)
    }
}
