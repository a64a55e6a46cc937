//! Start versions of live transactions
//!
//! Every active transaction registers the version it reads from. The oldest
//! registered version is the lower bound any future snapshot pruning must
//! respect. Nothing is pruned today.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use strata_core::Version;

/// Multiset of live start versions
#[derive(Debug, Default)]
pub struct LivenessRegistry {
    live: Mutex<BTreeMap<Version, usize>>,
}

impl LivenessRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction reading at `version`
    pub fn register(&self, version: Version) {
        *self.live.lock().entry(version).or_insert(0) += 1;
    }

    /// Forget one transaction reading at `version`
    pub fn release(&self, version: Version) {
        let mut live = self.live.lock();
        if let Some(count) = live.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                live.remove(&version);
            }
        }
    }

    /// Oldest version any live transaction reads from
    pub fn oldest_live_version(&self) -> Option<Version> {
        self.live.lock().keys().next().copied()
    }

    /// Number of live transactions
    pub fn live_count(&self) -> usize {
        self.live.lock().values().sum()
    }
}
