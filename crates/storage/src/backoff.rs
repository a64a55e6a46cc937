//! Spin backoff for optimistic retry loops

use serde::{Deserialize, Serialize};

/// How long to pause between attempts of an optimistic loop
///
/// ```toml
/// commit_backoff = { kind = "exponential", max_spins = 256 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately
    #[default]
    None,
    /// Spin `2^attempt` times, capped at `max_spins`, yielding once capped
    Exponential {
        /// Upper bound on spins per pause
        max_spins: u32,
    },
}

impl Backoff {
    /// Pause after failed attempt number `attempt` (1-based)
    pub fn snooze(&self, attempt: u32) {
        match *self {
            Backoff::None => {}
            Backoff::Exponential { max_spins } => {
                let spins = self.spins_for(attempt).min(max_spins);
                for _ in 0..spins {
                    std::hint::spin_loop();
                }
                if spins >= max_spins {
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Spin count for an attempt, before capping
    pub fn spins_for(&self, attempt: u32) -> u32 {
        match self {
            Backoff::None => 0,
            Backoff::Exponential { .. } => 1u32 << attempt.min(31),
        }
    }
}
