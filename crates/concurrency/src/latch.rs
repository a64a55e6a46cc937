//! One-shot blocking gate
//!
//! A [`Latch`] starts closed and can be opened exactly once; opening again is
//! a no-op. Threads blocked in [`Latch::wait`] are all released by the first
//! `open`. This is the only place the engine parks a thread.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Open-only synchronization gate
#[derive(Debug, Default)]
pub struct Latch {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Latch {
    /// New closed latch
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the latch and wake every waiter
    pub fn open(&self) {
        let mut open = self.open.lock();
        if *open {
            return;
        }
        *open = true;
        self.opened.notify_all();
    }

    /// Check if the latch has been opened
    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Block until the latch is open
    ///
    /// Uninterruptible: the only way out is [`Latch::open`].
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }

    /// Block until the latch is open or `timeout` elapses
    ///
    /// Returns whether the latch is open.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut open = self.open.lock();
        if !*open {
            self.opened.wait_for(&mut open, timeout);
        }
        *open
    }
}
