//! Waitable events and count-down latches
//!
//! Used to block a thread until work posted to another task runner has run.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// An event that wakes exactly one waiter per signal and then resets itself.
#[derive(Debug, Default)]
pub struct AutoResetEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl AutoResetEvent {
    /// Create an unsignaled event
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the event, waking one waiter
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_one();
    }

    /// Wait until signaled, then reset
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
        *signaled = false;
    }

    /// Wait until signaled or the timeout elapses.
    ///
    /// Returns `true` if the event was signaled (and has been reset).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            self.cond.wait_while_for(&mut signaled, |s| !*s, timeout);
        }
        let was_signaled = *signaled;
        *signaled = false;
        was_signaled
    }

    /// Peek at the signaled flag without consuming it
    pub fn is_signaled_for_test(&self) -> bool {
        *self.signaled.lock()
    }
}

/// A latch that releases waiters once it has been counted down `count` times.
#[derive(Debug)]
pub struct CountDownLatch {
    remaining: Mutex<usize>,
    cond: Condvar,
}

impl CountDownLatch {
    /// Create a latch that opens after `count` count-downs
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            cond: Condvar::new(),
        }
    }

    /// Decrement the count; at zero every waiter is released
    pub fn count_down(&self) {
        let mut remaining = self.remaining.lock();
        if *remaining == 0 {
            return;
        }
        *remaining -= 1;
        if *remaining == 0 {
            self.cond.notify_all();
        }
    }

    /// Block until the count reaches zero
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.cond.wait(&mut remaining);
        }
    }

    /// Count-downs still outstanding
    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }
}
