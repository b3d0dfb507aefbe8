//! One-shot completion
//!
//! A waiter parks on [`Completion::wait`] until some other context (usually
//! an interrupt handler) calls [`Completion::signal`]. Each completion is
//! used for exactly one round trip.

use core::sync::atomic::{AtomicBool, Ordering};

use super::Scheduler;

pub struct Completion {
    done: AtomicBool,
}

impl Completion {
    pub const fn new() -> Self {
        Self { done: AtomicBool::new(false) }
    }

    /// Block (uninterruptibly) until signalled
    pub fn wait(&self, sched: &dyn Scheduler) {
        while !self.is_done() {
            sched.block_until(&|| self.is_done(), false);
        }
    }

    pub fn signal(&self, sched: &dyn Scheduler) {
        self.done.store(true, Ordering::Release);
        sched.wake_all();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
