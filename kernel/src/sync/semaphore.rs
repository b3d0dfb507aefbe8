//! Semaphore
//!
//! Counting semaphore for resource limiting.

use core::sync::atomic::{AtomicI32, Ordering};

use super::{Interrupted, Scheduler, WakeReason};

/// Counting semaphore
pub struct Semaphore {
    count: AtomicI32,
}

impl Semaphore {
    /// Create new semaphore with initial count
    pub const fn new(count: i32) -> Self {
        Self { count: AtomicI32::new(count) }
    }

    /// Acquire (decrement) - blocks if count is 0
    pub fn acquire(&self, sched: &dyn Scheduler, interruptible: bool) -> Result<(), Interrupted> {
        loop {
            if self.try_acquire() {
                return Ok(());
            }
            if sched.block_until(&|| self.count() > 0, interruptible) == WakeReason::Interrupted {
                return Err(Interrupted);
            }
        }
    }

    /// Try to acquire - returns false if would block
    pub fn try_acquire(&self) -> bool {
        let mut count = self.count.load(Ordering::Relaxed);
        while count > 0 {
            match self.count.compare_exchange_weak(
                count,
                count - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => count = current,
            }
        }
        false
    }

    /// Release (increment)
    pub fn release(&self, sched: &dyn Scheduler) {
        self.count.fetch_add(1, Ordering::Release);
        sched.wake_all();
    }

    /// Release only while the count is below `limit`
    ///
    /// Used as an edge signal from interrupt context: repeated signals with
    /// nobody consuming them saturate instead of piling up.
    pub fn release_limit(&self, sched: &dyn Scheduler, limit: i32) {
        let mut count = self.count.load(Ordering::Relaxed);
        while count < limit {
            match self.count.compare_exchange_weak(
                count,
                count + 1,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    sched.wake_all();
                    return;
                }
                Err(current) => count = current,
            }
        }
    }

    /// Force the count, discarding pending signals
    pub fn reset(&self, count: i32) {
        self.count.store(count, Ordering::Release);
    }

    /// Get current count
    pub fn count(&self) -> i32 {
        self.count.load(Ordering::Relaxed)
    }
}
