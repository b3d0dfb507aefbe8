//! Sleeping mutex
//!
//! Like the spinlocks elsewhere in the kernel, but contended lockers block
//! in the scheduler. Used for locks held across operations that themselves
//! sleep (codec verb round trips, stream start/stop handshakes).

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use super::Scheduler;

pub struct SleepLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SleepLock<T> {}
unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock<'a>(&'a self, sched: &'a dyn Scheduler) -> SleepLockGuard<'a, T> {
        loop {
            if let Some(guard) = self.try_lock(sched) {
                return guard;
            }
            sched.block_until(&|| !self.is_locked(), false);
        }
    }

    pub fn try_lock<'a>(&'a self, sched: &'a dyn Scheduler) -> Option<SleepLockGuard<'a, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SleepLockGuard { lock: self, sched })
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
    sched: &'a dyn Scheduler,
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        self.sched.wake_all();
    }
}
