//! Synchronization Primitives
//!
//! Blocking primitives for driver code that runs both in thread context and
//! in interrupt context. Blocking itself belongs to the kernel scheduler,
//! reached through the [`Scheduler`] trait; the primitives here only decide
//! *when* a thread may proceed.

pub mod completion;
pub mod semaphore;
pub mod sleeplock;

pub use completion::Completion;
pub use semaphore::Semaphore;
pub use sleeplock::{SleepLock, SleepLockGuard};

/// Why a blocked thread resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The wait condition became true
    Normal,
    /// A signal arrived while blocked interruptibly
    Interrupted,
}

/// An interruptible wait ended because a signal arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Thread blocking services provided by the kernel
pub trait Scheduler: Send + Sync {
    /// Block the calling thread until `ready` returns true.
    ///
    /// `ready` is re-evaluated after every [`Scheduler::wake_all`]; a wakeup
    /// issued between the check and the sleep must not be lost. With
    /// `interruptible` set, a pending signal ends the wait early with
    /// [`WakeReason::Interrupted`].
    fn block_until(&self, ready: &dyn Fn() -> bool, interruptible: bool) -> WakeReason;

    /// Make every blocked thread re-check its condition. Callable from
    /// interrupt context.
    fn wake_all(&self);

    /// Sleep for at least `us` microseconds
    fn sleep_us(&self, us: u64);
}
