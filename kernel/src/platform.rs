//! Kernel services the driver is linked against

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::drivers::hda::Result;
use crate::memory::{FrameAllocator, Mmio};
use crate::sync::Scheduler;

/// Interrupt handler bound to an allocated vector
pub type InterruptHandler = Box<dyn Fn() + Send + Sync>;

pub trait Platform: Send + Sync {
    fn frames(&self) -> &dyn FrameAllocator;

    fn scheduler(&self) -> &dyn Scheduler;

    /// Map `len` bytes of device registers at physical address `phys`
    fn map_mmio(&self, phys: u64, len: usize) -> Result<Arc<dyn Mmio>>;

    /// Allocate an interrupt vector and bind `handler` to it
    fn allocate_vector(&self, handler: InterruptHandler) -> Option<u8>;

    /// Unbind and drop the handler of `vector`; once this returns the
    /// handler is not running and will not run again
    fn free_vector(&self, vector: u8);
}
