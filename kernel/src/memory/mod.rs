//! Physical memory for DMA
//!
//! The driver never owns the kernel's page allocator; it borrows page
//! frames through [`FrameAllocator`] and holds each one as a [`DmaPage`]
//! handle until it is explicitly handed back with [`DmaPage::release`].

pub mod mmio;

pub use mmio::{Mmio, MmioRegion};

use crate::drivers::hda::{HdaError, Result};

pub const PAGE_SIZE: usize = 4096;

/// Page frame source provided by the kernel
pub trait FrameAllocator: Send + Sync {
    /// Allocate one physically contiguous, page-aligned frame
    fn allocate_frame(&self) -> Option<u64>;
    /// Return a frame obtained from `allocate_frame`
    fn deallocate_frame(&self, phys: u64);
    /// Translate a physical address into the kernel's mapping of it
    fn phys_to_virt(&self, phys: u64) -> u64;
}

/// One page of DMA-visible memory
///
/// Hardware reads and writes these pages behind the CPU's back, so every
/// access goes through volatile loads and stores.
#[derive(Debug)]
pub struct DmaPage {
    phys: u64,
    virt: u64,
}

impl DmaPage {
    /// Allocate and zero a page
    pub fn allocate(frames: &dyn FrameAllocator) -> Result<Self> {
        let phys = frames.allocate_frame().ok_or(HdaError::NoMemory)?;
        let page = DmaPage { phys, virt: frames.phys_to_virt(phys) };
        page.fill(0, PAGE_SIZE, 0);
        Ok(page)
    }

    /// Give the frame back to its allocator
    pub fn release(self, frames: &dyn FrameAllocator) {
        frames.deallocate_frame(self.phys);
    }

    pub fn phys(&self) -> u64 {
        self.phys
    }

    #[inline]
    fn ptr(&self, offset: usize, len: usize) -> *mut u8 {
        assert!(offset + len <= PAGE_SIZE, "DMA access past end of page");
        (self.virt as usize + offset) as *mut u8
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        unsafe { core::ptr::read_volatile(self.ptr(offset, 4) as *const u32) }
    }

    #[inline]
    pub fn write_u32(&self, offset: usize, val: u32) {
        unsafe { core::ptr::write_volatile(self.ptr(offset, 4) as *mut u32, val) }
    }

    #[inline]
    pub fn read_u64(&self, offset: usize) -> u64 {
        unsafe { core::ptr::read_volatile(self.ptr(offset, 8) as *const u64) }
    }

    #[inline]
    pub fn write_u64(&self, offset: usize, val: u64) {
        unsafe { core::ptr::write_volatile(self.ptr(offset, 8) as *mut u64, val) }
    }

    /// Copy `data` into the page at `offset`
    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        let dst = self.ptr(offset, data.len());
        for (i, &b) in data.iter().enumerate() {
            unsafe { core::ptr::write_volatile(dst.add(i), b) };
        }
    }

    /// Copy `buf.len()` bytes out of the page starting at `offset`
    pub fn read_bytes(&self, offset: usize, buf: &mut [u8]) {
        let src = self.ptr(offset, buf.len());
        for (i, b) in buf.iter_mut().enumerate() {
            *b = unsafe { core::ptr::read_volatile(src.add(i)) };
        }
    }

    /// Set `len` bytes starting at `offset` to `byte`
    pub fn fill(&self, offset: usize, len: usize, byte: u8) {
        let dst = self.ptr(offset, len);
        for i in 0..len {
            unsafe { core::ptr::write_volatile(dst.add(i), byte) };
        }
    }
}

// The page is only reachable through this handle; sharing it between the
// submitting thread and the interrupt handler is serialized by the owner.
unsafe impl Send for DmaPage {}
unsafe impl Sync for DmaPage {}
