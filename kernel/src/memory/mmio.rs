//! Memory-mapped register windows

/// Register window of a device (offsets relative to the BAR base)
pub trait Mmio: Send + Sync {
    fn read8(&self, offset: u32) -> u8;
    fn read16(&self, offset: u32) -> u16;
    fn read32(&self, offset: u32) -> u32;
    fn write8(&self, offset: u32, val: u8);
    fn write16(&self, offset: u32, val: u16);
    fn write32(&self, offset: u32, val: u32);
}

/// Volatile MMIO window at a mapped virtual base
pub struct MmioRegion {
    base: u64,
    len: usize,
}

impl MmioRegion {
    /// # Safety
    /// `base..base + len` must be a live uncached mapping of device registers
    /// for as long as the region exists.
    pub unsafe fn new(base: u64, len: usize) -> Self {
        Self { base, len }
    }

    #[inline]
    fn addr(&self, offset: u32, width: usize) -> u64 {
        debug_assert!(offset as usize + width <= self.len);
        self.base + offset as u64
    }
}

impl Mmio for MmioRegion {
    #[inline]
    fn read8(&self, offset: u32) -> u8 {
        unsafe { core::ptr::read_volatile(self.addr(offset, 1) as *const u8) }
    }

    #[inline]
    fn read16(&self, offset: u32) -> u16 {
        unsafe { core::ptr::read_volatile(self.addr(offset, 2) as *const u16) }
    }

    #[inline]
    fn read32(&self, offset: u32) -> u32 {
        unsafe { core::ptr::read_volatile(self.addr(offset, 4) as *const u32) }
    }

    #[inline]
    fn write8(&self, offset: u32, val: u8) {
        unsafe { core::ptr::write_volatile(self.addr(offset, 1) as *mut u8, val) }
    }

    #[inline]
    fn write16(&self, offset: u32, val: u16) {
        unsafe { core::ptr::write_volatile(self.addr(offset, 2) as *mut u16, val) }
    }

    #[inline]
    fn write32(&self, offset: u32, val: u32) {
        unsafe { core::ptr::write_volatile(self.addr(offset, 4) as *mut u32, val) }
    }
}

// Register accesses are single volatile loads/stores; the window itself
// holds no CPU-side state.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}
