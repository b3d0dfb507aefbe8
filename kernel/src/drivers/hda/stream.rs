//! Output DMA stream
//!
//! One stream descriptor cycles through a fixed Buffer Descriptor List of
//! page-sized entries, each with interrupt-on-completion set. Writers fill
//! a software ring buffer; every page-completion interrupt copies the next
//! page out of that ring into the DMA page the hardware will reach last,
//! or plays silence when the ring runs dry.

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use super::error::{HdaError, Result};
use super::regs::{reg, sctl, sd, ssts};
use super::poll_until;
use crate::arch;
use crate::memory::{DmaPage, Mmio, PAGE_SIZE};
use crate::oss::PcmSource;
use crate::platform::Platform;
use crate::ringbuffer::RingBuffer;
use crate::sync::{Semaphore, SleepLock};

/// BDL entry flags: interrupt on completion
const BDL_IOC: u32 = 1;
const BDL_ENTRY_SIZE: usize = 16;
/// Largest BDL a single page can hold
pub const MAX_PAGES: usize = PAGE_SIZE / BDL_ENTRY_SIZE;

/// Register window of one stream descriptor
pub struct StreamRegs {
    mmio: Arc<dyn Mmio>,
    base: u32,
}

impl StreamRegs {
    /// Registers of descriptor `index` (input, then output, then bidirectional)
    pub fn new(mmio: Arc<dyn Mmio>, index: u8) -> Self {
        StreamRegs { mmio, base: reg::SD_BASE + index as u32 * reg::SD_SIZE }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn ctl(&self) -> u8 {
        self.mmio.read8(self.base + sd::CTL)
    }

    pub fn set_ctl(&self, val: u8) {
        self.mmio.write8(self.base + sd::CTL, val);
    }

    pub fn is_running(&self) -> bool {
        self.ctl() & sctl::RUN != 0
    }

    pub fn set_run(&self, run: bool) {
        let ctl = self.ctl();
        self.set_ctl(if run { ctl | sctl::RUN } else { ctl & !sctl::RUN });
    }

    /// Stream number the descriptor answers to on the link
    pub fn set_stream_number(&self, number: u8) {
        let ctl2 = self.mmio.read8(self.base + sd::CTL2) & !sctl::STRM_MASK;
        self.mmio
            .write8(self.base + sd::CTL2, ctl2 | (number << sctl::STRM_SHIFT) & sctl::STRM_MASK);
    }

    pub fn set_format(&self, fmt: u16) {
        self.mmio.write16(self.base + sd::FMT, fmt);
    }

    pub fn format(&self) -> u16 {
        self.mmio.read16(self.base + sd::FMT)
    }

    pub fn status(&self) -> u8 {
        self.mmio.read8(self.base + sd::STS)
    }

    /// Acknowledge a buffer completion (write 1 to clear)
    pub fn ack_completion(&self) {
        self.mmio.write8(self.base + sd::STS, ssts::BCIS);
    }

    /// Link position in the cyclic buffer, in bytes
    pub fn position(&self) -> u32 {
        self.mmio.read32(self.base + sd::LPIB)
    }

    fn program_bdl(&self, bdl_phys: u64, length: u32, last_index: u16) {
        self.mmio.write32(self.base + sd::BDLPL, bdl_phys as u32);
        self.mmio.write32(self.base + sd::BDLPU, (bdl_phys >> 32) as u32);
        self.mmio.write32(self.base + sd::CBL, length);
        self.mmio.write16(self.base + sd::LVI, last_index);
    }
}

/// The path-side of a stream: owns the negotiated parameters and gets a
/// chance to program the codec before DMA starts
pub trait StreamClient: Send + Sync {
    /// (fragment size in bytes, fragment count), derived on first use
    fn fragment(&self) -> (usize, usize);
    /// Activate the path and push dirty parameters; the stream is stopped
    fn prepare(&self, regs: &StreamRegs) -> Result<()>;
    /// Hardware state was reset: parameters must be pushed again
    fn invalidate(&self);
}

struct StreamBuffer {
    ring: RingBuffer,
    /// Next DMA page to refill
    cursor: usize,
}

pub struct Stream {
    regs: StreamRegs,
    platform: Arc<dyn Platform>,
    bdl: DmaPage,
    pages: Vec<DmaPage>,
    /// Shared with the completion interrupt
    buffer: Mutex<StreamBuffer>,
    /// Serializes queue / pause / resume
    op_lock: SleepLock<()>,
    /// Signalled by the interrupt handler when the ring has room
    space: Semaphore,
    poll_limit: usize,
}

impl Stream {
    /// Allocate the BDL and its data pages and fill in the descriptors
    pub fn new(
        regs: StreamRegs,
        platform: Arc<dyn Platform>,
        page_count: usize,
        poll_limit: usize,
    ) -> Result<Self> {
        if !(2..=MAX_PAGES).contains(&page_count) {
            return Err(HdaError::InvalidArgument);
        }
        let frames = platform.frames();

        let bdl = DmaPage::allocate(frames)?;
        let mut pages = Vec::new();
        if pages.try_reserve_exact(page_count).is_err() {
            bdl.release(frames);
            return Err(HdaError::NoMemory);
        }
        for _ in 0..page_count {
            match DmaPage::allocate(frames) {
                Ok(page) => pages.push(page),
                Err(e) => {
                    pages.into_iter().for_each(|p| p.release(frames));
                    bdl.release(frames);
                    return Err(e);
                }
            }
        }

        for (i, page) in pages.iter().enumerate() {
            let entry = i * BDL_ENTRY_SIZE;
            bdl.write_u64(entry, page.phys());
            bdl.write_u32(entry + 8, PAGE_SIZE as u32);
            bdl.write_u32(entry + 12, BDL_IOC);
        }

        Ok(Stream {
            regs,
            platform,
            bdl,
            pages,
            buffer: Mutex::new(StreamBuffer { ring: RingBuffer::new(), cursor: 0 }),
            op_lock: SleepLock::new(()),
            space: Semaphore::new(0),
            poll_limit,
        })
    }

    /// Hand every page back to the frame allocator
    pub fn release(self) {
        let frames = self.platform.frames();
        self.pages.into_iter().for_each(|p| p.release(frames));
        self.bdl.release(frames);
    }

    pub fn regs(&self) -> &StreamRegs {
        &self.regs
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn with_buffer<R>(&self, f: impl FnOnce(&mut StreamBuffer) -> R) -> R {
        arch::without_interrupts(|| f(&mut self.buffer.lock()))
    }

    /// Pulse stream reset and program the descriptor from scratch
    ///
    /// Leaves the stream stopped, with completion interrupts enabled and
    /// bound to link stream number 1.
    pub fn program(&self) -> Result<()> {
        let sched = self.platform.scheduler();
        let regs = &self.regs;

        regs.set_ctl(regs.ctl() & !sctl::RUN);
        regs.set_ctl(regs.ctl() | sctl::SRST);
        if !poll_until(sched, self.poll_limit, || regs.ctl() & sctl::SRST != 0) {
            return Err(HdaError::Timeout("stream reset enter"));
        }
        regs.set_ctl(regs.ctl() & !sctl::SRST);
        if !poll_until(sched, self.poll_limit, || regs.ctl() & sctl::SRST == 0) {
            return Err(HdaError::Timeout("stream reset exit"));
        }

        regs.set_ctl(regs.ctl() | sctl::IOCE);
        regs.set_stream_number(super::path::STREAM_TAG);
        regs.program_bdl(
            self.bdl.phys(),
            (self.pages.len() * PAGE_SIZE) as u32,
            (self.pages.len() - 1) as u16,
        );
        regs.ack_completion();
        Ok(())
    }

    /// Copy `source` into the ring, blocking while it is full
    ///
    /// The first time a full fragment is buffered the DMA pages are primed
    /// and the stream is started.
    pub fn queue(&self, client: &dyn StreamClient, source: &mut dyn PcmSource) -> Result<usize> {
        let sched = self.platform.scheduler();
        let _op = self.op_lock.lock(sched);

        let (frag_size, frag_count) = client.fragment();
        let capacity = frag_size
            .checked_mul(frag_count)
            .filter(|&c| c != 0)
            .ok_or(HdaError::InvalidArgument)?;
        self.with_buffer(|b| {
            if b.ring.is_initialized() {
                Ok(())
            } else {
                b.ring.init(capacity)
            }
        })?;

        let mut done = 0;
        while source.remaining() > 0 {
            let free = self.with_buffer(|b| b.ring.free());
            if free == 0 {
                self.space.acquire(sched, true)?;
                continue;
            }

            let chunk = source.next_chunk(free.min(PAGE_SIZE))?;
            done += self.with_buffer(|b| b.ring.write(chunk));

            if !self.regs.is_running() && self.with_buffer(|b| b.ring.len()) >= frag_size {
                self.start(client, frag_size)?;
            }
        }
        Ok(done)
    }

    /// Move buffered data into the first DMA pages; returns pages filled
    fn prime(&self, frag_size: usize) -> usize {
        let count = if frag_size < 2 * PAGE_SIZE { 2 } else { frag_size / PAGE_SIZE };
        let count = count.min(self.pages.len());

        self.with_buffer(|b| {
            for page in &self.pages[..count] {
                let (head, tail) = b.ring.consume(PAGE_SIZE);
                let filled = head.len() + tail.len();
                page.write_bytes(0, head);
                page.write_bytes(head.len(), tail);
                page.fill(filled, PAGE_SIZE - filled, 0);
            }
            b.cursor = count % self.pages.len();
        });
        count
    }

    fn start(&self, client: &dyn StreamClient, frag_size: usize) -> Result<()> {
        let primed = self.prime(frag_size);
        client.prepare(&self.regs)?;
        self.regs.set_run(true);
        crate::log!("[HDA] stream {:#X} started, {} pages primed", self.regs.base(), primed);
        Ok(())
    }

    /// Page-completion interrupt: refill the page at the cursor
    pub fn handle_completion(&self) {
        let sched = self.platform.scheduler();
        self.with_buffer(|b| {
            let page = &self.pages[b.cursor];
            if !b.ring.is_initialized() || b.ring.len() < PAGE_SIZE {
                page.fill(0, PAGE_SIZE, 0);
                if b.ring.is_initialized() {
                    crate::log_debug!("[HDA] underflow at page {}", b.cursor);
                }
                self.space.release_limit(sched, 1);
            } else {
                let half = b.ring.capacity() / 2;
                let (head, tail) = b.ring.consume(PAGE_SIZE);
                page.write_bytes(0, head);
                page.write_bytes(head.len(), tail);
                if b.ring.len() < half {
                    self.space.release_limit(sched, 1);
                }
            }
            b.cursor = (b.cursor + 1) % self.pages.len();
        });
        self.regs.ack_completion();
    }

    /// Stop the stream, optionally after draining and optionally resetting
    ///
    /// An interrupted drain still stops (and resets) the stream before
    /// reporting [`HdaError::Interrupted`].
    pub fn pause(&self, client: &dyn StreamClient, wait: bool, reset: bool) -> Result<()> {
        let sched = self.platform.scheduler();
        let _op = self.op_lock.lock(sched);
        let mut status = Ok(());

        if wait && self.regs.is_running() {
            while self.with_buffer(|b| b.ring.len()) >= PAGE_SIZE {
                if let Err(e) = self.space.acquire(sched, true) {
                    status = Err(e.into());
                    break;
                }
            }
        }

        self.regs.set_run(false);

        if reset {
            self.program()?;
            client.invalidate();
            self.with_buffer(|b| {
                b.cursor = 0;
                b.ring.release();
            });
            self.space.reset(0);
            for page in &self.pages {
                page.fill(0, PAGE_SIZE, 0);
            }
            crate::log_debug!("[HDA] stream {:#X} reset", self.regs.base());
        }
        status
    }

    /// Restart a paused stream, pushing parameters first if needed
    pub fn resume(&self, client: &dyn StreamClient) -> Result<()> {
        let sched = self.platform.scheduler();
        let _op = self.op_lock.lock(sched);
        if self.regs.is_running() {
            return Ok(());
        }
        client.prepare(&self.regs)?;
        self.regs.set_run(true);
        Ok(())
    }

    /// Free bytes in the software ring
    pub fn buffer_avail(&self) -> usize {
        self.with_buffer(|b| b.ring.free())
    }

    /// Bytes buffered and not yet copied to DMA pages
    pub fn buffered(&self) -> usize {
        self.with_buffer(|b| b.ring.len())
    }

    /// (buffered, free, capacity) of the software ring, read together
    pub fn occupancy(&self) -> (usize, usize, usize) {
        self.with_buffer(|b| (b.ring.len(), b.ring.free(), b.ring.capacity()))
    }
}
