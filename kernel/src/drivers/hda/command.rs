//! CORB/RIRB command engine (Intel HDA Spec §4.4.1, §4.4.2)
//!
//! Verbs go out through the Command Outgoing Ring Buffer and come back
//! through the Response Inbound Ring Buffer. Both rings live in one DMA
//! page. The codecs answer verbs in the order they were written, so a
//! submitter queues itself behind every earlier submitter and sleeps; the
//! response interrupt walks the newly written RIRB slots and hands each
//! solicited response to the oldest waiter.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use super::error::{HdaError, Result};
use super::regs::{reg, ring};
use super::verb::{Response, Verb, VerbTransport};
use crate::arch;
use crate::memory::{DmaPage, Mmio};
use crate::platform::Platform;
use crate::sync::{Completion, Semaphore};

const CORB_OFFSET: usize = 0;
const RIRB_OFFSET: usize = 2048;

/// CORBRP / RIRBWP: pointer reset
const PTR_RESET: u16 = 1 << 15;

/// Decode a CORBSIZE/RIRBSIZE capability field into (entries, size select)
pub fn ring_size(size_reg: u8) -> Result<(u16, u8)> {
    let cap = (size_reg >> 4) & 0xF;
    if cap & 0b100 != 0 {
        Ok((256, 2))
    } else if cap & 0b010 != 0 {
        Ok((16, 1))
    } else if cap & 0b001 != 0 {
        Ok((2, 0))
    } else {
        Err(HdaError::Malformed("ring size capability empty"))
    }
}

/// One in-flight verb
struct Pending {
    done: Completion,
    response: AtomicU64,
}

struct Rings {
    corb_ptr: u16,
    /// Next RIRB slot the interrupt handler has not consumed
    next: u16,
    /// In submission order
    waiters: VecDeque<Arc<Pending>>,
}

pub struct CommandEngine {
    mmio: Arc<dyn Mmio>,
    platform: Arc<dyn Platform>,
    page: DmaPage,
    corb_size: u16,
    rirb_size: u16,
    /// Bounds in-flight verbs so the RIRB never laps its reader
    slots: Semaphore,
    rings: Mutex<Rings>,
}

impl CommandEngine {
    /// Allocate the ring page and program both rings (DMA left stopped)
    pub fn new(mmio: Arc<dyn Mmio>, platform: Arc<dyn Platform>) -> Result<Self> {
        let page = DmaPage::allocate(platform.frames())?;
        let sched = platform.scheduler();

        mmio.write8(reg::CORBCTL, 0);
        mmio.write8(reg::RIRBCTL, 0);

        let (corb_size, corb_sel) = match ring_size(mmio.read8(reg::CORBSIZE)) {
            Ok(size) => size,
            Err(e) => {
                page.release(platform.frames());
                return Err(e);
            }
        };
        let (rirb_size, rirb_sel) = match ring_size(mmio.read8(reg::RIRBSIZE)) {
            Ok(size) => size,
            Err(e) => {
                page.release(platform.frames());
                return Err(e);
            }
        };
        let old = mmio.read8(reg::CORBSIZE);
        mmio.write8(reg::CORBSIZE, (old & !3) | corb_sel);
        let old = mmio.read8(reg::RIRBSIZE);
        mmio.write8(reg::RIRBSIZE, (old & !3) | rirb_sel);

        let corb_phys = page.phys() + CORB_OFFSET as u64;
        let rirb_phys = page.phys() + RIRB_OFFSET as u64;
        mmio.write32(reg::CORBLBASE, corb_phys as u32);
        mmio.write32(reg::CORBUBASE, (corb_phys >> 32) as u32);
        mmio.write32(reg::RIRBLBASE, rirb_phys as u32);
        mmio.write32(reg::RIRBUBASE, (rirb_phys >> 32) as u32);

        // Reset CORB read pointer
        mmio.write16(reg::CORBRP, PTR_RESET);
        sched.sleep_us(100);
        mmio.write16(reg::CORBRP, 0);
        sched.sleep_us(100);
        mmio.write16(reg::CORBWP, 0);

        mmio.write16(reg::RIRBWP, PTR_RESET);
        mmio.write16(reg::RINTCNT, 1);

        crate::log!(
            "[HDA] CORB: {} entries, RIRB: {} entries, ring page {:#X}",
            corb_size,
            rirb_size,
            page.phys()
        );

        let in_flight = (corb_size.min(rirb_size) as i32 - 1).max(1);
        let mut waiters = VecDeque::new();
        if waiters.try_reserve_exact(in_flight as usize).is_err() {
            page.release(platform.frames());
            return Err(HdaError::NoMemory);
        }

        Ok(CommandEngine {
            mmio,
            platform,
            page,
            corb_size,
            rirb_size,
            slots: Semaphore::new(in_flight),
            rings: Mutex::new(Rings { corb_ptr: 0, next: 1 % rirb_size, waiters }),
        })
    }

    /// Start CORB and RIRB DMA with an interrupt per response
    pub fn start(&self) {
        self.mmio.write8(reg::CORBCTL, ring::CORBRUN);
        self.mmio.write8(reg::RIRBCTL, ring::RIRBDMAEN | ring::RINTCTL);
    }

    /// Stop both rings and hand the ring page back
    pub fn shutdown(self) {
        self.mmio.write8(reg::CORBCTL, 0);
        self.mmio.write8(reg::RIRBCTL, 0);
        self.page.release(self.platform.frames());
    }

    pub fn corb_size(&self) -> u16 {
        self.corb_size
    }

    pub fn rirb_size(&self) -> u16 {
        self.rirb_size
    }

    /// Response interrupt: deliver every response written since the last
    /// call, in ring order; returns how many reached a waiter
    ///
    /// Every written slot is consumed. Unsolicited responses and responses
    /// nobody waits for are logged and dropped.
    pub fn handle_responses(&self) -> usize {
        let sched = self.platform.scheduler();
        arch::without_interrupts(|| {
            let mut rings = self.rings.lock();
            let wp = (self.mmio.read16(reg::RIRBWP) & ring::WP_MASK) % self.rirb_size;

            // Nothing new since the previous walk
            if (wp + 1) % self.rirb_size == rings.next {
                return 0;
            }

            let mut slot = rings.next;
            let mut delivered = 0;
            loop {
                let response =
                    Response::from_u64(self.page.read_u64(RIRB_OFFSET + slot as usize * 8));
                if response.is_unsolicited() {
                    crate::log_debug!(
                        "[HDA] unsolicited response {:08X} from codec {}",
                        response.data,
                        response.extended & 0xF
                    );
                } else if let Some(pending) = rings.waiters.pop_front() {
                    pending.response.store(response.to_u64(), Ordering::Release);
                    pending.done.signal(sched);
                    delivered += 1;
                } else {
                    crate::log_error!(
                        "[HDA] RIRB slot {}: response {:08X} with no waiter dropped",
                        slot,
                        response.data
                    );
                }

                if slot == wp {
                    break;
                }
                slot = (slot + 1) % self.rirb_size;
            }
            rings.next = (wp + 1) % self.rirb_size;
            delivered
        })
    }
}

impl VerbTransport for CommandEngine {
    fn send(&self, verb: Verb) -> Result<Response> {
        let sched = self.platform.scheduler();
        self.slots.acquire(sched, false)?;

        let pending = Arc::new(Pending { done: Completion::new(), response: AtomicU64::new(0) });

        arch::without_interrupts(|| {
            let mut rings = self.rings.lock();
            // Queued before the doorbell so the answer always finds it
            rings.waiters.push_back(pending.clone());
            rings.corb_ptr = (rings.corb_ptr + 1) % self.corb_size;
            let corb_slot = rings.corb_ptr;
            self.page.write_u32(CORB_OFFSET + corb_slot as usize * 4, verb.raw());
            self.mmio.write16(reg::CORBWP, corb_slot);
        });

        pending.done.wait(sched);
        let response = Response::from_u64(pending.response.load(Ordering::Acquire));
        self.slots.release(sched);

        #[cfg(feature = "verb-trace")]
        crate::log_debug!("[HDA] verb {:08X} -> {:08X}", verb.raw(), response.data);

        Ok(response)
    }
}
