//! Simulated HDA hardware and kernel services for integration tests
//!
//! `SimHda` is a register file with just enough controller behaviour to
//! drive the driver end to end: the CORB is consumed by a device thread
//! that answers from a scripted codec model and raises the response
//! interrupt, and stream pages complete on demand through
//! [`SimHda::complete_page`], which records what the "hardware" played.

#![allow(dead_code)]

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hda_kernel::drivers::hda::regs::{reg, ring, sctl, sd, ssts};
use hda_kernel::drivers::hda::HdaError;
use hda_kernel::logger::{self, LogLevel, LogSink};
use hda_kernel::memory::{FrameAllocator, Mmio, PAGE_SIZE};
use hda_kernel::pci::{PciBus, PciConfig, PciDevice};
use hda_kernel::platform::{InterruptHandler, Platform};
use hda_kernel::sync::{Scheduler, WakeReason};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

struct Stderr;

impl LogSink for Stderr {
    fn write_line(&self, _level: LogLevel, line: fmt::Arguments) {
        eprint!("{}", line);
    }
}

static STDERR: Stderr = Stderr;

pub fn init_logging() {
    logger::set_sink(&STDERR);
    logger::set_level(LogLevel::Debug);
}

/// Poll `cond` for up to two seconds
pub fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Condvar-backed scheduler with a one-shot pending signal
pub struct StdScheduler {
    generation: Mutex<u64>,
    wakeup: Condvar,
    signal: AtomicBool,
}

impl StdScheduler {
    pub fn new() -> Self {
        StdScheduler { generation: Mutex::new(0), wakeup: Condvar::new(), signal: AtomicBool::new(false) }
    }

    /// Deliver a signal to the next interruptible wait
    pub fn interrupt(&self) {
        self.signal.store(true, Ordering::SeqCst);
        self.wake_all();
    }
}

impl Scheduler for StdScheduler {
    fn block_until(&self, ready: &dyn Fn() -> bool, interruptible: bool) -> WakeReason {
        let mut gen = self.generation.lock().unwrap();
        loop {
            if ready() {
                return WakeReason::Normal;
            }
            if interruptible && self.signal.swap(false, Ordering::SeqCst) {
                return WakeReason::Interrupted;
            }
            gen = self.wakeup.wait_timeout(gen, Duration::from_millis(5)).unwrap().0;
        }
    }

    fn wake_all(&self) {
        *self.generation.lock().unwrap() += 1;
        self.wakeup.notify_all();
    }

    fn sleep_us(&self, us: u64) {
        if us > 0 {
            thread::sleep(Duration::from_micros(us));
        }
    }
}

// ---------------------------------------------------------------------------
// Page frames
// ---------------------------------------------------------------------------

fn page_layout() -> Layout {
    Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap()
}

/// Heap-backed frames, identity mapped
pub struct SimFrames {
    live: Mutex<HashSet<u64>>,
    budget: Mutex<Option<usize>>,
}

impl SimFrames {
    pub fn new() -> Self {
        SimFrames { live: Mutex::new(HashSet::new()), budget: Mutex::new(None) }
    }

    /// Fail allocations after `frames` more succeed
    pub fn limit(&self, frames: usize) {
        *self.budget.lock().unwrap() = Some(frames);
    }

    pub fn live(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

impl FrameAllocator for SimFrames {
    fn allocate_frame(&self) -> Option<u64> {
        if let Some(left) = self.budget.lock().unwrap().as_mut() {
            if *left == 0 {
                return None;
            }
            *left -= 1;
        }
        let ptr = unsafe { alloc_zeroed(page_layout()) };
        if ptr.is_null() {
            return None;
        }
        self.live.lock().unwrap().insert(ptr as u64);
        Some(ptr as u64)
    }

    fn deallocate_frame(&self, phys: u64) {
        assert!(self.live.lock().unwrap().remove(&phys), "frame {:#x} freed twice", phys);
        unsafe { dealloc(phys as *mut u8, page_layout()) };
    }

    fn phys_to_virt(&self, phys: u64) -> u64 {
        phys
    }
}

// ---------------------------------------------------------------------------
// Codec model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SimWidget {
    pub caps: u32,
    pub pin_caps: u32,
    pub amp_in: u32,
    pub amp_out: u32,
    pub conns: Vec<u8>,
    pub long_form: bool,
    pub config: u32,
}

impl SimWidget {
    pub fn dac(amp_out: u32) -> Self {
        SimWidget { caps: 0x0000_0001, amp_out, ..Default::default() }
    }

    pub fn mixer(conns: &[u8], amp_in: u32) -> Self {
        SimWidget { caps: 0x0020_0100, amp_in, conns: conns.to_vec(), ..Default::default() }
    }

    pub fn pin(pin_caps: u32, conns: &[u8], config: u32) -> Self {
        let conn_bit = if conns.is_empty() { 0 } else { 0x100 };
        SimWidget {
            caps: 0x0040_0000 | conn_bit,
            pin_caps,
            conns: conns.to_vec(),
            config,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimCodec {
    pub vendor: u32,
    pub fg: u8,
    pub first: u8,
    pub count: u8,
    pub widgets: BTreeMap<u8, SimWidget>,
}

/// Output-capable pin with EAPD
pub const PIN_OUT_EAPD: u32 = 0x0001_0010;
pub const PIN_OUT: u32 = 0x0000_0010;
pub const PIN_IN: u32 = 0x0000_0020;

impl SimCodec {
    /// Two output paths: 0x14 (rear line out) -> 0x0C -> 0x02 and
    /// 0x15 (front headphone) -> 0x0D -> 0x03; 0x18 is input only
    pub fn two_outputs(vendor: u32) -> Self {
        let mut widgets = BTreeMap::new();
        widgets.insert(0x02, SimWidget::dac(0x0000_5700));
        widgets.insert(0x03, SimWidget::dac(0x0000_5700));
        widgets.insert(0x0C, SimWidget::mixer(&[0x02], 0x0000_1F00));
        widgets.insert(0x0D, SimWidget::mixer(&[0x03], 0x0000_1F00));
        widgets.insert(0x14, SimWidget::pin(PIN_OUT_EAPD, &[0x0C, 0x0D], 0x0101_4010));
        widgets.insert(0x15, SimWidget::pin(PIN_OUT, &[0x0D], 0x0221_4020));
        widgets.insert(0x18, SimWidget::pin(PIN_IN, &[], 0x01A1_9030));
        SimCodec { vendor, fg: 1, first: 0x02, count: 0x17, widgets }
    }

    /// Enumeration fails: its only widget has a long-form connection list
    pub fn long_form(vendor: u32) -> Self {
        let mut pin = SimWidget::pin(PIN_OUT, &[0x03], 0x0101_4010);
        pin.long_form = true;
        let mut widgets = BTreeMap::new();
        widgets.insert(0x02, pin);
        SimCodec { vendor, fg: 1, first: 0x02, count: 1, widgets }
    }

    fn parameter(&self, nid: u8, id: u8) -> u32 {
        match (nid, id) {
            (0, 0x00) => self.vendor,
            (0, 0x04) => (self.fg as u32) << 16 | 1,
            (n, 0x05) if n == self.fg => 1,
            (n, 0x04) if n == self.fg => (self.first as u32) << 16 | self.count as u32,
            (n, id) => match self.widgets.get(&n) {
                Some(w) => match id {
                    0x09 => w.caps,
                    0x0C => w.pin_caps,
                    0x0D => w.amp_in,
                    0x0E => w.conns.len() as u32 | if w.long_form { 0x80 } else { 0 },
                    0x12 => w.amp_out,
                    _ => 0,
                },
                // Vendor-defined filler
                None if id == 0x09 => 0x00F0_0000,
                None => 0,
            },
        }
    }

    fn conn_entry(&self, nid: u8, offset: usize) -> u32 {
        let conns: &[u8] = match self.widgets.get(&nid) {
            Some(w) => &w.conns,
            None => &[],
        };
        conns
            .iter()
            .skip(offset)
            .take(4)
            .enumerate()
            .fold(0, |word, (i, &n)| word | (n as u32) << (i * 8))
    }

    pub fn respond(&self, nid: u8, payload: u32) -> u32 {
        // GET_PROC_COEF
        if payload >> 16 == 0xC {
            return 0xFFFF;
        }
        match payload >> 8 {
            0xF00 => self.parameter(nid, payload as u8),
            0xF02 => self.conn_entry(nid, (payload & 0xFF) as usize),
            0xF1C => self.widgets.get(&nid).map_or(0, |w| w.config),
            _ => 0,
        }
    }
}

/// Answer verbs from the codec at each address; unknown addresses read 0
pub fn codec_responder(codecs: Vec<(u8, SimCodec)>) -> Responder {
    let codecs: HashMap<u8, SimCodec> = codecs.into_iter().collect();
    Box::new(move |verb| {
        let addr = (verb >> 28) as u8;
        let nid = (verb >> 20) as u8;
        codecs.get(&addr).map_or(0, |c| c.respond(nid, verb & 0xF_FFFF))
    })
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub type Responder = Box<dyn Fn(u32) -> u32 + Send + Sync>;

/// GCAP: 64OK, 4 input, 4 output, no bidirectional streams
pub const GCAP_DEFAULT: u16 = 0x4401;
/// First output descriptor for `GCAP_DEFAULT`
pub const OUTPUT_STREAM: u8 = 4;

#[derive(Debug, Clone)]
pub struct SimHdaConfig {
    pub gcap: u16,
    /// CORBSIZE/RIRBSIZE capability nibble
    pub size_cap: u8,
    pub statests: u16,
    /// Controller already out of reset with the CORB running
    pub running: bool,
}

impl Default for SimHdaConfig {
    fn default() -> Self {
        SimHdaConfig { gcap: GCAP_DEFAULT, size_cap: 0b111, statests: 0x0001, running: false }
    }
}

#[derive(Default)]
struct LinkState {
    corb_rp: u16,
    rirb_wp: u16,
}

pub struct SimHda {
    regs: Mutex<Vec<u8>>,
    link: Mutex<LinkState>,
    positions: Mutex<[usize; 32]>,
    responder: Responder,
    verbs: Mutex<Vec<u32>>,
    irq: Mutex<Option<InterruptHandler>>,
    irq_serial: Mutex<()>,
    doorbell: Mutex<mpsc::Sender<()>>,
    played: Mutex<Vec<u8>>,
    /// Deepest CORB backlog the device has seen
    max_backlog: Mutex<u16>,
}

fn get(r: &[u8], off: u32, width: usize) -> u32 {
    let off = off as usize;
    r[off..off + width].iter().rev().fold(0, |v, &b| v << 8 | b as u32)
}

fn put(r: &mut [u8], off: u32, width: usize, val: u32) {
    let off = off as usize;
    for (i, b) in r[off..off + width].iter_mut().enumerate() {
        *b = (val >> (i * 8)) as u8;
    }
}

fn sd_reg(index: u8, off: u32) -> u32 {
    reg::SD_BASE + index as u32 * reg::SD_SIZE + off
}

fn ring_entries(size_reg: u8) -> u16 {
    match size_reg & 3 {
        0 => 2,
        1 => 16,
        _ => 256,
    }
}

impl SimHda {
    pub fn new(config: SimHdaConfig, responder: Responder) -> Arc<Self> {
        let mut regs = vec![0u8; reg::MMIO_LEN];
        put(&mut regs, reg::GCAP, 2, config.gcap as u32);
        put(&mut regs, reg::VMAJ, 1, 1);
        put(&mut regs, reg::STATESTS, 2, config.statests as u32);
        put(&mut regs, reg::CORBSIZE, 1, (config.size_cap as u32) << 4);
        put(&mut regs, reg::RIRBSIZE, 1, (config.size_cap as u32) << 4);
        if config.running {
            put(&mut regs, reg::GCTL, 4, 1);
            put(&mut regs, reg::CORBCTL, 1, ring::CORBRUN as u32);
            put(&mut regs, reg::RIRBCTL, 1, (ring::RIRBDMAEN | ring::RINTCTL) as u32);
        }

        let (tx, rx) = mpsc::channel();
        let hda = Arc::new(SimHda {
            regs: Mutex::new(regs),
            link: Mutex::new(LinkState::default()),
            positions: Mutex::new([0; 32]),
            responder,
            verbs: Mutex::new(Vec::new()),
            irq: Mutex::new(None),
            irq_serial: Mutex::new(()),
            doorbell: Mutex::new(tx),
            played: Mutex::new(Vec::new()),
            max_backlog: Mutex::new(0),
        });

        let weak = Arc::downgrade(&hda);
        thread::spawn(move || {
            while rx.recv().is_ok() {
                match weak.upgrade() {
                    Some(hda) => hda.process_corb(),
                    None => break,
                }
            }
        });
        hda
    }

    pub fn with_codecs(config: SimHdaConfig, codecs: Vec<(u8, SimCodec)>) -> Arc<Self> {
        Self::new(config, codec_responder(codecs))
    }

    pub fn set_irq(&self, handler: InterruptHandler) {
        *self.irq.lock().unwrap() = Some(handler);
    }

    /// Unbind the interrupt handler, waiting out one that is running
    pub fn clear_irq(&self) {
        let _serial = self.irq_serial.lock().unwrap();
        self.irq.lock().unwrap().take();
    }

    pub fn has_irq(&self) -> bool {
        self.irq.lock().unwrap().is_some()
    }

    fn raise_irq(&self) {
        let _serial = self.irq_serial.lock().unwrap();
        if let Some(handler) = self.irq.lock().unwrap().as_ref() {
            handler();
        }
    }

    /// Every verb the codecs have received, in link order
    pub fn verbs(&self) -> Vec<u32> {
        self.verbs.lock().unwrap().clone()
    }

    pub fn verb_count(&self) -> usize {
        self.verbs.lock().unwrap().len()
    }

    /// Bytes the output DMA has consumed so far
    pub fn played(&self) -> Vec<u8> {
        self.played.lock().unwrap().clone()
    }

    /// Played pages that carry any non-zero byte
    pub fn played_data_pages(&self) -> Vec<Vec<u8>> {
        self.played()
            .chunks(PAGE_SIZE)
            .filter(|p| p.iter().any(|&b| b != 0))
            .map(|p| p.to_vec())
            .collect()
    }

    pub fn reg8(&self, off: u32) -> u8 {
        get(&self.regs.lock().unwrap(), off, 1) as u8
    }

    pub fn reg16(&self, off: u32) -> u16 {
        get(&self.regs.lock().unwrap(), off, 2) as u16
    }

    pub fn reg32(&self, off: u32) -> u32 {
        get(&self.regs.lock().unwrap(), off, 4)
    }

    pub fn stream_reg8(&self, index: u8, off: u32) -> u8 {
        self.reg8(sd_reg(index, off))
    }

    pub fn stream_reg16(&self, index: u8, off: u32) -> u16 {
        self.reg16(sd_reg(index, off))
    }

    pub fn stream_reg32(&self, index: u8, off: u32) -> u32 {
        self.reg32(sd_reg(index, off))
    }

    pub fn stream_running(&self, index: u8) -> bool {
        self.stream_reg8(index, sd::CTL) & sctl::RUN != 0
    }

    /// Contents of the DMA page behind BDL entry `entry` of stream `index`
    pub fn dma_page(&self, index: u8, entry: usize) -> Vec<u8> {
        let bdl = {
            let r = self.regs.lock().unwrap();
            get(&r, sd_reg(index, sd::BDLPL), 4) as u64
                | (get(&r, sd_reg(index, sd::BDLPU), 4) as u64) << 32
        };
        let (addr, len) = unsafe {
            let desc = (bdl as usize + entry * 16) as *const u8;
            (
                std::ptr::read_volatile(desc as *const u64),
                std::ptr::read_volatile(desc.add(8) as *const u32) as usize,
            )
        };
        let mut data = vec![0u8; len];
        for (i, b) in data.iter_mut().enumerate() {
            *b = unsafe { std::ptr::read_volatile((addr as usize + i) as *const u8) };
        }
        data
    }

    /// Play the next BDL entry of a running stream and raise its interrupt
    pub fn complete_page(&self, index: u8) -> bool {
        let page = {
            let mut r = self.regs.lock().unwrap();
            let ctl = get(&r, sd_reg(index, sd::CTL), 1) as u8;
            if ctl & sctl::RUN == 0 {
                return false;
            }
            let lvi = get(&r, sd_reg(index, sd::LVI), 2) as usize;
            let mut positions = self.positions.lock().unwrap();
            let entry = positions[index as usize];
            positions[index as usize] = (entry + 1) % (lvi + 1);

            let sts = get(&r, sd_reg(index, sd::STS), 1) as u8;
            put(&mut r, sd_reg(index, sd::STS), 1, (sts | ssts::BCIS) as u32);
            put(&mut r, sd_reg(index, sd::LPIB), 4, ((entry + 1) * PAGE_SIZE) as u32);
            entry
        };
        let data = self.dma_page(index, page);
        self.played.lock().unwrap().extend_from_slice(&data);
        self.raise_irq();
        true
    }

    /// INTSTS: stream bits from BCIS + IOCE, CIS from RIRBSTS
    fn intsts(r: &[u8]) -> u32 {
        let mut status = 0;
        for index in 0..30u8 {
            let ctl = get(r, sd_reg(index, sd::CTL), 1) as u8;
            let sts = get(r, sd_reg(index, sd::STS), 1) as u8;
            if ctl & sctl::IOCE != 0 && sts & ssts::BCIS != 0 {
                status |= 1 << index;
            }
        }
        if get(r, reg::RIRBSTS, 1) as u8 & ring::INTFL != 0 {
            status |= 1 << 30;
        }
        status
    }

    /// Device side of the command rings
    fn process_corb(&self) {
        let mut link = self.link.lock().unwrap();
        let (corb_base, rirb_base, corb_n, rirb_n, wp, irq_enabled) = {
            let r = self.regs.lock().unwrap();
            if get(&r, reg::CORBCTL, 1) as u8 & ring::CORBRUN == 0 {
                return;
            }
            let rirbctl = get(&r, reg::RIRBCTL, 1) as u8;
            if rirbctl & ring::RIRBDMAEN == 0 {
                return;
            }
            (
                get(&r, reg::CORBLBASE, 4) as u64 | (get(&r, reg::CORBUBASE, 4) as u64) << 32,
                get(&r, reg::RIRBLBASE, 4) as u64 | (get(&r, reg::RIRBUBASE, 4) as u64) << 32,
                ring_entries(get(&r, reg::CORBSIZE, 1) as u8),
                ring_entries(get(&r, reg::RIRBSIZE, 1) as u8),
                get(&r, reg::CORBWP, 2) as u16 & ring::WP_MASK,
                rirbctl & ring::RINTCTL != 0,
            )
        };

        let backlog = (wp % corb_n + corb_n - link.corb_rp) % corb_n;
        {
            let mut max = self.max_backlog.lock().unwrap();
            *max = (*max).max(backlog);
        }

        let mut answered = false;
        while link.corb_rp != wp % corb_n {
            link.corb_rp = (link.corb_rp + 1) % corb_n;
            let verb = unsafe {
                std::ptr::read_volatile((corb_base as usize + link.corb_rp as usize * 4) as *const u32)
            };
            self.verbs.lock().unwrap().push(verb);
            let data = (self.responder)(verb);
            link.rirb_wp = (link.rirb_wp + 1) % rirb_n;
            let entry = data as u64 | ((verb >> 28) as u64) << 32;
            unsafe {
                std::ptr::write_volatile(
                    (rirb_base as usize + link.rirb_wp as usize * 8) as *mut u64,
                    entry,
                );
            }
            answered = true;
        }
        if !answered {
            return;
        }
        {
            let mut r = self.regs.lock().unwrap();
            put(&mut r, reg::RIRBWP, 2, link.rirb_wp as u32);
            let sts = get(&r, reg::RIRBSTS, 1) as u8;
            put(&mut r, reg::RIRBSTS, 1, (sts | ring::INTFL) as u32);
        }
        drop(link);
        if irq_enabled {
            self.raise_irq();
        }
    }

    /// Most verbs that were ever waiting in the CORB at once
    pub fn max_backlog(&self) -> u16 {
        *self.max_backlog.lock().unwrap()
    }

    /// Write one RIRB entry no verb asked for and raise the response
    /// interrupt, as a codec event or a glitching controller would
    pub fn inject_response(&self, entry: u64) {
        let mut link = self.link.lock().unwrap();
        let (rirb_base, rirb_n, irq_enabled) = {
            let r = self.regs.lock().unwrap();
            let rirbctl = get(&r, reg::RIRBCTL, 1) as u8;
            (
                get(&r, reg::RIRBLBASE, 4) as u64 | (get(&r, reg::RIRBUBASE, 4) as u64) << 32,
                ring_entries(get(&r, reg::RIRBSIZE, 1) as u8),
                rirbctl & ring::RINTCTL != 0,
            )
        };
        link.rirb_wp = (link.rirb_wp + 1) % rirb_n;
        unsafe {
            std::ptr::write_volatile(
                (rirb_base as usize + link.rirb_wp as usize * 8) as *mut u64,
                entry,
            );
        }
        {
            let mut r = self.regs.lock().unwrap();
            put(&mut r, reg::RIRBWP, 2, link.rirb_wp as u32);
            let sts = get(&r, reg::RIRBSTS, 1) as u8;
            put(&mut r, reg::RIRBSTS, 1, (sts | ring::INTFL) as u32);
        }
        drop(link);
        if irq_enabled {
            self.raise_irq();
        }
    }

    fn is_stream_reg(off: u32, field: u32) -> Option<u8> {
        if off < reg::SD_BASE {
            return None;
        }
        let rel = off - reg::SD_BASE;
        if rel % reg::SD_SIZE == field && rel / reg::SD_SIZE < 30 {
            Some((rel / reg::SD_SIZE) as u8)
        } else {
            None
        }
    }

    fn write(&self, off: u32, width: usize, val: u32) {
        let mut ring_doorbell = false;
        let mut reset_corb_rp = false;
        let mut reset_rirb_wp = false;
        {
            let mut r = self.regs.lock().unwrap();
            match (off, width) {
                (reg::RIRBSTS, 1) | (reg::STATESTS, 2) => {
                    let old = get(&r, off, width);
                    put(&mut r, off, width, old & !val);
                }
                (reg::CORBSIZE, 1) | (reg::RIRBSIZE, 1) => {
                    let old = get(&r, off, 1);
                    put(&mut r, off, 1, (old & 0xF0) | (val & 0x03));
                }
                (reg::CORBWP, 2) => {
                    put(&mut r, off, 2, val);
                    ring_doorbell = true;
                }
                (reg::CORBRP, 2) => {
                    reset_corb_rp = val & 0x8000 != 0;
                    put(&mut r, off, 2, val);
                }
                (reg::RIRBWP, 2) => {
                    if val & 0x8000 != 0 {
                        reset_rirb_wp = true;
                        put(&mut r, off, 2, 0);
                    }
                }
                _ if width == 1 && Self::is_stream_reg(off, sd::STS).is_some() => {
                    let old = get(&r, off, 1);
                    put(&mut r, off, 1, old & !val);
                }
                _ if width == 1 && Self::is_stream_reg(off, sd::CTL).is_some() => {
                    if val as u8 & sctl::SRST != 0 {
                        let index = Self::is_stream_reg(off, sd::CTL).unwrap_or(0);
                        self.positions.lock().unwrap()[index as usize] = 0;
                        put(&mut r, sd_reg(index, sd::STS), 1, 0);
                        put(&mut r, sd_reg(index, sd::LPIB), 4, 0);
                    }
                    put(&mut r, off, 1, val);
                }
                _ => put(&mut r, off, width, val),
            }
        }
        if reset_corb_rp {
            self.link.lock().unwrap().corb_rp = 0;
        }
        if reset_rirb_wp {
            self.link.lock().unwrap().rirb_wp = 0;
        }
        if ring_doorbell {
            let _ = self.doorbell.lock().unwrap().send(());
        }
    }
}

impl Mmio for SimHda {
    fn read8(&self, offset: u32) -> u8 {
        get(&self.regs.lock().unwrap(), offset, 1) as u8
    }

    fn read16(&self, offset: u32) -> u16 {
        get(&self.regs.lock().unwrap(), offset, 2) as u16
    }

    fn read32(&self, offset: u32) -> u32 {
        let r = self.regs.lock().unwrap();
        if offset == reg::INTSTS {
            return Self::intsts(&r);
        }
        get(&r, offset, 4)
    }

    fn write8(&self, offset: u32, val: u8) {
        self.write(offset, 1, val as u32);
    }

    fn write16(&self, offset: u32, val: u16) {
        self.write(offset, 2, val as u32);
    }

    fn write32(&self, offset: u32, val: u32) {
        self.write(offset, 4, val);
    }
}

// ---------------------------------------------------------------------------
// PCI
// ---------------------------------------------------------------------------

pub const BAR0: u32 = 0xFEB0_0000;
const MSI_CAP: u8 = 0x50;

pub struct SimPci {
    devices: Vec<PciDevice>,
    space: Mutex<HashMap<(u8, u8, u8), [u32; 64]>>,
}

impl SimPci {
    pub fn new() -> Self {
        SimPci { devices: Vec::new(), space: Mutex::new(HashMap::new()) }
    }

    /// Add a function; `msi` adds a 64-bit MSI capability
    pub fn add(&mut self, dev: PciDevice, msi: bool) {
        let mut space = [0u32; 64];
        space[0] = dev.vendor_id as u32 | (dev.device_id as u32) << 16;
        // Legacy I/O decode on, capability list present
        space[1] = 0x0001 | if msi { 0x0010 << 16 } else { 0 };
        space[2] = (dev.class_code as u32) << 24 | (dev.subclass as u32) << 16;
        for (i, bar) in dev.bar.iter().enumerate() {
            space[4 + i] = *bar;
        }
        if msi {
            space[0x34 / 4] = MSI_CAP as u32;
            space[MSI_CAP as usize / 4] = 0x05 | 0x0080 << 16;
        }
        self.space.lock().unwrap().insert((dev.bus, dev.device, dev.function), space);
        self.devices.push(dev);
    }

    pub fn dword(&self, dev: &PciDevice, offset: u8) -> u32 {
        self.space.lock().unwrap()[&(dev.bus, dev.device, dev.function)][offset as usize / 4]
    }

    pub fn command(&self, dev: &PciDevice) -> u16 {
        self.dword(dev, 0x04) as u16
    }

    pub fn msi_enabled(&self, dev: &PciDevice) -> bool {
        (self.dword(dev, MSI_CAP) >> 16) & 1 != 0
    }

    pub fn msi_data(&self, dev: &PciDevice) -> u16 {
        self.dword(dev, MSI_CAP + 12) as u16
    }
}

impl PciConfig for SimPci {
    fn read32(&self, dev: &PciDevice, offset: u8) -> u32 {
        self.dword(dev, offset)
    }

    fn write32(&self, dev: &PciDevice, offset: u8, value: u32) {
        if let Some(space) = self.space.lock().unwrap().get_mut(&(dev.bus, dev.device, dev.function)) {
            space[offset as usize / 4] = value;
        }
    }
}

impl PciBus for SimPci {
    fn devices(&self) -> Vec<PciDevice> {
        self.devices.clone()
    }

    fn config(&self) -> &dyn PciConfig {
        self
    }
}

/// An HDA-class function with a 32-bit memory BAR0
pub fn hda_function(device: u8) -> PciDevice {
    let mut bar = [0u32; 6];
    bar[0] = BAR0 + device as u32 * 0x10000;
    PciDevice {
        bus: 0,
        device,
        function: 0,
        vendor_id: 0x8086,
        device_id: 0x293E,
        class_code: 0x04,
        subclass: 0x03,
        bar,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

pub struct SimPlatform {
    pub frames: SimFrames,
    pub sched: StdScheduler,
    windows: Mutex<HashMap<u64, Arc<SimHda>>>,
    last_mapped: Mutex<Option<Arc<SimHda>>>,
    vectors: Mutex<Vec<u8>>,
    next_vector: Mutex<u8>,
    bound: Mutex<HashMap<u8, Arc<SimHda>>>,
    pub vectors_left: Mutex<usize>,
}

impl SimPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(SimPlatform {
            frames: SimFrames::new(),
            sched: StdScheduler::new(),
            windows: Mutex::new(HashMap::new()),
            last_mapped: Mutex::new(None),
            vectors: Mutex::new(Vec::new()),
            next_vector: Mutex::new(0x40),
            bound: Mutex::new(HashMap::new()),
            vectors_left: Mutex::new(16),
        })
    }

    /// Back the register window at `phys` with `hda`
    pub fn attach(&self, phys: u64, hda: Arc<SimHda>) {
        self.windows.lock().unwrap().insert(phys, hda);
    }

    /// Vectors currently allocated, in allocation order
    pub fn vectors(&self) -> Vec<u8> {
        self.vectors.lock().unwrap().clone()
    }
}

impl Platform for SimPlatform {
    fn frames(&self) -> &dyn FrameAllocator {
        &self.frames
    }

    fn scheduler(&self) -> &dyn Scheduler {
        &self.sched
    }

    fn map_mmio(&self, phys: u64, _len: usize) -> hda_kernel::drivers::hda::Result<Arc<dyn Mmio>> {
        let hda = self.windows.lock().unwrap().get(&phys).cloned().ok_or(HdaError::Fault)?;
        *self.last_mapped.lock().unwrap() = Some(hda.clone());
        let mmio: Arc<dyn Mmio> = hda;
        Ok(mmio)
    }

    /// Vectors are handed out from 0x40; each is wired to the register
    /// window mapped last
    fn allocate_vector(&self, handler: InterruptHandler) -> Option<u8> {
        let mut left = self.vectors_left.lock().unwrap();
        if *left == 0 {
            return None;
        }
        *left -= 1;
        let vector = {
            let mut next = self.next_vector.lock().unwrap();
            *next += 1;
            *next - 1
        };
        self.vectors.lock().unwrap().push(vector);

        if let Some(hda) = self.last_mapped.lock().unwrap().clone() {
            hda.set_irq(handler);
            self.bound.lock().unwrap().insert(vector, hda);
        }
        Some(vector)
    }

    fn free_vector(&self, vector: u8) {
        self.vectors.lock().unwrap().retain(|&v| v != vector);
        *self.vectors_left.lock().unwrap() += 1;
        if let Some(hda) = self.bound.lock().unwrap().remove(&vector) {
            hda.clear_irq();
        }
    }
}

/// One controller with the given codecs, behind one PCI function
pub struct Rig {
    pub platform: Arc<SimPlatform>,
    pub pci: SimPci,
    pub hda: Arc<SimHda>,
    pub dev: PciDevice,
}

impl Rig {
    pub fn new(config: SimHdaConfig, codecs: Vec<(u8, SimCodec)>) -> Self {
        Self::build(config, codecs, true)
    }

    pub fn build(config: SimHdaConfig, codecs: Vec<(u8, SimCodec)>, msi: bool) -> Self {
        init_logging();
        let platform = SimPlatform::new();
        let hda = SimHda::with_codecs(config, codecs);
        let dev = hda_function(2);
        platform.attach(dev.bar_address(0).unwrap(), hda.clone());
        let mut pci = SimPci::new();
        pci.add(dev.clone(), msi);
        Rig { platform, pci, hda, dev }
    }

    /// One Realtek-like codec at address 0 with two output paths
    pub fn standard() -> Self {
        Self::new(SimHdaConfig::default(), vec![(0, SimCodec::two_outputs(0x10EC_0269))])
    }

    pub fn platform(&self) -> Arc<dyn Platform> {
        self.platform.clone()
    }
}
