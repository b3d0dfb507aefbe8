//! Codecs and their playback devices
//!
//! Each output path becomes one [`HdaOutput`]. All outputs of a codec
//! share the controller's single output stream, so a codec admits one
//! open device at a time and has at most one path routed.

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::codec::CodecTopology;
use super::controller::HdaController;
use super::error::{HdaError, Result};
use super::format::{self, HwParams, MAX_CHANNELS, MAX_RATE, MIN_RATE};
use super::path::{self, Path, PathState};
use super::stream::{StreamClient, StreamRegs};
use super::verb::CodecLink;
use crate::arch;
use crate::oss::{
    AudioDevice, DspCaps, PcmSource, AFMT_S16_LE, AFMT_U16_LE, AFMT_U8, STANDARD_RATES,
};
use crate::sync::{Scheduler, Semaphore, SleepLock};

pub static HDA_CAPS: DspCaps = DspCaps {
    formats: AFMT_U8 | AFMT_U16_LE | AFMT_S16_LE,
    min_rate: MIN_RATE as i32,
    max_rate: MAX_RATE as i32,
    min_channels: 1,
    max_channels: MAX_CHANNELS as i32,
    rates: &STANDARD_RATES,
};

/// One codec on the link
pub struct Codec {
    pub addr: u8,
    pub topology: CodecTopology,
    pub paths: Vec<Path>,
    /// Index of the routed path; held across activation verbs
    active: SleepLock<Option<usize>>,
    /// Device-open ownership
    exclusive: Semaphore,
}

impl Codec {
    pub fn new(addr: u8, topology: CodecTopology, routes: Vec<Vec<u8>>, params: HwParams) -> Self {
        Codec {
            addr,
            topology,
            paths: routes.into_iter().map(|widgets| Path::new(widgets, params)).collect(),
            active: SleepLock::new(None),
            exclusive: Semaphore::new(1),
        }
    }

    /// Path currently routed to the output converter, if any
    pub fn active_path(&self, sched: &dyn Scheduler) -> Option<usize> {
        *self.active.lock(sched)
    }
}

/// Playback device for one output path
pub struct HdaOutput {
    ctrl: Arc<HdaController>,
    codec: Arc<Codec>,
    index: usize,
}

impl HdaOutput {
    pub fn new(ctrl: Arc<HdaController>, codec: Arc<Codec>, index: usize) -> Self {
        HdaOutput { ctrl, codec, index }
    }

    pub fn path(&self) -> &Path {
        &self.codec.paths[self.index]
    }

    /// Snapshot of the path's negotiable state
    pub fn state(&self) -> PathState {
        arch::without_interrupts(|| *self.path().state.lock())
    }

    fn update<R>(&self, f: impl FnOnce(&mut PathState) -> R) -> R {
        arch::without_interrupts(|| f(&mut self.path().state.lock()))
    }
}

impl StreamClient for HdaOutput {
    fn fragment(&self) -> (usize, usize) {
        let config = self.ctrl.config();
        self.update(|st| {
            if st.fragment_count == 0 {
                st.fragment_count = config.fragment_count.max(1);
            }
            if st.fragment_size == 0 {
                let per_ms = st.params.bytes_per_second() / 1000;
                st.fragment_size = (per_ms * config.fragment_ms).max(1);
            }
            (st.fragment_size, st.fragment_count)
        })
    }

    fn prepare(&self, regs: &StreamRegs) -> Result<()> {
        let sched = self.ctrl.scheduler();
        let link = CodecLink::new(self.ctrl.commands(), self.codec.addr);
        let path = self.path();

        let mut active = self.codec.active.lock(sched);
        let activated = if *active != Some(self.index) {
            *active = None;
            path::activate(&link, &self.codec.topology, &path.widgets)?;
            *active = Some(self.index);
            true
        } else {
            false
        };

        let (params, dirty) = self.update(|st| (st.params, st.dirty));
        if dirty || activated {
            let actual = path::push_params(&link, path.converter(), regs, &params)?;
            self.update(|st| {
                st.params = actual;
                st.dirty = false;
            });
            crate::log!(
                "[HDA] codec {} path {}: {} Hz, {} bit, {} ch",
                self.codec.addr,
                self.index,
                actual.rate,
                actual.bits,
                actual.channels
            );
        }
        Ok(())
    }

    fn invalidate(&self) {
        self.path().mark_dirty();
        let active = *self.codec.active.lock(self.ctrl.scheduler());
        if let Some(other) = active {
            self.codec.paths[other].mark_dirty();
        }
    }
}

impl AudioDevice for HdaOutput {
    fn caps(&self) -> &DspCaps {
        &HDA_CAPS
    }

    fn set_rate(&self, rate: i32) -> i32 {
        let rate = rate.clamp(HDA_CAPS.min_rate, HDA_CAPS.max_rate) as u32;
        self.update(|st| {
            if st.params.rate != rate {
                st.params.rate = rate;
                st.dirty = true;
            }
            format::negotiate(&st.params).1.rate as i32
        })
    }

    fn set_channels(&self, channels: i32) -> i32 {
        let channels = channels.clamp(HDA_CAPS.min_channels, HDA_CAPS.max_channels) as u8;
        self.update(|st| {
            if st.params.channels != channels {
                st.params.channels = channels;
                st.dirty = true;
            }
        });
        channels as i32
    }

    fn set_format(&self, fmt: i32) -> i32 {
        let (bits, signed, chosen) = match fmt {
            AFMT_U16_LE => (16, Some(false), AFMT_U16_LE),
            AFMT_S16_LE => (16, Some(true), AFMT_S16_LE),
            _ => (8, None, AFMT_U8),
        };
        self.update(|st| {
            if st.params.bits != bits {
                st.params.bits = bits;
                st.dirty = true;
            }
            if let Some(signed) = signed {
                st.signed = signed;
            }
        });
        chosen
    }

    fn set_fragment(&self, size: usize, count: usize) {
        self.update(|st| {
            st.fragment_size = size;
            st.fragment_count = count;
        });
    }

    fn queue(&self, source: &mut dyn PcmSource) -> Result<usize> {
        self.ctrl.output_stream()?.queue(self, source)
    }

    fn pause(&self, wait: bool, reset: bool) -> Result<()> {
        self.ctrl.output_stream()?.pause(self, wait, reset)
    }

    fn resume(&self) -> Result<()> {
        self.ctrl.output_stream()?.resume(self)
    }

    fn get_buffer_avail(&self) -> Result<usize> {
        Ok(self.ctrl.output_stream()?.buffer_avail())
    }

    fn open(&self) -> Result<()> {
        if self.codec.exclusive.try_acquire() {
            Ok(())
        } else {
            Err(HdaError::Busy)
        }
    }

    fn close(&self) -> Result<()> {
        self.codec.exclusive.release_limit(self.ctrl.scheduler(), 1);
        Ok(())
    }
}
