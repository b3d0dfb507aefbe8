//! Controller bring-up and interrupt dispatch (Intel HDA Spec §4.2)

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Once;

use super::codec::{self, default_device_name, location_name};
use super::command::CommandEngine;
use super::device::{Codec, HdaOutput};
use super::error::{HdaError, Result};
use super::regs::{gcap, gctl, intctl, reg, ring, sctl, sd};
use super::stream::{Stream, StreamRegs};
use super::verb::CodecLink;
use super::{poll_until, HdaConfig};
use crate::memory::Mmio;
use crate::oss::DspRegistry;
use crate::pci::{self, cap_id, command, PciConfig, PciDevice};
use crate::platform::Platform;
use crate::sync::Scheduler;

/// STATESTS: one bit per codec address
const MAX_CODECS: u8 = 15;

/// INTCTL / INTSTS carry one bit per stream for streams 0..=29 only
const MAX_STREAM_BITS: u8 = 30;

pub struct HdaController {
    platform: Arc<dyn Platform>,
    mmio: Arc<dyn Mmio>,
    config: HdaConfig,
    pci: PciDevice,
    num_iss: u8,
    num_oss: u8,
    num_bss: u8,
    commands: CommandEngine,
    output: Once<Stream>,
    codecs: Once<Vec<Arc<Codec>>>,
}

impl HdaController {
    /// Bring one controller from power-on state to streaming-ready
    pub fn init(
        dev: &PciDevice,
        cfg: &dyn PciConfig,
        platform: Arc<dyn Platform>,
        config: &HdaConfig,
    ) -> Result<Arc<Self>> {
        // Memory space + bus master on, legacy I/O and INTx off
        pci::update_command(
            cfg,
            dev,
            command::MEMORY_SPACE | command::BUS_MASTER | command::INTX_DISABLE,
            command::IO_SPACE,
        );

        if !dev.bar_is_memory(0) {
            return Err(HdaError::Unsupported("BAR0 is not memory mapped"));
        }
        let bar0 = dev.bar_address(0).ok_or(HdaError::Unsupported("BAR0 not configured"))?;
        let mmio = platform.map_mmio(bar0, reg::MMIO_LEN)?;

        let caps = mmio.read16(reg::GCAP);
        let (num_iss, num_oss, num_bss) = (gcap::iss(caps), gcap::oss(caps), gcap::bss(caps));
        crate::log!(
            "[HDA]   version {}.{}, streams: {} output, {} input, {} bidir",
            mmio.read8(reg::VMAJ),
            mmio.read8(reg::VMIN),
            num_oss,
            num_iss,
            num_bss
        );
        if !gcap::ok64(caps) {
            return Err(HdaError::Unsupported("no 64-bit DMA addressing"));
        }
        if num_oss == 0 {
            return Err(HdaError::Unsupported("no output streams"));
        }

        let sched = platform.scheduler();
        let streams = num_iss + num_oss + num_bss;
        reset_link(&*mmio, sched, streams, config.poll_limit)?;

        let commands = CommandEngine::new(mmio.clone(), platform.clone())?;
        commands.start();
        sched.sleep_us(config.codec_settle_us);

        let has_msix = pci::find_capability(cfg, dev, cap_id::MSIX).is_some();
        let has_msi = pci::find_capability(cfg, dev, cap_id::MSI).is_some();
        if !has_msix && !has_msi {
            commands.shutdown();
            return Err(HdaError::Unsupported("neither MSI-X nor MSI"));
        }

        let ctrl = Arc::new(HdaController {
            platform: platform.clone(),
            mmio: mmio.clone(),
            config: config.clone(),
            pci: dev.clone(),
            num_iss,
            num_oss,
            num_bss,
            commands,
            output: Once::new(),
            codecs: Once::new(),
        });

        // Weak: `abort` needs to be the last owner
        let handler = {
            let ctrl = Arc::downgrade(&ctrl);
            Box::new(move || {
                if let Some(ctrl) = ctrl.upgrade() {
                    ctrl.handle_interrupt();
                }
            })
        };
        let vector = match platform.allocate_vector(handler) {
            Some(v) => v,
            None => {
                ctrl.abort();
                return Err(HdaError::Unsupported("no free interrupt vector"));
            }
        };

        if let Err(e) = ctrl.attach(cfg, vector, has_msix) {
            platform.free_vector(vector);
            ctrl.abort();
            return Err(e);
        }

        let codecs = ctrl.enumerate_codecs();
        crate::log!("[HDA] {} codec(s) ready", codecs.len());
        ctrl.codecs.call_once(|| codecs);

        Ok(ctrl)
    }

    /// Enable message interrupts and bring up the output stream
    fn attach(&self, cfg: &dyn PciConfig, vector: u8, has_msix: bool) -> Result<()> {
        let dev = &self.pci;
        let enabled = has_msix && pci::enable_msix(cfg, &*self.platform, dev, vector).is_some();
        if !enabled && pci::enable_msi(cfg, dev, vector).is_none() {
            return Err(HdaError::Unsupported("message interrupts could not be enabled"));
        }

        let streams = self.stream_count().min(MAX_STREAM_BITS);
        let stream_bits = (1u32 << streams) - 1;
        self.mmio.write32(reg::INTCTL, intctl::GIE | intctl::CIE | stream_bits);

        // First output descriptor follows the input descriptors
        let stream = Stream::new(
            StreamRegs::new(self.mmio.clone(), self.num_iss),
            self.platform.clone(),
            self.config.dma_pages,
            self.config.poll_limit,
        )?;
        if let Err(e) = stream.program() {
            stream.release();
            return Err(e);
        }
        self.output.call_once(|| stream);
        Ok(())
    }

    /// Undo a partial bring-up: interrupts off, rings stopped, pages freed
    ///
    /// Must be called after the interrupt vector is gone, so this is the
    /// last strong reference.
    fn abort(self: Arc<Self>) {
        self.mmio.write32(reg::INTCTL, 0);
        match Arc::try_unwrap(self) {
            Ok(ctrl) => ctrl.commands.shutdown(),
            Err(_) => crate::log_error!("[HDA] aborted controller still referenced, ring page kept"),
        }
    }

    fn enumerate_codecs(&self) -> Vec<Arc<Codec>> {
        let present = self.mmio.read16(reg::STATESTS);
        self.mmio.write16(reg::STATESTS, present);

        let mut codecs = Vec::new();
        for addr in (0..MAX_CODECS).filter(|a| present & (1u16 << *a) != 0) {
            let link = CodecLink::new(&self.commands, addr);
            let topology = match codec::enumerate(&link) {
                Ok(t) => t,
                Err(e) => {
                    crate::log_error!("[HDA] codec {}: enumeration failed: {}", addr, e);
                    continue;
                }
            };
            let paths = codec::find_output_paths(&topology, self.config.max_path_depth);
            crate::log!(
                "[HDA] codec {}: {} widgets, {} output path(s)",
                addr,
                topology.widget_count(),
                paths.len()
            );
            codecs.push(Arc::new(Codec::new(addr, topology, paths, self.config.default_params)));
        }
        codecs
    }

    /// Register one playback device per discovered output path
    pub fn register_outputs(self: &Arc<Self>, registry: &DspRegistry) -> Vec<usize> {
        let mut ids = Vec::new();
        for codec in self.codecs() {
            for (index, path) in codec.paths.iter().enumerate() {
                let config = codec.topology.widget(path.pin()).map_or(0, |w| w.config);
                let output = HdaOutput::new(self.clone(), codec.clone(), index);
                let id = registry.register(Arc::new(output));
                crate::log!(
                    "[HDA] dsp{}: {} {}",
                    id,
                    location_name(config),
                    default_device_name(config)
                );
                ids.push(id);
            }
        }
        ids
    }

    /// Interrupt entry point: responses first, then stream completions
    pub fn handle_interrupt(&self) {
        if self.mmio.read8(reg::RIRBSTS) & ring::INTFL != 0 {
            self.mmio.write8(reg::RIRBSTS, ring::INTFL);
            self.commands.handle_responses();
        }

        let status = self.mmio.read32(reg::INTSTS);
        for index in 0..self.stream_count().min(MAX_STREAM_BITS) {
            if status & (1u32 << index) == 0 {
                continue;
            }
            match self.output.get() {
                Some(stream) if index == self.num_iss => stream.handle_completion(),
                _ => StreamRegs::new(self.mmio.clone(), index).ack_completion(),
            }
        }
    }

    pub fn commands(&self) -> &CommandEngine {
        &self.commands
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.platform.scheduler()
    }

    pub fn config(&self) -> &HdaConfig {
        &self.config
    }

    pub fn pci(&self) -> &PciDevice {
        &self.pci
    }

    pub fn codecs(&self) -> &[Arc<Codec>] {
        self.codecs.get().map_or(&[], |c| c.as_slice())
    }

    pub fn output_stream(&self) -> Result<&Stream> {
        self.output.get().ok_or(HdaError::NoDevice)
    }

    /// (input, output, bidirectional) stream counts
    pub fn stream_counts(&self) -> (u8, u8, u8) {
        (self.num_iss, self.num_oss, self.num_bss)
    }

    fn stream_count(&self) -> u8 {
        self.num_iss + self.num_oss + self.num_bss
    }
}

/// Quiesce DMA if the controller is already running, then cycle CRST
fn reset_link(mmio: &dyn Mmio, sched: &dyn Scheduler, streams: u8, limit: usize) -> Result<()> {
    if mmio.read32(reg::GCTL) & gctl::CRST != 0 {
        mmio.write8(reg::CORBCTL, 0);
        if !poll_until(sched, limit, || mmio.read8(reg::CORBCTL) & ring::CORBRUN == 0) {
            return Err(HdaError::Timeout("CORB stop"));
        }
        mmio.write8(reg::RIRBCTL, 0);
        if !poll_until(sched, limit, || mmio.read8(reg::RIRBCTL) & ring::RIRBDMAEN == 0) {
            return Err(HdaError::Timeout("RIRB stop"));
        }
        for index in 0..streams {
            let ctl = reg::SD_BASE + index as u32 * reg::SD_SIZE + sd::CTL;
            mmio.write8(ctl, mmio.read8(ctl) & !sctl::RUN);
            if !poll_until(sched, limit, || mmio.read8(ctl) & sctl::RUN == 0) {
                return Err(HdaError::Timeout("stream stop"));
            }
        }

        mmio.write32(reg::GCTL, mmio.read32(reg::GCTL) & !gctl::CRST);
        if !poll_until(sched, limit, || mmio.read32(reg::GCTL) & gctl::CRST == 0) {
            return Err(HdaError::Timeout("controller reset enter"));
        }
    }

    mmio.write32(reg::GCTL, mmio.read32(reg::GCTL) | gctl::CRST);
    if !poll_until(sched, limit, || mmio.read32(reg::GCTL) & gctl::CRST != 0) {
        return Err(HdaError::Timeout("controller reset exit"));
    }
    Ok(())
}
