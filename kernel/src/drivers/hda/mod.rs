//! Intel High Definition Audio (HDA) Driver
//!
//! Supports Intel ICH6+ HDA controllers and compatibles (class 0x04/0x03).
//!
//! HDA Architecture:
//!   Controller (PCI device) ←→ Codec(s) via HDA Link
//!   Commands sent via CORB (Command Output Ring Buffer)
//!   Responses received via RIRB (Response Input Ring Buffer)
//!   Audio data via DMA streams with Buffer Descriptor Lists (BDL)
//!
//! Bring-up is [`probe`]: every matching PCI function becomes one
//! [`HdaController`], and every output path found on its codecs is
//! registered with the [`DspRegistry`](crate::oss::DspRegistry) as one
//! playback device.

pub mod codec;
pub mod command;
pub mod controller;
pub mod device;
pub mod error;
pub mod format;
pub mod path;
pub mod quirks;
pub mod regs;
pub mod stream;
pub mod verb;

use alloc::sync::Arc;
use alloc::vec::Vec;

pub use controller::HdaController;
pub use device::{Codec, HdaOutput};
pub use error::{HdaError, Result};
pub use format::HwParams;

use crate::oss::DspRegistry;
use crate::pci::{self, PciBus, PciDevice};
use crate::platform::Platform;
use crate::sync::Scheduler;

/// Which PCI functions the driver binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciMatch {
    Class { class: u8, subclass: u8 },
    Id { vendor: u16, device: u16 },
}

impl PciMatch {
    pub fn matches(&self, dev: &PciDevice) -> bool {
        match *self {
            PciMatch::Class { class, subclass } => {
                dev.class_code == class && dev.subclass == subclass
            }
            PciMatch::Id { vendor, device } => dev.vendor_id == vendor && dev.device_id == device,
        }
    }
}

pub static DEFAULT_PCI_MATCH: &[PciMatch] = &[
    PciMatch::Class { class: pci::class::MULTIMEDIA, subclass: pci::multimedia::HDA },
    // Intel 100 Series/C230 (Skylake-H) HD Audio
    PciMatch::Id { vendor: 0x8086, device: 0xA0C8 },
];

/// Driver tunables
#[derive(Debug, Clone)]
pub struct HdaConfig {
    pub pci_match: &'static [PciMatch],
    /// Delay after starting the command rings before codecs are queried
    pub codec_settle_us: u64,
    /// DMA pages (BDL entries) per stream, 2..=256
    pub dma_pages: usize,
    /// Parameters every path starts with
    pub default_params: HwParams,
    pub fragment_count: usize,
    /// Default fragment length in milliseconds of audio
    pub fragment_ms: usize,
    /// Iterations (10 us apart) before a register handshake times out
    pub poll_limit: usize,
    /// Longest pin → converter route the path search follows
    pub max_path_depth: usize,
}

impl Default for HdaConfig {
    fn default() -> Self {
        HdaConfig {
            pci_match: DEFAULT_PCI_MATCH,
            codec_settle_us: 1000,
            dma_pages: 256,
            default_params: HwParams::new(44100, 16, 2),
            fragment_count: 2,
            fragment_ms: 50,
            poll_limit: 1000,
            max_path_depth: 20,
        }
    }
}

/// Poll `cond` up to `limit` times, 10 us apart
pub(crate) fn poll_until(sched: &dyn Scheduler, limit: usize, cond: impl Fn() -> bool) -> bool {
    for _ in 0..limit {
        if cond() {
            return true;
        }
        sched.sleep_us(10);
    }
    cond()
}

/// Bring up every matching controller and register its outputs
///
/// A controller that fails bring-up is logged and skipped.
pub fn probe(
    bus: &dyn PciBus,
    platform: Arc<dyn Platform>,
    registry: &DspRegistry,
    config: &HdaConfig,
) -> Vec<Arc<HdaController>> {
    let mut controllers = Vec::new();

    for dev in bus.devices() {
        if !config.pci_match.iter().any(|m| m.matches(&dev)) {
            continue;
        }
        crate::log!(
            "[HDA] controller at {:02X}:{:02X}.{} ({:04X}:{:04X})",
            dev.bus,
            dev.device,
            dev.function,
            dev.vendor_id,
            dev.device_id
        );

        match HdaController::init(&dev, bus.config(), platform.clone(), config) {
            Ok(ctrl) => {
                ctrl.register_outputs(registry);
                controllers.push(ctrl);
            }
            Err(e) => crate::log_error!(
                "[HDA] {:02X}:{:02X}.{} skipped: {}",
                dev.bus,
                dev.device,
                dev.function,
                e
            ),
        }
    }

    controllers
}
