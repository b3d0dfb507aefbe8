//! PCI configuration space helpers
//!
//! Bus enumeration and raw config-space access belong to the kernel and come
//! in through [`PciBus`] / [`PciConfig`]. On top of dword access this module
//! provides byte/word access, command-register control, capability walking
//! and single-vector MSI / MSI-X setup.

use alloc::vec::Vec;

use crate::platform::Platform;

/// PCI class codes
pub mod class {
    pub const MULTIMEDIA: u8 = 0x04;
}

/// Multimedia subclasses
pub mod multimedia {
    pub const VIDEO: u8 = 0x00;
    pub const AUDIO: u8 = 0x01;
    pub const TELEPHONY: u8 = 0x02;
    pub const HDA: u8 = 0x03;
}

/// Command register bits (offset 0x04)
pub mod command {
    pub const IO_SPACE: u16 = 1 << 0;
    pub const MEMORY_SPACE: u16 = 1 << 1;
    pub const BUS_MASTER: u16 = 1 << 2;
    pub const INTX_DISABLE: u16 = 1 << 10;
}

/// PCI capability IDs
pub mod cap_id {
    pub const MSI: u8 = 0x05;
    pub const MSIX: u8 = 0x11;
    pub const PCIE: u8 = 0x10;
}

const COMMAND: u8 = 0x04;
const STATUS: u8 = 0x06;
const CAP_PTR: u8 = 0x34;
const STATUS_CAP_LIST: u16 = 1 << 4;

/// PCI device information
#[derive(Debug, Clone, Default)]
pub struct PciDevice {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub vendor_id: u16,
    pub device_id: u16,
    pub class_code: u8,
    pub subclass: u8,
    pub prog_if: u8,
    pub revision: u8,
    pub bar: [u32; 6],
}

impl PciDevice {
    /// Get BAR address (masked)
    pub fn bar_address(&self, index: usize) -> Option<u64> {
        if index >= 6 {
            return None;
        }

        let bar = self.bar[index];
        if bar == 0 {
            return None;
        }

        if bar & 1 == 0 {
            // Memory BAR
            match (bar >> 1) & 0x3 {
                0 => Some((bar & 0xFFFF_FFF0) as u64),
                2 if index < 5 => {
                    let high = self.bar[index + 1] as u64;
                    Some((high << 32) | (bar & 0xFFFF_FFF0) as u64)
                }
                _ => None,
            }
        } else {
            // I/O BAR
            Some((bar & 0xFFFF_FFFC) as u64)
        }
    }

    /// Check if BAR is memory-mapped
    pub fn bar_is_memory(&self, index: usize) -> bool {
        index < 6 && self.bar[index] & 1 == 0
    }
}

/// Raw config-space access (dword granular, `offset` 4-byte aligned)
pub trait PciConfig: Send + Sync {
    fn read32(&self, dev: &PciDevice, offset: u8) -> u32;
    fn write32(&self, dev: &PciDevice, offset: u8, value: u32);
}

/// Enumerated PCI bus
pub trait PciBus: Send + Sync {
    fn devices(&self) -> Vec<PciDevice>;
    fn config(&self) -> &dyn PciConfig;
}

pub fn read16(cfg: &dyn PciConfig, dev: &PciDevice, offset: u8) -> u16 {
    let shift = ((offset & 2) * 8) as u32;
    (cfg.read32(dev, offset & 0xFC) >> shift) as u16
}

pub fn read8(cfg: &dyn PciConfig, dev: &PciDevice, offset: u8) -> u8 {
    let shift = ((offset & 3) * 8) as u32;
    (cfg.read32(dev, offset & 0xFC) >> shift) as u8
}

/// 16-bit write by read-modify-write of the containing dword
pub fn write16(cfg: &dyn PciConfig, dev: &PciDevice, offset: u8, value: u16) {
    let aligned = offset & 0xFC;
    let shift = ((offset & 2) * 8) as u32;
    let existing = cfg.read32(dev, aligned);
    let mask = !(0xFFFFu32 << shift);
    cfg.write32(dev, aligned, (existing & mask) | ((value as u32) << shift));
}

/// Update the command register: set `set` bits, then clear `clear` bits
pub fn update_command(cfg: &dyn PciConfig, dev: &PciDevice, set: u16, clear: u16) {
    let cmd = read16(cfg, dev, COMMAND);
    write16(cfg, dev, COMMAND, (cmd | set) & !clear);
}

/// Walk PCI capabilities list and find a specific capability type
/// Returns the offset of the capability in PCI config space, or None
pub fn find_capability(cfg: &dyn PciConfig, dev: &PciDevice, cap_id: u8) -> Option<u8> {
    if read16(cfg, dev, STATUS) & STATUS_CAP_LIST == 0 {
        return None;
    }

    let mut cap_ptr = read8(cfg, dev, CAP_PTR) & 0xFC;
    let mut visited = 0u32;

    while cap_ptr != 0 && visited < 48 {
        if read8(cfg, dev, cap_ptr) == cap_id {
            return Some(cap_ptr);
        }
        cap_ptr = read8(cfg, dev, cap_ptr + 1) & 0xFC;
        visited += 1;
    }

    None
}

/// MSI Message Address (for x86_64 LAPIC)
/// Format: 0xFEE0_0000 | (destination_apic_id << 12)
pub fn msi_address(dest_apic_id: u8) -> u32 {
    0xFEE0_0000 | ((dest_apic_id as u32) << 12)
}

/// MSI Message Data
/// For fixed delivery: vector number in bits [7:0], edge trigger
pub fn msi_data(vector: u8) -> u32 {
    vector as u32
}

/// Enable MSI for a device (single-vector, targets BSP LAPIC ID 0)
/// Returns the capability offset used, or None if MSI not supported
pub fn enable_msi(cfg: &dyn PciConfig, dev: &PciDevice, vector: u8) -> Option<u8> {
    let cap_off = find_capability(cfg, dev, cap_id::MSI)?;

    let msg_ctrl = read16(cfg, dev, cap_off + 2);
    let is_64bit = msg_ctrl & (1 << 7) != 0;

    // Disable while reprogramming
    write16(cfg, dev, cap_off + 2, msg_ctrl & !1);

    cfg.write32(dev, cap_off + 4, msi_address(0));
    let data_offset = if is_64bit {
        cfg.write32(dev, cap_off + 8, 0);
        cap_off + 12
    } else {
        cap_off + 8
    };
    write16(cfg, dev, data_offset, msi_data(vector) as u16);

    // MSI Enable, MME=000 (1 vector)
    write16(cfg, dev, cap_off + 2, (msg_ctrl & !(0x7 << 4)) | 1);
    update_command(cfg, dev, command::INTX_DISABLE, 0);

    crate::log_debug!(
        "[PCI] MSI enabled for {:02X}:{:02X}.{} vector={} {}",
        dev.bus,
        dev.device,
        dev.function,
        vector,
        if is_64bit { "64-bit" } else { "32-bit" }
    );

    Some(cap_off)
}

/// Enable MSI-X for a device (single entry, table entry 0)
pub fn enable_msix(
    cfg: &dyn PciConfig,
    platform: &dyn Platform,
    dev: &PciDevice,
    vector: u8,
) -> Option<u8> {
    let cap_off = find_capability(cfg, dev, cap_id::MSIX)?;

    let msg_ctrl = read16(cfg, dev, cap_off + 2);
    let table_size = (msg_ctrl & 0x7FF) as usize + 1;

    let table_info = cfg.read32(dev, cap_off + 4);
    let table_bir = (table_info & 0x7) as usize;
    let table_offset = (table_info & !0x7) as u64;

    let bar_addr = match dev.bar_address(table_bir) {
        Some(a) => a,
        None => {
            crate::log_warn!("[PCI] MSI-X: BAR{} not configured", table_bir);
            return None;
        }
    };

    let table = match platform.map_mmio(bar_addr + table_offset, (table_size * 16).max(4096)) {
        Ok(t) => t,
        Err(e) => {
            crate::log_warn!("[PCI] MSI-X: failed to map table: {}", e);
            return None;
        }
    };

    // Enable + function mask while entry 0 is written
    write16(cfg, dev, cap_off + 2, msg_ctrl | (1 << 15) | (1 << 14));

    table.write32(0, msi_address(0));
    table.write32(4, 0);
    table.write32(8, msi_data(vector));
    table.write32(12, 0);

    write16(cfg, dev, cap_off + 2, (msg_ctrl | (1 << 15)) & !(1 << 14));
    update_command(cfg, dev, command::INTX_DISABLE, 0);

    crate::log_debug!(
        "[PCI] MSI-X enabled for {:02X}:{:02X}.{} vector={} table_size={}",
        dev.bus,
        dev.device,
        dev.function,
        vector,
        table_size
    );

    Some(cap_off)
}
