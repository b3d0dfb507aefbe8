//! Controller register map (Intel HDA Spec §3.3)

/// Global registers
pub mod reg {
    pub const GCAP: u32 = 0x00; // 16-bit: Global Capabilities
    pub const VMIN: u32 = 0x02; // 8-bit: Minor Version
    pub const VMAJ: u32 = 0x03; // 8-bit: Major Version
    pub const GCTL: u32 = 0x08; // 32-bit: Global Control
    pub const STATESTS: u32 = 0x0E; // 16-bit: State Change Status
    pub const INTCTL: u32 = 0x20; // 32-bit: Interrupt Control
    pub const INTSTS: u32 = 0x24; // 32-bit: Interrupt Status

    // CORB registers
    pub const CORBLBASE: u32 = 0x40; // 32-bit: CORB Lower Base Address
    pub const CORBUBASE: u32 = 0x44; // 32-bit: CORB Upper Base Address
    pub const CORBWP: u32 = 0x48; // 16-bit: CORB Write Pointer
    pub const CORBRP: u32 = 0x4A; // 16-bit: CORB Read Pointer
    pub const CORBCTL: u32 = 0x4C; // 8-bit: CORB Control
    pub const CORBSIZE: u32 = 0x4E; // 8-bit: CORB Size

    // RIRB registers
    pub const RIRBLBASE: u32 = 0x50; // 32-bit: RIRB Lower Base Address
    pub const RIRBUBASE: u32 = 0x54; // 32-bit: RIRB Upper Base Address
    pub const RIRBWP: u32 = 0x58; // 16-bit: RIRB Write Pointer
    pub const RINTCNT: u32 = 0x5A; // 16-bit: Response Interrupt Count
    pub const RIRBCTL: u32 = 0x5C; // 8-bit: RIRB Control
    pub const RIRBSTS: u32 = 0x5D; // 8-bit: RIRB Status
    pub const RIRBSIZE: u32 = 0x5E; // 8-bit: RIRB Size

    // Stream Descriptor base (0x80 + n*0x20)
    pub const SD_BASE: u32 = 0x80;
    pub const SD_SIZE: u32 = 0x20;

    /// Register window size mapped at bring-up
    pub const MMIO_LEN: usize = 0x4000;
}

/// Stream descriptor register offsets (relative to stream base)
pub mod sd {
    pub const CTL: u32 = 0x00; // 24-bit (3 bytes): Stream Control
    pub const CTL2: u32 = 0x02; // byte 2 of CTL: stream number in [7:4]
    pub const STS: u32 = 0x03; // 8-bit: Stream Status
    pub const LPIB: u32 = 0x04; // 32-bit: Link Position In Buffer
    pub const CBL: u32 = 0x08; // 32-bit: Cyclic Buffer Length
    pub const LVI: u32 = 0x0C; // 16-bit: Last Valid Index
    pub const FMT: u32 = 0x12; // 16-bit: Stream Format
    pub const BDLPL: u32 = 0x18; // 32-bit: BDL Lower Address
    pub const BDLPU: u32 = 0x1C; // 32-bit: BDL Upper Address
}

/// Global Capabilities fields
pub mod gcap {
    pub fn ok64(gcap: u16) -> bool {
        gcap & 1 != 0
    }
    pub fn bss(gcap: u16) -> u8 {
        ((gcap >> 3) & 0x1F) as u8
    }
    pub fn iss(gcap: u16) -> u8 {
        ((gcap >> 8) & 0xF) as u8
    }
    pub fn oss(gcap: u16) -> u8 {
        ((gcap >> 12) & 0xF) as u8
    }
}

/// Global Control bits
pub mod gctl {
    pub const CRST: u32 = 1 << 0; // Controller Reset
}

/// Interrupt Control bits
pub mod intctl {
    pub const GIE: u32 = 1 << 31; // Global Interrupt Enable
    pub const CIE: u32 = 1 << 30; // Controller Interrupt Enable
}

/// CORB / RIRB control bits
pub mod ring {
    pub const CORBRUN: u8 = 1 << 1;
    pub const RINTCTL: u8 = 1 << 0;
    pub const RIRBDMAEN: u8 = 1 << 1;
    pub const INTFL: u8 = 1 << 0; // RIRBSTS: response interrupt flag
    /// Write pointer field of CORBWP / RIRBWP
    pub const WP_MASK: u16 = 0xFF;
}

/// Stream Control bits (byte 0)
pub mod sctl {
    pub const SRST: u8 = 1 << 0; // Stream Reset
    pub const RUN: u8 = 1 << 1; // Stream Run (DMA enable)
    pub const IOCE: u8 = 1 << 2; // Interrupt On Completion Enable
    pub const STRM_SHIFT: u8 = 4; // stream number within CTL2
    pub const STRM_MASK: u8 = 0xF0;
}

/// Stream Status bits
pub mod ssts {
    pub const BCIS: u8 = 1 << 2; // Buffer Completion Interrupt Status
}
