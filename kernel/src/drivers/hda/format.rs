//! Stream format negotiation (Intel HDA Spec §3.7.1)
//!
//! The 16-bit format word, shared by the converter's SET_CONVERTER_FMT verb
//! and the stream descriptor's FMT register:
//!   [14] base (0 = 48 kHz, 1 = 44.1 kHz)  [13:11] multiplier - 1
//!   [10:8] divisor - 1  [6:4] bits per sample  [3:0] channels - 1
//! Only rates expressible as base * mult / div exist; requests are rounded
//! up to the nearest one.

/// Sample rate, bit depth and channel count of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwParams {
    pub rate: u32,
    pub bits: u8,
    pub channels: u8,
}

impl HwParams {
    pub const fn new(rate: u32, bits: u8, channels: u8) -> Self {
        HwParams { rate, bits, channels }
    }

    pub fn bytes_per_second(&self) -> usize {
        self.rate as usize * self.channels as usize * (self.bits as usize / 8)
    }
}

const BASE_44K1: u16 = 1 << 14;

#[derive(Clone, Copy)]
struct RateEntry {
    rate: u32,
    base_44k1: bool,
    mult: u8,
    div: u8,
}

const fn r48(rate: u32, mult: u8, div: u8) -> RateEntry {
    RateEntry { rate, base_44k1: false, mult, div }
}

const fn r44(rate: u32, mult: u8, div: u8) -> RateEntry {
    RateEntry { rate, base_44k1: true, mult, div }
}

/// Every representable rate, ascending
const RATES: [RateEntry; 44] = [
    r44(5513, 1, 8),
    r48(6000, 1, 8),
    r44(6300, 1, 7),
    r48(6857, 1, 7),
    r44(7350, 1, 6),
    r48(8000, 1, 6),
    r44(8820, 1, 5),
    r48(9600, 1, 5),
    r44(11025, 1, 4),
    r48(12000, 1, 4),
    r44(12600, 2, 7),
    r48(13714, 2, 7),
    r44(14700, 1, 3),
    r48(16000, 1, 3),
    r44(16538, 3, 8),
    r44(17640, 2, 5),
    r48(18000, 3, 8),
    r44(18900, 3, 7),
    r48(19200, 2, 5),
    r48(20571, 3, 7),
    r44(22050, 1, 2),
    r48(24000, 1, 2),
    r44(25200, 4, 7),
    r44(26460, 3, 5),
    r48(27429, 4, 7),
    r48(28800, 3, 5),
    r44(29400, 2, 3),
    r48(32000, 2, 3),
    r44(33075, 3, 4),
    r44(35280, 4, 5),
    r48(36000, 3, 4),
    r48(38400, 4, 5),
    r44(44100, 1, 1),
    r48(48000, 1, 1),
    r44(58800, 4, 3),
    r48(64000, 4, 3),
    r44(66150, 3, 2),
    r48(72000, 3, 2),
    r44(88200, 2, 1),
    r48(96000, 2, 1),
    r44(132300, 3, 1),
    r48(144000, 3, 1),
    r44(176400, 4, 1),
    r48(192000, 4, 1),
];

pub const MIN_RATE: u32 = RATES[0].rate;
pub const MAX_RATE: u32 = RATES[RATES.len() - 1].rate;
pub const MAX_CHANNELS: u8 = 16;

/// Map requested parameters to a format word and the parameters it encodes
pub fn negotiate(requested: &HwParams) -> (u16, HwParams) {
    let channels = match requested.channels {
        0 => 2,
        c if c > MAX_CHANNELS => MAX_CHANNELS,
        c => c,
    };

    let (bits, bits_code) = match requested.bits {
        0..=8 => (8, 0u16),
        9..=16 => (16, 1),
        17..=20 => (20, 2),
        21..=24 => (24, 3),
        _ => (32, 4),
    };

    let entry = RATES
        .iter()
        .find(|e| e.rate >= requested.rate)
        .unwrap_or(&RATES[RATES.len() - 1]);

    let mut fmt = (channels as u16 - 1) | bits_code << 4;
    fmt |= (entry.div as u16 - 1) << 8;
    fmt |= (entry.mult as u16 - 1) << 11;
    if entry.base_44k1 {
        fmt |= BASE_44K1;
    }

    (fmt, HwParams { rate: entry.rate, bits, channels })
}
