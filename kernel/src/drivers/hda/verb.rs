//! Codec verbs (Intel HDA Spec §7.3)
//!
//! A verb is one 32-bit CORB word:
//!   [31:28] codec address  [27:20] node id  [19:0] payload
//! The payload is either a 12-bit command id + 8-bit data ("short") or a
//! 4-bit command id + 16-bit data ("long").

use super::error::{HdaError, Result};

/// Command ids
pub mod cmd {
    // 4-bit ids, 16-bit payload
    pub const SET_CONVERTER_FMT: u8 = 0x2;
    pub const SET_AMP_GAIN_MUTE: u8 = 0x3;
    pub const SET_PROC_COEF: u8 = 0x4;
    pub const SET_COEF_INDEX: u8 = 0x5;
    pub const GET_PROC_COEF: u8 = 0xC;

    // 12-bit ids, 8-bit payload
    pub const SET_CONNECTION: u16 = 0x701;
    pub const SET_POWER_STATE: u16 = 0x705;
    pub const SET_CONVERTER_CONTROL: u16 = 0x706;
    pub const SET_PIN_CONTROL: u16 = 0x707;
    pub const SET_EAPD_ENABLE: u16 = 0x70C;
    pub const SET_CONVERTER_CHANNELS: u16 = 0x72D;
    pub const GET_PARAMETER: u16 = 0xF00;
    pub const GET_CONN_LIST_ENTRY: u16 = 0xF02;
    pub const GET_CONFIG_DEFAULT: u16 = 0xF1C;
}

/// Parameters (used with GET_PARAMETER)
pub mod param {
    pub const VENDOR_ID: u8 = 0x00;
    pub const NODE_COUNT: u8 = 0x04;
    pub const FN_GROUP_TYPE: u8 = 0x05;
    pub const AUDIO_CAPS: u8 = 0x09; // Audio Widget Capabilities
    pub const PIN_CAPS: u8 = 0x0C;
    pub const AMP_IN_CAPS: u8 = 0x0D;
    pub const CONN_LIST_LEN: u8 = 0x0E;
    pub const AMP_OUT_CAPS: u8 = 0x12;

    pub const FN_GROUP_AUDIO: u32 = 0x01;
}

/// Amplifier gain/mute payload bits
pub mod amp {
    pub const OUT: u16 = 1 << 15;
    pub const IN: u16 = 1 << 14;
    pub const LEFT: u16 = 1 << 13;
    pub const RIGHT: u16 = 1 << 12;

    /// Maximum gain step from an amplifier capability word
    pub fn max_gain(ampcaps: u32) -> u16 {
        ((ampcaps >> 8) & 0x7F) as u16
    }
}

/// Pin widget control bits
pub mod pin {
    pub const OUT_ENABLE: u8 = 1 << 6;
    pub const HPHN_ENABLE: u8 = 1 << 7;
    pub const EAPD: u8 = 1 << 1;

    /// Pin capabilities: output capable
    pub const CAP_OUTPUT: u32 = 1 << 4;
    /// Pin capabilities: EAPD capable
    pub const CAP_EAPD: u32 = 1 << 16;
}

/// One encoded codec command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verb(u32);

impl Verb {
    pub fn new(codec: u8, nid: u8, payload: u32) -> Result<Self> {
        if payload >> 20 != 0 {
            return Err(HdaError::Malformed("verb payload wider than 20 bits"));
        }
        if codec >> 4 != 0 {
            return Err(HdaError::Malformed("codec address wider than 4 bits"));
        }
        Ok(Verb(payload | (nid as u32) << 20 | (codec as u32) << 28))
    }

    /// 12-bit command id with 8-bit data
    pub fn short(codec: u8, nid: u8, id: u16, data: u8) -> Result<Self> {
        if id >> 12 != 0 {
            return Err(HdaError::Malformed("short verb id wider than 12 bits"));
        }
        Self::new(codec, nid, (id as u32) << 8 | data as u32)
    }

    /// 4-bit command id with 16-bit data
    pub fn long(codec: u8, nid: u8, id: u8, data: u16) -> Result<Self> {
        if id >> 4 != 0 {
            return Err(HdaError::Malformed("long verb id wider than 4 bits"));
        }
        Self::new(codec, nid, (id as u32) << 16 | data as u32)
    }

    pub fn from_raw(raw: u32) -> Self {
        Verb(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn codec(self) -> u8 {
        (self.0 >> 28) as u8
    }

    pub fn nid(self) -> u8 {
        (self.0 >> 20) as u8
    }

    pub fn payload(self) -> u32 {
        self.0 & 0xF_FFFF
    }
}

/// One RIRB entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Response {
    pub data: u32,
    /// Codec address in [3:0], unsolicited flag in bit 4
    pub extended: u32,
}

impl Response {
    pub fn from_u64(raw: u64) -> Self {
        Response { data: raw as u32, extended: (raw >> 32) as u32 }
    }

    pub fn to_u64(self) -> u64 {
        (self.extended as u64) << 32 | self.data as u64
    }

    /// Raised by the codec on its own, not an answer to a verb
    pub fn is_unsolicited(&self) -> bool {
        self.extended & 0x10 != 0
    }
}

/// Anything that can deliver a verb to a codec and hand back its response
pub trait VerbTransport: Send + Sync {
    fn send(&self, verb: Verb) -> Result<Response>;
}

/// Typed verb helpers bound to one codec address
#[derive(Clone, Copy)]
pub struct CodecLink<'a> {
    transport: &'a dyn VerbTransport,
    addr: u8,
}

impl<'a> CodecLink<'a> {
    pub fn new(transport: &'a dyn VerbTransport, addr: u8) -> Self {
        CodecLink { transport, addr }
    }

    pub fn addr(&self) -> u8 {
        self.addr
    }

    fn short(&self, nid: u8, id: u16, data: u8) -> Result<u32> {
        Ok(self.transport.send(Verb::short(self.addr, nid, id, data)?)?.data)
    }

    fn long(&self, nid: u8, id: u8, data: u16) -> Result<u32> {
        Ok(self.transport.send(Verb::long(self.addr, nid, id, data)?)?.data)
    }

    pub fn get_parameter(&self, nid: u8, id: u8) -> Result<u32> {
        self.short(nid, cmd::GET_PARAMETER, id)
    }

    pub fn get_conn_list_entry(&self, nid: u8, offset: u8) -> Result<u32> {
        self.short(nid, cmd::GET_CONN_LIST_ENTRY, offset)
    }

    pub fn get_config_default(&self, nid: u8) -> Result<u32> {
        self.short(nid, cmd::GET_CONFIG_DEFAULT, 0)
    }

    pub fn set_converter_format(&self, nid: u8, fmt: u16) -> Result<()> {
        self.long(nid, cmd::SET_CONVERTER_FMT, fmt).map(drop)
    }

    pub fn set_amp_gain(&self, nid: u8, value: u16) -> Result<()> {
        self.long(nid, cmd::SET_AMP_GAIN_MUTE, value).map(drop)
    }

    pub fn set_connection(&self, nid: u8, index: u8) -> Result<()> {
        self.short(nid, cmd::SET_CONNECTION, index).map(drop)
    }

    pub fn set_power_state(&self, nid: u8, state: u8) -> Result<()> {
        self.short(nid, cmd::SET_POWER_STATE, state).map(drop)
    }

    /// Bind a converter to a stream tag and first channel
    pub fn set_converter_control(&self, nid: u8, stream: u8, channel: u8) -> Result<()> {
        if stream >> 4 != 0 || channel >> 4 != 0 {
            return Err(HdaError::InvalidArgument);
        }
        self.short(nid, cmd::SET_CONVERTER_CONTROL, stream << 4 | channel).map(drop)
    }

    pub fn set_pin_control(&self, nid: u8, value: u8) -> Result<()> {
        self.short(nid, cmd::SET_PIN_CONTROL, value).map(drop)
    }

    pub fn set_eapd_enable(&self, nid: u8, value: u8) -> Result<()> {
        self.short(nid, cmd::SET_EAPD_ENABLE, value).map(drop)
    }

    pub fn set_converter_channels(&self, nid: u8, channels: u8) -> Result<()> {
        if channels == 0 {
            return Err(HdaError::InvalidArgument);
        }
        self.short(nid, cmd::SET_CONVERTER_CHANNELS, channels - 1).map(drop)
    }

    /// Read a vendor processing coefficient
    pub fn read_coef(&self, nid: u8, index: u16) -> Result<u16> {
        self.long(nid, cmd::SET_COEF_INDEX, index)?;
        Ok((self.long(nid, cmd::GET_PROC_COEF, 0)? & 0xFFFF) as u16)
    }

    /// Write a vendor processing coefficient
    pub fn write_coef(&self, nid: u8, index: u16, value: u16) -> Result<()> {
        self.long(nid, cmd::SET_COEF_INDEX, index)?;
        self.long(nid, cmd::SET_PROC_COEF, value).map(drop)
    }
}
