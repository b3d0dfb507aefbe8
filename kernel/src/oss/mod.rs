//! OSS-style audio device files
//!
//! Every playback device registers here and shows up as `dspN`. The
//! registry turns open/close/write/ioctl on those nodes into calls on the
//! [`AudioDevice`] behind them. Copying to and from user memory is the
//! syscall layer's business: ioctls arrive as decoded [`DspRequest`]s and
//! leave as [`DspReply`]s.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::drivers::hda::{HdaError, Result};

// Sample formats
pub const AFMT_U8: i32 = 0x0000_0008;
pub const AFMT_S16_LE: i32 = 0x0000_0010;
pub const AFMT_U16_LE: i32 = 0x0000_0080;

// Engine capabilities
pub const PCM_CAP_DUPLEX: i32 = 0x100;
pub const PCM_CAP_OUTPUT: i32 = 0x20000;

// ioctl request codes
pub const SNDCTL_DSP_SPEED: u64 = 0xc004_5002;
pub const SNDCTL_DSP_SETFMT: u64 = 0xc004_5005;
pub const SNDCTL_DSP_CHANNELS: u64 = 0xc004_5006;
pub const SNDCTL_DSP_SETFRAGMENT: u64 = 0xc004_500a;
pub const SNDCTL_DSP_GETFMTS: u64 = 0x8004_500b;
pub const SNDCTL_DSP_GETOSPACE: u64 = 0x8010_500c;
pub const SNDCTL_DSP_GETCAPS: u64 = 0x8004_500f;
pub const SNDCTL_ENGINEINFO: u64 = 0xc49c_580c;

/// Rates advertised through ENGINEINFO
pub const STANDARD_RATES: [u32; 10] =
    [8000, 11025, 16000, 22050, 44100, 48000, 88200, 96000, 176400, 192000];

/// What a playback device can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DspCaps {
    pub formats: i32,
    pub min_rate: i32,
    pub max_rate: i32,
    pub min_channels: i32,
    pub max_channels: i32,
    pub rates: &'static [u32],
}

/// Bytes handed to [`AudioDevice::queue`]
///
/// Sources are consumed front to back; a chunk, once returned, counts as
/// taken.
pub trait PcmSource {
    /// Bytes not yet taken
    fn remaining(&self) -> usize;
    /// Take up to `max` bytes
    fn next_chunk(&mut self, max: usize) -> Result<&[u8]>;
}

/// A single contiguous buffer
pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceSource { data }
    }
}

impl PcmSource for SliceSource<'_> {
    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn next_chunk(&mut self, max: usize) -> Result<&[u8]> {
        let n = max.min(self.data.len());
        let (chunk, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(chunk)
    }
}

/// Scatter list of buffers, as a `writev` hands them over
pub struct IoVecSource<'a> {
    iov: &'a [&'a [u8]],
    index: usize,
    offset: usize,
}

impl<'a> IoVecSource<'a> {
    pub fn new(iov: &'a [&'a [u8]]) -> Self {
        IoVecSource { iov, index: 0, offset: 0 }
    }
}

impl PcmSource for IoVecSource<'_> {
    fn remaining(&self) -> usize {
        self.iov.iter().skip(self.index).map(|b| b.len()).sum::<usize>() - self.offset
    }

    fn next_chunk(&mut self, max: usize) -> Result<&[u8]> {
        let iov = self.iov;
        while let Some(buf) = iov.get(self.index) {
            if self.offset < buf.len() {
                let n = max.min(buf.len() - self.offset);
                let chunk = &buf[self.offset..self.offset + n];
                self.offset += n;
                return Ok(chunk);
            }
            self.index += 1;
            self.offset = 0;
        }
        Ok(&[])
    }
}

/// One playback engine behind a `dspN` node
pub trait AudioDevice: Send + Sync {
    fn caps(&self) -> &DspCaps;
    /// Returns the rate that will be used
    fn set_rate(&self, rate: i32) -> i32;
    /// Returns the channel count that will be used
    fn set_channels(&self, channels: i32) -> i32;
    /// Returns the format that will be used
    fn set_format(&self, format: i32) -> i32;
    fn set_fragment(&self, size: usize, count: usize);
    /// Returns bytes accepted
    fn queue(&self, source: &mut dyn PcmSource) -> Result<usize>;
    fn pause(&self, wait: bool, reset: bool) -> Result<()>;
    fn resume(&self) -> Result<()>;
    /// Free space in the device's buffer, in bytes
    fn get_buffer_avail(&self) -> Result<usize>;
    /// Fails with [`HdaError::Busy`] instead of blocking
    fn open(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// Decoded ioctl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspRequest {
    GetFormats,
    GetCaps,
    GetOutputSpace,
    Speed(i32),
    SetFormat(i32),
    Channels(i32),
    /// `count << 16 | log2(size)`
    SetFragment(u32),
    EngineInfo,
}

impl DspRequest {
    /// `arg` is the integer the request carries in (ignored for queries)
    pub fn from_raw(request: u64, arg: u32) -> Result<Self> {
        Ok(match request {
            SNDCTL_DSP_GETFMTS => DspRequest::GetFormats,
            SNDCTL_DSP_GETCAPS => DspRequest::GetCaps,
            SNDCTL_DSP_GETOSPACE => DspRequest::GetOutputSpace,
            SNDCTL_DSP_SPEED => DspRequest::Speed(arg as i32),
            SNDCTL_DSP_SETFMT => DspRequest::SetFormat(arg as i32),
            SNDCTL_DSP_CHANNELS => DspRequest::Channels(arg as i32),
            SNDCTL_DSP_SETFRAGMENT => DspRequest::SetFragment(arg),
            SNDCTL_ENGINEINFO => DspRequest::EngineInfo,
            _ => return Err(HdaError::InvalidArgument),
        })
    }
}

/// audio_buf_info
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferInfo {
    pub fragments: i32,
    pub fragstotal: i32,
    pub fragsize: i32,
    pub bytes: i32,
}

/// The fields of oss_audioinfo the driver fills in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    pub dev: i32,
    pub name: &'static str,
    pub caps: i32,
    pub iformats: i32,
    pub oformats: i32,
    pub enabled: bool,
    pub min_rate: i32,
    pub max_rate: i32,
    pub min_channels: i32,
    pub max_channels: i32,
    pub rates: Vec<u32>,
    pub latency: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DspReply {
    /// Request handled, nothing to copy out
    Done,
    Value(i32),
    Space(BufferInfo),
    Engine(Box<EngineInfo>),
}

/// All registered playback devices, indexed by `dspN` minor
pub struct DspRegistry {
    devices: Mutex<Vec<Arc<dyn AudioDevice>>>,
}

impl DspRegistry {
    pub const fn new() -> Self {
        DspRegistry { devices: Mutex::new(Vec::new()) }
    }

    /// Add a device; returns its minor
    pub fn register(&self, device: Arc<dyn AudioDevice>) -> usize {
        let mut devices = self.devices.lock();
        devices.push(device);
        let id = devices.len() - 1;
        crate::log_debug!("[OSS] registered dsp{}", id);
        id
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: usize) -> Result<Arc<dyn AudioDevice>> {
        self.devices.lock().get(id).cloned().ok_or(HdaError::NoDevice)
    }

    pub fn open(&self, id: usize) -> Result<()> {
        self.get(id)?.open()
    }

    /// Drain and reset the engine, then give up ownership
    pub fn close(&self, id: usize) -> Result<()> {
        let device = self.get(id)?;
        if let Err(e) = device.pause(true, true) {
            crate::log_debug!("[OSS] dsp{}: pause on close: {}", id, e);
        }
        device.close()
    }

    pub fn write(&self, id: usize, source: &mut dyn PcmSource) -> Result<usize> {
        self.get(id)?.queue(source)
    }

    pub fn ioctl(&self, id: usize, request: DspRequest) -> Result<DspReply> {
        let device = self.get(id)?;
        let caps = device.caps();

        Ok(match request {
            DspRequest::GetFormats => DspReply::Value(caps.formats),
            DspRequest::GetCaps => DspReply::Value(PCM_CAP_DUPLEX | PCM_CAP_OUTPUT),
            DspRequest::GetOutputSpace => {
                let bytes = device.get_buffer_avail()?;
                DspReply::Space(BufferInfo {
                    bytes: i32::try_from(bytes).unwrap_or(i32::MAX),
                    ..BufferInfo::default()
                })
            }
            DspRequest::Speed(rate) => DspReply::Value(device.set_rate(rate)),
            DspRequest::SetFormat(format) => DspReply::Value(device.set_format(format)),
            DspRequest::Channels(count) => DspReply::Value(device.set_channels(count)),
            DspRequest::SetFragment(arg) => {
                let size = 1usize
                    .checked_shl(arg & 0xffff)
                    .ok_or(HdaError::InvalidArgument)?;
                let count = (arg >> 16) as usize;
                crate::log!("[OSS] dsp{}: {} fragments of {} bytes", id, count, size);
                device.set_fragment(size, count);
                DspReply::Done
            }
            DspRequest::EngineInfo => DspReply::Engine(Box::new(EngineInfo {
                dev: id as i32,
                name: "default",
                caps: PCM_CAP_OUTPUT,
                iformats: 0,
                oformats: caps.formats,
                enabled: true,
                min_rate: caps.min_rate,
                max_rate: caps.max_rate,
                min_channels: caps.min_channels,
                max_channels: caps.max_channels,
                rates: caps.rates.to_vec(),
                latency: -1,
            })),
        })
    }
}

impl Default for DspRegistry {
    fn default() -> Self {
        Self::new()
    }
}
