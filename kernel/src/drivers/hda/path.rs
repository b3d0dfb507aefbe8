//! Output paths and their activation
//!
//! A path is a list of node ids (indices into the codec's widget arena)
//! from an external pin down to an audio output converter.

use alloc::vec::Vec;
use spin::Mutex;

use super::codec::{CodecTopology, WidgetType};
use super::error::{HdaError, Result};
use super::format::{self, HwParams};
use super::stream::StreamRegs;
use super::verb::{amp, pin, CodecLink};

/// Stream tag every converter is bound to
pub const STREAM_TAG: u8 = 1;

/// Negotiable state of a path, shared with the audio-device layer
#[derive(Debug, Clone, Copy)]
pub struct PathState {
    pub params: HwParams,
    /// Params must be pushed to hardware before the next start
    pub dirty: bool,
    pub signed: bool,
    pub fragment_size: usize,
    pub fragment_count: usize,
}

pub struct Path {
    pub widgets: Vec<u8>,
    pub state: Mutex<PathState>,
}

impl Path {
    pub fn new(widgets: Vec<u8>, params: HwParams) -> Self {
        Path {
            widgets,
            state: Mutex::new(PathState {
                params,
                dirty: true,
                signed: true,
                fragment_size: 0,
                fragment_count: 0,
            }),
        }
    }

    pub fn pin(&self) -> u8 {
        self.widgets[0]
    }

    pub fn converter(&self) -> u8 {
        self.widgets[self.widgets.len() - 1]
    }

    pub fn mark_dirty(&self) {
        crate::arch::without_interrupts(|| self.state.lock().dirty = true);
    }
}

fn max_gain(side: u16, ampcaps: u32) -> u16 {
    side | amp::LEFT | amp::RIGHT | amp::max_gain(ampcaps)
}

/// Route, power and unmute every widget along `nids`
pub fn activate(link: &CodecLink, topo: &CodecTopology, nids: &[u8]) -> Result<()> {
    for (i, &nid) in nids.iter().enumerate() {
        let widget = topo.widget(nid).ok_or(HdaError::Malformed("path widget missing"))?;

        link.set_power_state(nid, 0)?;

        if let Some(&next) = nids.get(i + 1) {
            if widget.connections.len() > 1 {
                let index = widget.selector_for(next).unwrap_or(0);
                crate::log_debug!("[HDA] connect {} -> {} (selector {})", nid, next, index);
                link.set_connection(nid, index)?;
            }
        }

        match widget.widget_type {
            WidgetType::PinComplex => {
                if widget.pin_caps & pin::CAP_EAPD != 0 {
                    link.set_eapd_enable(nid, pin::EAPD)?;
                }
                link.set_amp_gain(nid, max_gain(amp::OUT, widget.amp_out_caps))?;
                link.set_pin_control(nid, pin::HPHN_ENABLE | pin::OUT_ENABLE)?;
            }
            WidgetType::AudioMixer => {
                link.set_amp_gain(nid, max_gain(amp::OUT, widget.amp_out_caps))?;
                link.set_amp_gain(nid, max_gain(amp::IN, widget.amp_in_caps))?;
            }
            WidgetType::AudioOutput => {
                link.set_amp_gain(nid, max_gain(amp::OUT, widget.amp_out_caps))?;
                link.set_converter_control(nid, STREAM_TAG, 0)?;
            }
            other => {
                crate::log_debug!("[HDA] no setup for {} {}, output gain only", other.name(), nid);
                link.set_amp_gain(nid, max_gain(amp::OUT, widget.amp_out_caps))?;
            }
        }
    }
    Ok(())
}

/// Negotiate `params` and program converter and stream format
///
/// The stream must be stopped.
pub fn push_params(
    link: &CodecLink,
    converter: u8,
    regs: &StreamRegs,
    params: &HwParams,
) -> Result<HwParams> {
    let (fmt, actual) = format::negotiate(params);
    link.set_converter_channels(converter, actual.channels)?;
    link.set_converter_format(converter, fmt)?;
    regs.set_format(fmt);
    Ok(actual)
}
