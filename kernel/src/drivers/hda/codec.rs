//! Codec topology discovery
//!
//! Walks the audio function group of one codec, builds the widget arena
//! (indexed by node id) and searches it for pin → ... → DAC output paths.

use alloc::vec;
use alloc::vec::Vec;

use super::error::{HdaError, Result};
use super::quirks;
use super::verb::{param, pin, CodecLink};

/// Widget types (bits [23:20] of Audio Widget Capabilities)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WidgetType {
    AudioOutput = 0,
    AudioInput = 1,
    AudioMixer = 2,
    AudioSelector = 3,
    PinComplex = 4,
    Power = 5,
    VolumeKnob = 6,
    BeepGen = 7,
    VendorDef = 0xF,
    Unknown = 0xFF,
}

impl WidgetType {
    pub fn from_caps(caps: u32) -> Self {
        match (caps >> 20) & 0xF {
            0 => Self::AudioOutput,
            1 => Self::AudioInput,
            2 => Self::AudioMixer,
            3 => Self::AudioSelector,
            4 => Self::PinComplex,
            5 => Self::Power,
            6 => Self::VolumeKnob,
            7 => Self::BeepGen,
            0xF => Self::VendorDef,
            _ => Self::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AudioOutput => "Audio Output (DAC)",
            Self::AudioInput => "Audio Input (ADC)",
            Self::AudioMixer => "Audio Mixer",
            Self::AudioSelector => "Audio Selector",
            Self::PinComplex => "Pin Complex",
            Self::Power => "Power Widget",
            Self::VolumeKnob => "Volume Knob",
            Self::BeepGen => "Beep Generator",
            Self::VendorDef => "Vendor Defined",
            Self::Unknown => "Unknown",
        }
    }
}

/// Audio widget caps: connection list present
const CAPS_CONN_LIST: u32 = 1 << 8;
/// Connection list length: long form entries
const CONN_LIST_LONG_FORM: u32 = 1 << 7;
/// Connection list entry: range marker
const CONN_RANGE: u8 = 1 << 7;

/// One upstream input of a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub nid: u8,
    /// Value for SET_CONNECTION that routes this input
    pub selector: u8,
}

/// Widget info discovered from codec
#[derive(Debug, Clone)]
pub struct Widget {
    pub nid: u8,
    pub widget_type: WidgetType,
    pub caps: u32,
    pub pin_caps: u32,
    pub amp_in_caps: u32,
    pub amp_out_caps: u32,
    /// Configuration default (pins)
    pub config: u32,
    pub connections: Vec<Connection>,
}

impl Widget {
    pub fn new(nid: u8, widget_type: WidgetType) -> Self {
        Widget {
            nid,
            widget_type,
            caps: (widget_type as u32 & 0xF) << 20,
            pin_caps: 0,
            amp_in_caps: 0,
            amp_out_caps: 0,
            config: 0,
            connections: Vec::new(),
        }
    }

    /// Selector index that routes input `nid` into this widget
    pub fn selector_for(&self, nid: u8) -> Option<u8> {
        self.connections.iter().find(|c| c.nid == nid).map(|c| c.selector)
    }
}

/// The widget graph of one codec
#[derive(Debug, Clone)]
pub struct CodecTopology {
    pub vendor_id: u16,
    pub device_id: u16,
    widgets: Vec<Option<Widget>>,
    /// Pin complexes, in node id order
    pub pins: Vec<u8>,
    /// Audio output converters, in node id order
    pub outputs: Vec<u8>,
}

impl CodecTopology {
    pub fn new(vendor_id: u16, device_id: u16) -> Self {
        CodecTopology {
            vendor_id,
            device_id,
            widgets: vec![None; 256],
            pins: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn insert(&mut self, widget: Widget) {
        match widget.widget_type {
            WidgetType::AudioOutput => self.outputs.push(widget.nid),
            WidgetType::PinComplex => self.pins.push(widget.nid),
            _ => {}
        }
        let nid = widget.nid as usize;
        self.widgets[nid] = Some(widget);
    }

    pub fn widget(&self, nid: u8) -> Option<&Widget> {
        self.widgets[nid as usize].as_ref()
    }

    pub fn widget_count(&self) -> usize {
        self.widgets.iter().filter(|w| w.is_some()).count()
    }
}

/// Expand a short-form connection list
///
/// An entry with bit 7 set is a range: every node id after the previous
/// (literal) entry up to and including `entry & 0x7F`. Expanded nodes are
/// selected through the range entry's own list position.
pub fn decode_connection_list(entries: &[u8]) -> Result<Vec<Connection>> {
    let mut connections = Vec::with_capacity(entries.len());

    for (i, &entry) in entries.iter().enumerate() {
        if entry & CONN_RANGE == 0 {
            connections.push(Connection { nid: entry, selector: i as u8 });
            continue;
        }

        let start = match i.checked_sub(1).map(|p| entries[p]) {
            Some(prev) if prev & CONN_RANGE == 0 => prev,
            Some(_) => return Err(HdaError::Malformed("connection range follows a range")),
            None => return Err(HdaError::Malformed("connection list starts with a range")),
        };
        let end = entry & !CONN_RANGE;
        if end < start {
            return Err(HdaError::Malformed("connection range runs backwards"));
        }
        for nid in start + 1..=end {
            connections.push(Connection { nid, selector: i as u8 });
        }
    }

    Ok(connections)
}

fn read_connections(link: &CodecLink, nid: u8, len: u8) -> Result<Vec<Connection>> {
    let mut raw = Vec::with_capacity(len as usize);
    let mut offset = 0u8;
    while offset < len {
        let word = link.get_conn_list_entry(nid, offset)?;
        let take = (len - offset).min(4);
        for i in 0..take {
            raw.push((word >> (i * 8)) as u8);
        }
        offset += take;
    }
    decode_connection_list(&raw)
}

fn read_widget(link: &CodecLink, nid: u8) -> Result<Widget> {
    let caps = link.get_parameter(nid, param::AUDIO_CAPS)?;
    let pin_caps = link.get_parameter(nid, param::PIN_CAPS)?;
    let amp_in_caps = link.get_parameter(nid, param::AMP_IN_CAPS)?;
    let amp_out_caps = link.get_parameter(nid, param::AMP_OUT_CAPS)?;
    let conn_len = link.get_parameter(nid, param::CONN_LIST_LEN)?;
    let config = link.get_config_default(nid)?;

    let len = (conn_len & 0x7F) as u8;
    let connections = if caps & CAPS_CONN_LIST != 0 && len != 0 {
        if conn_len & CONN_LIST_LONG_FORM != 0 {
            return Err(HdaError::Unsupported("long form connection list"));
        }
        read_connections(link, nid, len)?
    } else {
        Vec::new()
    };

    Ok(Widget {
        nid,
        widget_type: WidgetType::from_caps(caps),
        caps,
        pin_caps,
        amp_in_caps,
        amp_out_caps,
        config,
        connections,
    })
}

/// Query the codec's audio function group(s) and build its widget graph
pub fn enumerate(link: &CodecLink) -> Result<CodecTopology> {
    let vendor = link.get_parameter(0, param::VENDOR_ID)?;
    let mut topo = CodecTopology::new((vendor >> 16) as u16, vendor as u16);
    crate::log!(
        "[HDA] codec {}: vendor {:04X} device {:04X}",
        link.addr(),
        topo.vendor_id,
        topo.device_id
    );

    quirks::apply(link, topo.vendor_id, topo.device_id)?;

    let groups = link.get_parameter(0, param::NODE_COUNT)?;
    let fg_start = (groups >> 16) as u8;
    let fg_count = groups as u8;

    for fg in 0..fg_count {
        let fg_nid = fg_start.wrapping_add(fg);
        let fg_type = link.get_parameter(fg_nid, param::FN_GROUP_TYPE)?;
        if fg_type & 0xFF != param::FN_GROUP_AUDIO {
            continue;
        }

        let nodes = link.get_parameter(fg_nid, param::NODE_COUNT)?;
        let start = (nodes >> 16) as u8;
        let count = nodes as u8;

        for i in 0..count {
            let widget = read_widget(link, start.wrapping_add(i))?;
            crate::log_debug!(
                "[HDA]   NID {:3}: {} conns={:?}",
                widget.nid,
                widget.widget_type.name(),
                widget.connections.iter().map(|c| c.nid).collect::<Vec<_>>()
            );
            topo.insert(widget);
        }
    }

    Ok(topo)
}

/// Configuration default: port connectivity says nothing is attached
fn pin_unconnected(config: u32) -> bool {
    (config >> 30) == 1
}

struct Frame {
    nid: u8,
    next: usize,
}

/// Depth-first search for output paths
///
/// Every output-capable, connected pin gets at most one path: the first
/// route (in connection-list order) that reaches an audio output converter.
/// Nodes already on the current route are skipped, as is any extension of a
/// route that already holds `max_depth` widgets.
pub fn find_output_paths(topo: &CodecTopology, max_depth: usize) -> Vec<Vec<u8>> {
    let mut paths = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for &pin_nid in &topo.pins {
        let pin_widget = match topo.widget(pin_nid) {
            Some(w) => w,
            None => continue,
        };
        if pin_widget.pin_caps & pin::CAP_OUTPUT == 0 || pin_unconnected(pin_widget.config) {
            continue;
        }

        stack.clear();
        stack.push(Frame { nid: pin_nid, next: 0 });

        while let Some(top) = stack.last_mut() {
            let widget = match topo.widget(top.nid) {
                Some(w) => w,
                None => {
                    stack.pop();
                    continue;
                }
            };
            if top.next == widget.connections.len() {
                stack.pop();
                continue;
            }
            let next_nid = widget.connections[top.next].nid;
            top.next += 1;

            let next = match topo.widget(next_nid) {
                Some(w) => w,
                None => continue,
            };

            if next.widget_type == WidgetType::AudioOutput {
                let mut path: Vec<u8> = stack.iter().map(|f| f.nid).collect();
                path.push(next_nid);
                paths.push(path);
                break;
            }

            if stack.iter().any(|f| f.nid == next_nid) || stack.len() >= max_depth {
                continue;
            }
            stack.push(Frame { nid: next_nid, next: 0 });
        }
    }

    paths
}

/// Default device (configuration default [23:20])
pub fn default_device_name(config: u32) -> &'static str {
    match (config >> 20) & 0xF {
        0x0 => "line out",
        0x1 => "speaker",
        0x2 => "headphone out",
        0x3 => "cd",
        0x4 => "spdif out",
        0x5 => "digital other out",
        0x6 => "modem line side",
        0x7 => "modem handset side",
        0x8 => "line in",
        0x9 => "aux",
        0xA => "mic in",
        0xB => "telephony",
        0xC => "spdif in",
        0xD => "digital other in",
        0xE => "reserved",
        _ => "other",
    }
}

/// Geometric location (configuration default [27:24])
pub fn location_name(config: u32) -> &'static str {
    match (config >> 24) & 0xF {
        0 => "n/a",
        1 => "rear",
        2 => "front",
        3 => "left",
        4 => "right",
        5 => "top",
        6 => "bottom",
        7 => "special",
        _ => "unknown",
    }
}
