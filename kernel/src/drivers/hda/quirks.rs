//! Per-codec fixups applied right after the vendor id is read

use super::error::Result;
use super::verb::CodecLink;

pub struct Quirk {
    pub vendor: u16,
    pub device: u16,
    pub name: &'static str,
    pub fixup: fn(&CodecLink) -> Result<()>,
}

pub static QUIRKS: &[Quirk] = &[Quirk {
    vendor: 0x10EC,
    device: 0x0887,
    name: "realtek pll",
    fixup: realtek_pll,
}];

/// ALC887: clear the PLL bit (coef 0x0A bit 10) on the vendor node
fn realtek_pll(link: &CodecLink) -> Result<()> {
    const PLL_NID: u8 = 0x20;
    const PLL_COEF: u16 = 0x0A;
    const PLL_BIT: u16 = 10;

    let old = link.read_coef(PLL_NID, PLL_COEF)?;
    link.write_coef(PLL_NID, PLL_COEF, old & !(1 << PLL_BIT))
}

/// Run every fixup registered for this codec; returns how many ran
pub fn apply(link: &CodecLink, vendor: u16, device: u16) -> Result<usize> {
    let mut applied = 0;
    for quirk in QUIRKS.iter().filter(|q| q.vendor == vendor && q.device == device) {
        crate::log!("[HDA] codec {}: applying {} quirk", link.addr(), quirk.name);
        (quirk.fixup)(link)?;
        applied += 1;
    }
    Ok(applied)
}
