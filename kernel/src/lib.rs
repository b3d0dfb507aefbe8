//! Intel High Definition Audio driver core
//!
//! Kernel-side driver for HDA-class controllers:
//!   Controller (PCI device, class 0x04/0x03) ←→ Codec(s) via link
//!   Verbs sent via CORB, responses collected from RIRB under interrupt
//!   Codec widget graph walked to find pin → ... → DAC output paths
//!   PCM streamed through a 256-page BDL refilled from a software ring
//!
//! The crate is `no_std` + `alloc`. Everything it needs from the rest of
//! the kernel (page frames, MMIO mapping, interrupt vectors, the scheduler,
//! PCI config space) comes in through the traits in [`platform`],
//! [`memory`], [`sync`] and [`pci`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod logger;

pub mod arch;
pub mod drivers;
pub mod memory;
pub mod oss;
pub mod pci;
pub mod platform;
pub mod ringbuffer;
pub mod serial;
pub mod sync;

pub use drivers::hda::{self, HdaConfig, HdaController, HdaError};
