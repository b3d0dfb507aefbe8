//! Device drivers

pub mod hda;
