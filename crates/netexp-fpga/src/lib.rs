//! # netexp-fpga
//!
//! Remote Intel FPGA bring-up for netexp.
//!
//! This crate provides:
//! - Bounded-retry bitstream loading with hardware-fault detection
//! - JTAG console launch with device auto-detection
//! - A command interface to the ready JTAG console
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on netexp-core and
//! netexp-console. It shares nothing with netexp-pktgen.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod detect;
pub mod device;
pub mod patterns;

// Re-export commonly used types
pub use detect::{device_lines, resolve_device, Detection};
pub use device::{DeviceState, IntelFpga};
