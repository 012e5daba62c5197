//! # netexp-pktgen
//!
//! Remote control of DPDK pktgen through its interactive console.
//!
//! This crate provides:
//! - EAL and pktgen command-line formatting
//! - The [`Pktgen`] generator interface and its DPDK implementation
//! - The statistics query protocol (Lua one-liners scraped from the console)
//! - Stall detection while waiting for a transmission to complete
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on netexp-core and
//! netexp-console. It shares nothing with netexp-fpga.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod dpdk;
pub mod dpdk_config;
pub mod generator;
pub mod options;
pub mod patterns;
pub mod stats;

// Re-export commonly used types
pub use dpdk::DpdkPktgen;
pub use dpdk_config::{DpdkConfig, ProcType, VfioIntr};
pub use generator::Pktgen;
pub use options::{DpdkPktgenOptions, TrafficParams};
pub use stats::{Stat, StatTable};
