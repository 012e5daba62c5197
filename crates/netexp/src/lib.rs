//! # netexp
//!
//! Command-line front end for netexp.
//!
//! ## Overview
//!
//! - `netexp fpga`: bring an Intel FPGA up and run JTAG console commands
//! - `netexp pktgen`: launch DPDK pktgen, transmit a fixed number of packets
//!   and report the counters as JSON
//!
//! ## Architecture
//!
//! This is Layer 3 - the binary that ties together:
//! - netexp-core: Errors and configuration
//! - netexp-console: Stream watching and the ssh transport
//! - netexp-fpga: FPGA bring-up
//! - netexp-pktgen: pktgen control

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod run;

pub use cli::{Cli, Commands, FpgaArgs, PktgenArgs};
pub use run::{init_logging, load_config, run, TrafficReport};
