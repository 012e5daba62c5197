//! Command-line arguments.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Console automation for network experiments.
#[derive(Parser, Debug)]
#[command(name = "netexp")]
#[command(bin_name = "netexp")]
#[command(version, about)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Extra option for the ssh client (repeatable)
    #[arg(long = "ssh-arg", global = true, allow_hyphen_values = true)]
    pub ssh_args: Vec<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bring up an FPGA and run JTAG console commands
    Fpga(FpgaArgs),
    /// Run a bounded pktgen transmission and print the counters
    Pktgen(PktgenArgs),
}

/// Arguments of `netexp fpga`.
#[derive(Args, Debug)]
pub struct FpgaArgs {
    /// Host the FPGA is attached to
    #[arg(long)]
    pub host: String,

    /// Vendor-assigned FPGA identifier
    #[arg(long)]
    pub fpga_id: String,

    /// Remote directory holding the hardware_test scripts
    #[arg(long)]
    pub remote_dir: PathBuf,

    /// Skip loading the bitstream
    #[arg(long)]
    pub skip_bitstream: bool,

    /// JTAG console commands to run once the device is ready
    pub commands: Vec<String>,
}

/// Arguments of `netexp pktgen`.
#[derive(Args, Debug)]
pub struct PktgenArgs {
    /// Host running pktgen
    #[arg(long)]
    pub host: String,

    /// Port map in pktgen syntax, e.g. `[1:2].0`
    #[arg(long)]
    pub port_map: String,

    /// Cores for DPDK
    #[arg(long, value_delimiter = ',', required = true)]
    pub cores: Vec<u32>,

    /// Memory channels
    #[arg(long, default_value_t = 4)]
    pub mem_channels: u32,

    /// PCI devices to probe (repeatable)
    #[arg(long)]
    pub pci_allow: Vec<String>,

    /// DPDK shared data file prefix
    #[arg(long)]
    pub file_prefix: Option<String>,

    /// NIC throughput ceiling in bits per second
    #[arg(long, default_value_t = 100e9)]
    pub max_throughput: f64,

    /// Pcap to replay instead of generated packets
    #[arg(long)]
    pub pcap: Option<String>,

    /// Receive port
    #[arg(long, default_value_t = 0)]
    pub rx_port: u16,

    /// Transmit port
    #[arg(long, default_value_t = 0)]
    pub tx_port: u16,

    /// Packet size in bytes
    #[arg(long, default_value_t = 64)]
    pub pkt_size: u32,

    /// Number of source addresses
    #[arg(long, default_value_t = 1)]
    pub nb_src: u32,

    /// Number of destination addresses
    #[arg(long, default_value_t = 1)]
    pub nb_dst: u32,

    /// First address of the generated ranges
    #[arg(long)]
    pub init_ip: Option<IpAddr>,

    /// Rate in percent of line rate
    #[arg(long)]
    pub rate: f64,

    /// Packets to transmit
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub count: u64,
}
