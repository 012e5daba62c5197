//! # netexp
//!
//! Command-line tool for FPGA bring-up and DPDK pktgen runs on remote hosts.
//!
//! ## Architecture
//!
//! Thin entry point over the `netexp` library: parse arguments, load the
//! configuration, install logging and the SIGINT hook, then dispatch.

use clap::Parser;
use netexp::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = netexp::load_config(cli.config.as_deref())?;

    // Initialize logging
    netexp::init_logging(&config.log_level);

    // Ctrl-C must reach the polling loops so the remote side gets a cancel
    netexp_console::install_interrupt_handler()?;

    tracing::info!("netexp v{} starting", env!("CARGO_PKG_VERSION"));

    netexp::run(cli, &config).map_err(|e| {
        tracing::error!("{:#}", e);
        e
    })
}
