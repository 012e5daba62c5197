//! Subcommand implementations.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use netexp_console::SshHost;
use netexp_core::NetexpConfig;
use netexp_fpga::IntelFpga;
use netexp_pktgen::{DpdkConfig, DpdkPktgen, DpdkPktgenOptions, Pktgen, TrafficParams};

use crate::cli::{Cli, Commands, FpgaArgs, PktgenArgs};

/// Counters printed by `netexp pktgen`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficReport {
    /// Packets transmitted on the transmit port
    pub tx_pkts: u64,
    /// Bytes transmitted on the transmit port
    pub tx_bytes: u64,
    /// Packets received on the receive port
    pub rx_pkts: u64,
    /// Bytes received on the receive port
    pub rx_bytes: u64,
    /// Transmit throughput at completion, in bits per second
    pub tx_throughput: u64,
    /// Receive throughput at completion, in bits per second
    pub rx_throughput: u64,
    /// Mean packet size of the replayed pcap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_pkt_size: Option<f64>,
}

/// Load the configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<NetexpConfig> {
    let config = match path {
        Some(path) => NetexpConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => NetexpConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Logs go to stderr so they never
/// mix with forwarded console output.
pub fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Run the selected subcommand.
pub fn run(cli: Cli, config: &NetexpConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Fpga(args) => run_fpga(args, &cli.ssh_args, config),
        Commands::Pktgen(args) => {
            let report = run_pktgen(args, &cli.ssh_args, config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

/// Bring the FPGA up and run the requested JTAG commands.
///
/// Console output is mirrored live unless `watch.forward_stdout` is off, in
/// which case the command transcript is printed at the end.
fn run_fpga(args: FpgaArgs, ssh_args: &[String], config: &NetexpConfig) -> anyhow::Result<()> {
    let host = SshHost::new(&args.host).with_args(ssh_args.iter().cloned());
    let mut fpga = IntelFpga::connect(
        host,
        &args.fpga_id,
        &args.remote_dir,
        !args.skip_bitstream,
        config,
    )
    .with_context(|| format!("Failed to bring up FPGA {} on {}", args.fpga_id, args.host))?;

    if !args.commands.is_empty() {
        let output = fpga.run_jtag_commands(&args.commands)?;
        if !config.watch.forward_stdout {
            print!("{output}");
        }
    }

    fpga.close()?;
    info!("FPGA {} closed", args.fpga_id);
    Ok(())
}

fn run_pktgen(
    args: PktgenArgs,
    ssh_args: &[String],
    config: &NetexpConfig,
) -> anyhow::Result<TrafficReport> {
    let host = SshHost::new(&args.host).with_args(ssh_args.iter().cloned());

    let dpdk = DpdkConfig {
        pci_allow_list: args.pci_allow,
        file_prefix: args.file_prefix,
        ..DpdkConfig::new(args.cores, args.mem_channels)
    };

    let mut options = DpdkPktgenOptions::new(args.port_map, args.max_throughput)
        .with_ports(args.rx_port, args.tx_port);
    if let Some(pcap) = &args.pcap {
        options = options.with_pcap(pcap);
    }

    let mut pktgen = DpdkPktgen::connect(host, &dpdk, options, config)
        .with_context(|| format!("Failed to launch pktgen on {}", args.host))?;
    pktgen.wait_ready(config.watch.forward_stdout)?;

    let mean_pkt_size = if args.pcap.is_some() {
        Some(pktgen.get_mean_pkt_size()?)
    } else {
        let mut params = TrafficParams::new(args.pkt_size, args.nb_src, args.nb_dst);
        if let Some(ip) = args.init_ip {
            params = params.with_init_ip(ip);
        }
        pktgen.set_params(&params)?;
        None
    };

    pktgen.clean_stats()?;
    pktgen.start(args.rate, args.count, None)?;
    pktgen.wait_transmission_done()?;

    let tx_throughput = pktgen.get_tx_throughput(None)?;
    let rx_throughput = pktgen.get_rx_throughput(None)?;
    pktgen.stop(None)?;

    let report = TrafficReport {
        tx_pkts: pktgen.get_nb_tx_pkts(None)?,
        tx_bytes: pktgen.get_nb_tx_bytes(None)?,
        rx_pkts: pktgen.get_nb_rx_pkts(None)?,
        rx_bytes: pktgen.get_nb_rx_bytes(None)?,
        tx_throughput,
        rx_throughput,
        mean_pkt_size,
    };

    pktgen.close()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = load_config(None).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_config(Some(Path::new("/nonexistent/netexp.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/netexp.yaml"));
    }

    #[test]
    fn test_report_json() {
        let report = TrafficReport {
            tx_pkts: 1000,
            tx_bytes: 64_000,
            rx_pkts: 998,
            rx_bytes: 63_872,
            tx_throughput: 40_000_000,
            rx_throughput: 39_000_000,
            mean_pkt_size: None,
        };

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tx_pkts"], 1000);
        assert_eq!(json["rx_bytes"], 63_872);
        assert!(json.get("mean_pkt_size").is_none());
    }
}
