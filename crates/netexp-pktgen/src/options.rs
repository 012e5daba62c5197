//! Launch options and traffic parameters.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// pktgen application options (everything after `--`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DpdkPktgenOptions {
    /// Port map in pktgen syntax, e.g. `[1:2].0`
    pub port_map: String,
    /// Maximum throughput of the NIC, in bits per second
    pub max_throughput: f64,
    /// Default port for receive statistics
    pub rx_port: u16,
    /// Default port for transmission
    pub tx_port: u16,
    /// Pcap replayed on the transmit port
    pub pcap: Option<String>,
    /// pktgen configuration file
    pub config_file: Option<String>,
    /// pktgen log file
    pub log_file: Option<String>,
    /// Accept all packets arriving at the interface
    pub promiscuous: bool,
    /// Enable NUMA support
    pub numa_support: bool,
    /// Appended verbatim
    pub extra_opt: Option<String>,
}

impl DpdkPktgenOptions {
    /// Options for `port_map` on a NIC limited to `max_throughput` bit/s.
    pub fn new(port_map: impl Into<String>, max_throughput: f64) -> Self {
        Self {
            port_map: port_map.into(),
            max_throughput,
            ..Self::default()
        }
    }

    /// Set the default receive and transmit ports.
    pub fn with_ports(mut self, rx_port: u16, tx_port: u16) -> Self {
        self.rx_port = rx_port;
        self.tx_port = tx_port;
        self
    }

    /// Replay `pcap` instead of generating packets.
    pub fn with_pcap(mut self, pcap: impl Into<String>) -> Self {
        self.pcap = Some(pcap.into());
        self
    }

    /// Load a pktgen configuration file.
    pub fn with_config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Write the pktgen log to `path`.
    pub fn with_log_file(mut self, path: impl Into<String>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Enable promiscuous mode.
    pub fn promiscuous(mut self) -> Self {
        self.promiscuous = true;
        self
    }

    /// Enable NUMA support.
    pub fn numa(mut self) -> Self {
        self.numa_support = true;
        self
    }

    /// Append raw options.
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra_opt = Some(extra.into());
        self
    }

    /// Render the options passed after `--`.
    pub fn to_args(&self) -> String {
        let mut args = format!("-m \"{}\"", self.port_map);
        if let Some(pcap) = &self.pcap {
            args.push_str(&format!(" -s {}:{}", self.tx_port, pcap));
        }
        if let Some(path) = &self.config_file {
            args.push_str(&format!(" -f {path}"));
        }
        if let Some(path) = &self.log_file {
            args.push_str(&format!(" -l {path}"));
        }
        if self.promiscuous {
            args.push_str(" -P");
        }
        if self.numa_support {
            args.push_str(" -N");
        }
        if let Some(extra) = &self.extra_opt {
            args.push(' ');
            args.push_str(extra);
        }
        args
    }
}

/// Flow parameters applied with `set_params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficParams {
    /// Packet size in bytes
    pub pkt_size: u32,
    /// Number of source addresses
    pub nb_src: u32,
    /// Number of destination addresses
    pub nb_dst: u32,
    /// First address of both ranges; the configured default when unset
    pub init_ip: Option<IpAddr>,
    /// Destination port range start
    pub init_port: u16,
    /// Port to configure; the default transmit port when unset
    pub tx_port: Option<u16>,
}

impl TrafficParams {
    /// Parameters for `nb_src` x `nb_dst` flows of `pkt_size`-byte packets.
    pub fn new(pkt_size: u32, nb_src: u32, nb_dst: u32) -> Self {
        Self {
            pkt_size,
            nb_src,
            nb_dst,
            init_ip: None,
            init_port: 0,
            tx_port: None,
        }
    }

    /// Start both address ranges at `ip`.
    pub fn with_init_ip(mut self, ip: IpAddr) -> Self {
        self.init_ip = Some(ip);
        self
    }

    /// Start the destination port range at `port`.
    pub fn with_init_port(mut self, port: u16) -> Self {
        self.init_port = port;
        self
    }

    /// Configure `port` instead of the default transmit port.
    pub fn on_port(mut self, port: u16) -> Self {
        self.tx_port = Some(port);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_args() {
        let options = DpdkPktgenOptions::new("[1:2].0", 10e9);
        assert_eq!(options.to_args(), "-m \"[1:2].0\"");
    }

    #[test]
    fn test_full_args() {
        let options = DpdkPktgenOptions::new("[1:2].0, [3:4].1", 100e9)
            .with_ports(0, 1)
            .with_pcap("/tmp/trace.pcap")
            .with_config_file("pktgen.cfg")
            .with_log_file("pktgen.log")
            .promiscuous()
            .numa()
            .with_extra("-T");

        assert_eq!(
            options.to_args(),
            "-m \"[1:2].0, [3:4].1\" -s 1:/tmp/trace.pcap -f pktgen.cfg -l pktgen.log -P -N -T"
        );
    }

    #[test]
    fn test_traffic_params_defaults() {
        let params = TrafficParams::new(64, 4, 2);
        assert_eq!(params.init_ip, None);
        assert_eq!(params.init_port, 0);
        assert_eq!(params.tx_port, None);

        let params = params.with_init_port(5000).on_port(0);
        assert_eq!(params.init_port, 5000);
        assert_eq!(params.tx_port, Some(0));
    }
}
