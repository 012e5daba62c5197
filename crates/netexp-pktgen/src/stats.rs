//! Statistics query protocol.
//!
//! The pktgen console has no structured query interface, so counters are read
//! by sending a Lua one-liner that prints one field of a port statistics
//! table. The console echoes the query, prints the value on a line of its
//! own and then shows the prompt. The value is the *last* digit-only line of
//! the output since an echo of the query may also be present.

use std::fmt;

use netexp_core::{Error, Result};

/// Statistics table exposed by `pktgen.portStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatTable {
    /// Per-second rates
    Rate,
    /// Cumulative port counters
    Port,
}

impl StatTable {
    /// Table name as understood by pktgen.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rate => "rate",
            Self::Port => "port",
        }
    }
}

/// A single statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    /// Received packets per second
    PktsRx,
    /// Transmitted packets per second
    PktsTx,
    /// Received megabits per second
    MbitsRx,
    /// Transmitted megabits per second
    MbitsTx,
    /// Total received packets
    InPackets,
    /// Total received bytes
    InBytes,
    /// Total transmitted packets
    OutPackets,
    /// Total transmitted bytes
    OutBytes,
}

impl Stat {
    /// Table holding this statistic.
    pub fn table(&self) -> StatTable {
        match self {
            Self::PktsRx | Self::PktsTx | Self::MbitsRx | Self::MbitsTx => StatTable::Rate,
            Self::InPackets | Self::InBytes | Self::OutPackets | Self::OutBytes => {
                StatTable::Port
            }
        }
    }

    /// Field name within the table.
    pub fn field(&self) -> &'static str {
        match self {
            Self::PktsRx => "pkts_rx",
            Self::PktsTx => "pkts_tx",
            Self::MbitsRx => "mbits_rx",
            Self::MbitsTx => "mbits_tx",
            Self::InPackets => "ipackets",
            Self::InBytes => "ibytes",
            Self::OutPackets => "opackets",
            Self::OutBytes => "obytes",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table().as_str(), self.field())
    }
}

/// Console input that prints `stat` for `port`.
pub fn stat_query(stat: Stat, port: u16) -> String {
    format!(
        "\nlua 'print(pktgen.portStats(\"all\", \"{}\")[{}].{})'\n",
        stat.table().as_str(),
        port,
        stat.field()
    )
}

/// Extract the value of a statistics query from console output.
pub fn parse_stat_value(output: &str) -> Result<u64> {
    output
        .split("\r\n")
        .filter(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()))
        .last()
        .and_then(|line| line.parse().ok())
        .ok_or_else(|| Error::StatParse {
            output: output.to_string(),
        })
}

/// Extract the mean packet size from `capinfos -z` output.
///
/// The value is the last-but-one whitespace-separated token.
pub fn parse_mean_pkt_size(output: &str) -> Result<f64> {
    let tokens: Vec<&str> = output.split_whitespace().collect();
    tokens
        .len()
        .checked_sub(2)
        .and_then(|i| tokens[i].parse().ok())
        .ok_or_else(|| Error::PcapInspect {
            status: Some(0),
            output: output.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_query() {
        assert_eq!(
            stat_query(Stat::OutPackets, 1),
            "\nlua 'print(pktgen.portStats(\"all\", \"port\")[1].opackets)'\n"
        );
        assert_eq!(
            stat_query(Stat::MbitsTx, 0),
            "\nlua 'print(pktgen.portStats(\"all\", \"rate\")[0].mbits_tx)'\n"
        );
    }

    #[test]
    fn test_stat_tables() {
        assert_eq!(Stat::PktsRx.table(), StatTable::Rate);
        assert_eq!(Stat::InBytes.table(), StatTable::Port);
        assert_eq!(Stat::OutBytes.to_string(), "port.obytes");
    }

    #[test]
    fn test_last_digit_line_wins() {
        let output = "lua 'print(...)'\r\n7\r\n1523\r\nPktgen:/> ";
        assert_eq!(parse_stat_value(output).unwrap(), 1523);
    }

    #[test]
    fn test_mixed_lines_are_skipped() {
        let output = "\r\n42 packets\r\n0\r\n-1\r\n";
        assert_eq!(parse_stat_value(output).unwrap(), 0);
    }

    #[test]
    fn test_no_digit_line() {
        let err = parse_stat_value("lua: attempt to index a nil value\r\nPktgen:/> ").unwrap_err();
        assert!(matches!(err, Error::StatParse { .. }));
    }

    #[test]
    fn test_value_too_large() {
        let output = "\r\n99999999999999999999999\r\n";
        assert!(matches!(
            parse_stat_value(output),
            Err(Error::StatParse { .. })
        ));
    }

    #[test]
    fn test_mean_pkt_size() {
        let output = "File name:           trace.pcap\nAverage packet size: 583.51 bytes\n";
        assert!((parse_mean_pkt_size(output).unwrap() - 583.51).abs() < 1e-9);
    }

    #[test]
    fn test_mean_pkt_size_unparsable() {
        assert!(matches!(
            parse_mean_pkt_size("bytes"),
            Err(Error::PcapInspect { .. })
        ));
        assert!(matches!(
            parse_mean_pkt_size("Average packet size: n/a bytes"),
            Err(Error::PcapInspect { .. })
        ));
    }
}
