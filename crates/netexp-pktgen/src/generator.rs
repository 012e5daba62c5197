//! Packet generator interface.

use netexp_core::Result;

use crate::options::TrafficParams;

/// A packet generator driven by an experiment.
///
/// Port arguments override the generator's default receive or transmit
/// port; `None` uses the default.
pub trait Pktgen {
    /// Start the generator process.
    fn launch(&mut self) -> Result<()>;

    /// Configure packet size and address ranges.
    fn set_params(&mut self, params: &TrafficParams) -> Result<()>;

    /// Replay `pcap`, relaunching the generator if it is running.
    fn set_pcap(&mut self, pcap: &str) -> Result<()>;

    /// Mean packet size of the configured pcap, in bytes.
    fn get_mean_pkt_size(&mut self) -> Result<f64>;

    /// Start transmitting at `capacity` percent of line rate.
    ///
    /// `nb_pkts` of 0 transmits until stopped.
    fn start(&mut self, capacity: f64, nb_pkts: u64, tx_port: Option<u16>) -> Result<()>;

    /// Change the transmission rate; `capacity` must be in (0, 100].
    fn set_rate(&mut self, capacity: f64, tx_port: Option<u16>) -> Result<()>;

    /// Block until the packets requested by the last `start` have been sent.
    ///
    /// The first poll only records a baseline, so a generator that never
    /// sends anything is reported as stalled on the second poll.
    fn wait_transmission_done(&mut self) -> Result<()>;

    /// Stop transmitting.
    fn stop(&mut self, tx_port: Option<u16>) -> Result<()>;

    /// Reset all counters.
    fn clean_stats(&mut self) -> Result<()>;

    /// Shut the generator down.
    fn close(&mut self) -> Result<()>;

    /// Total packets received.
    fn get_nb_rx_pkts(&mut self, port: Option<u16>) -> Result<u64>;

    /// Total bytes received.
    fn get_nb_rx_bytes(&mut self, port: Option<u16>) -> Result<u64>;

    /// Total packets transmitted.
    fn get_nb_tx_pkts(&mut self, port: Option<u16>) -> Result<u64>;

    /// Total bytes transmitted.
    fn get_nb_tx_bytes(&mut self, port: Option<u16>) -> Result<u64>;

    /// Receive throughput in bits per second.
    fn get_rx_throughput(&mut self, port: Option<u16>) -> Result<u64>;

    /// Transmit throughput in bits per second.
    fn get_tx_throughput(&mut self, port: Option<u16>) -> Result<u64>;
}
