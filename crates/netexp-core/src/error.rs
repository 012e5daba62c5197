//! Error types for netexp.

use thiserror::Error;

/// Main error type for netexp operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or channel failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// A local interrupt arrived while waiting on a console
    #[error("Interrupted while waiting for console output")]
    Interrupted,

    /// Invalid regular expression for a console pattern
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The bitstream loader reported a synchronization fault
    #[error("Synchronization failed, try power cycling the host")]
    BitstreamSyncFailed {
        /// Loader output that contained the fault marker
        transcript: String,
    },

    /// The bitstream loader kept failing
    #[error("Failed to load bitstream {attempts} times (last exit status {status})")]
    BitstreamLoadFailed {
        /// Number of attempts made
        attempts: u32,
        /// Exit status of the last attempt
        status: u32,
    },

    /// JTAG device auto-detection never resolved a single device
    #[error("Failed to determine device {attempts} times (last attempt matched {matches} lines)")]
    DeviceDetectionFailed {
        /// Number of attempts made
        attempts: u32,
        /// Matching device lines in the last attempt
        matches: usize,
    },

    /// Command issued to a device that is not ready
    #[error("Device not ready: {0}")]
    DeviceNotReady(String),

    /// The generator process exited before becoming ready
    #[error("Cannot run pktgen (exit status {status})")]
    PktgenExited {
        /// Exit status of the generator process
        status: u32,
    },

    /// The generator stopped without printing its prompt
    #[error("Pktgen never reached its prompt")]
    PktgenNotReady {
        /// Output collected while waiting
        transcript: String,
    },

    /// Command issued after the generator was closed
    #[error("Pktgen is not active")]
    PktgenInactive,

    /// The transmitted-packet counter stopped advancing
    #[error("Pktgen is not making progress ({tx_pkts} of {target} packets sent)")]
    NoProgress {
        /// Counter value seen on two consecutive polls
        tx_pkts: u64,
        /// Count at which the run would have completed
        target: u64,
    },

    /// Rate outside (0, 100]
    #[error("Invalid rate: {0} (must be in (0, 100])")]
    InvalidRate(f64),

    /// Waiting for completion of a transmission that has no packet count
    #[error("Transmission was started without a packet count and never completes")]
    UnboundedTransmission,

    /// A statistics query returned no numeric value
    #[error("Could not parse statistic from output: {output:?}")]
    StatParse {
        /// Raw console output
        output: String,
    },

    /// Pcap inspection failed or printed something unexpected
    #[error("Error processing remote pcap (status {status:?}, output: {output:?})")]
    PcapInspect {
        /// Exit status of the inspection tool, if it ran
        status: Option<u32>,
        /// Tool output
        output: String,
    },

    /// Address range does not fit the address family
    #[error("Invalid address range: {0}")]
    AddressRange(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or parameters (generic)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitstream_load_failed_names_attempts() {
        let err = Error::BitstreamLoadFailed {
            attempts: 5,
            status: 1,
        };
        assert_eq!(
            err.to_string(),
            "Failed to load bitstream 5 times (last exit status 1)"
        );
    }

    #[test]
    fn test_device_detection_failed_names_attempts() {
        let err = Error::DeviceDetectionFailed {
            attempts: 5,
            matches: 2,
        };
        assert!(err.to_string().starts_with("Failed to determine device 5 times"));
    }

    #[test]
    fn test_no_progress_error() {
        let err = Error::NoProgress {
            tx_pkts: 700,
            target: 1500,
        };
        assert_eq!(
            err.to_string(),
            "Pktgen is not making progress (700 of 1500 packets sent)"
        );
    }

    #[test]
    fn test_invalid_rate_error() {
        let err = Error::InvalidRate(120.0);
        assert_eq!(err.to_string(), "Invalid rate: 120 (must be in (0, 100])");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_regex_error_conversion() {
        let regex_err = regex::Regex::new("([unclosed").unwrap_err();
        let err: Error = regex_err.into();
        assert!(matches!(err, Error::InvalidPattern(_)));
    }
}
