//! JTAG device auto-detection.
//!
//! The console runner prints every JTAG-addressable device on the host. A
//! line belongs to our board when it carries the board's marker and has the
//! `<address>: <description>` shape. Only a single such line resolves the
//! device; anything else means the listing is incomplete or ambiguous.

use crate::patterns::{device_marker, DEVICE_SEPARATOR};

/// Outcome of scanning a device listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Exactly one line matched; holds the device address
    Unique(String),
    /// No line matched
    Missing,
    /// More than one line matched
    Ambiguous(usize),
}

impl Detection {
    /// Number of matching lines.
    pub fn matches(&self) -> usize {
        match self {
            Self::Unique(_) => 1,
            Self::Missing => 0,
            Self::Ambiguous(n) => *n,
        }
    }
}

/// Lines of `transcript` that describe the device `fpga_id`.
pub fn device_lines<'a>(transcript: &'a str, fpga_id: &str) -> Vec<&'a str> {
    let marker = device_marker(fpga_id);
    transcript
        .split('\n')
        .filter(|line| line.contains(&marker) && line.contains(DEVICE_SEPARATOR))
        .collect()
}

/// Resolve the address of `fpga_id` from a device listing.
///
/// The address is everything before the first colon of the single matching
/// line.
pub fn resolve_device(transcript: &str, fpga_id: &str) -> Detection {
    let lines = device_lines(transcript, fpga_id);
    match lines.as_slice() {
        [] => Detection::Missing,
        [line] => {
            let address = line.split(':').next().unwrap_or_default();
            Detection::Unique(address.to_string())
        }
        _ => Detection::Ambiguous(lines.len()),
    }
}
