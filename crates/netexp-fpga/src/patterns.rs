//! Console text the bring-up depends on, reproduced verbatim from the
//! vendor tools.

use lazy_static::lazy_static;
use netexp_core::Pattern;

/// Prompt printed by the JTAG system console when it is idle.
pub const JTAG_PROMPT_TEXT: &str = "\r\n% ";

/// Printed by the bitstream loader when the board needs a power cycle.
pub const SYNC_FAILED_TEXT: &str = "Synchronization failed";

/// Vendor tag that precedes the cable name in a device listing line.
pub const VENDOR_TAG: &str = "Intel ";

/// Separator between the device address and its description.
pub const DEVICE_SEPARATOR: &str = ": ";

lazy_static! {
    /// Idle prompt of the JTAG console.
    pub static ref JTAG_PROMPT: Pattern =
        Pattern::new(JTAG_PROMPT_TEXT).expect("JTAG prompt is a valid pattern");

    /// Hardware fault marker in bitstream loader output.
    pub static ref SYNC_FAILED: Pattern =
        Pattern::literal(SYNC_FAILED_TEXT).expect("fault marker is a valid pattern");
}

/// Marker identifying listing lines for the device with `fpga_id`.
pub fn device_marker(fpga_id: &str) -> String {
    format!("@1#{fpga_id}#{VENDOR_TAG}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_marker() {
        assert_eq!(device_marker("1-3"), "@1#1-3#Intel ");
    }

    #[test]
    fn test_jtag_prompt_window() {
        assert_eq!(JTAG_PROMPT.char_len(), 4);
        assert!(JTAG_PROMPT.is_match_in_tail("set_jtag x\r\n% ", Some(4)));
    }

    #[test]
    fn test_sync_failed_marker() {
        assert!(SYNC_FAILED.is_match("Error (209040): Synchronization failed\r\n"));
        assert!(!SYNC_FAILED.is_match("synchronization ok"));
    }
}
