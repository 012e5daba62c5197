//! Configuration types for netexp.
//!
//! Every retry bound, timeout and polling interval used by the console
//! drivers lives here, so experiments can tune them from one YAML file.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Top-level configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetexpConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Console watching settings
    pub watch: WatchSettings,
    /// FPGA bring-up settings
    pub bringup: BringupSettings,
    /// Packet generator settings
    pub pktgen: PktgenSettings,
}

impl Default for NetexpConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            watch: WatchSettings::default(),
            bringup: BringupSettings::default(),
            pktgen: PktgenSettings::default(),
        }
    }
}

impl NetexpConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: NetexpConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.watch.poll_interval_ms == 0 {
            return Err(Error::Config("watch.poll_interval_ms must be > 0".into()));
        }
        if self.watch.read_chunk == 0 {
            return Err(Error::Config("watch.read_chunk must be > 0".into()));
        }
        if self.watch.max_match_length == 0 {
            return Err(Error::Config("watch.max_match_length must be > 0".into()));
        }
        if self.bringup.bitstream_attempts == 0 || self.bringup.console_retries == 0 {
            return Err(Error::Config(
                "bring-up retry bounds must be > 0".into(),
            ));
        }
        if self.pktgen.progress_poll_ms == 0 {
            return Err(Error::Config("pktgen.progress_poll_ms must be > 0".into()));
        }
        self.pktgen.default_init_ip()?;
        Ok(())
    }
}

/// Settings for the stream watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Sleep between polls of a channel, in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum bytes read per stream per poll
    pub read_chunk: usize,
    /// Match window for waits that are not bounded by a prompt length
    pub max_match_length: usize,
    /// Mirror console output to local stdout
    pub forward_stdout: bool,
    /// Mirror console error output to local stderr
    pub forward_stderr: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            read_chunk: 512,
            max_match_length: 1024,
            forward_stdout: true,
            forward_stderr: true,
        }
    }
}

impl WatchSettings {
    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Settings for FPGA bring-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BringupSettings {
    /// Bitstream loader, relative to the remote working directory
    pub load_bitstream_script: String,
    /// JTAG console runner, relative to the remote working directory
    pub console_script: String,
    /// Command that makes the console print the device list
    pub path_setup_command: String,
    /// Bitstream load attempts before giving up
    pub bitstream_attempts: u32,
    /// Console launch attempts before giving up
    pub console_retries: u32,
    /// Pause between console launch attempts, in milliseconds
    pub retry_backoff_ms: u64,
    /// Time allowed for the console to start, in milliseconds
    pub console_startup_timeout_ms: u64,
    /// Time allowed for the device list to print, in milliseconds
    pub path_setup_timeout_ms: u64,
    /// Per-command timeout on the JTAG console, in milliseconds
    pub jtag_command_timeout_ms: u64,
}

impl Default for BringupSettings {
    fn default() -> Self {
        Self {
            load_bitstream_script: "hardware_test/load_bitstream.sh".to_string(),
            console_script: "hardware_test/run_console.sh".to_string(),
            path_setup_command: "source path.tcl".to_string(),
            bitstream_attempts: 5,
            console_retries: 5,
            retry_backoff_ms: 1000,
            console_startup_timeout_ms: 10_000,
            path_setup_timeout_ms: 2_000,
            jtag_command_timeout_ms: 1_000,
        }
    }
}

impl BringupSettings {
    /// Pause between console launch attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Console startup timeout.
    pub fn console_startup_timeout(&self) -> Duration {
        Duration::from_millis(self.console_startup_timeout_ms)
    }

    /// Device list timeout.
    pub fn path_setup_timeout(&self) -> Duration {
        Duration::from_millis(self.path_setup_timeout_ms)
    }

    /// JTAG command timeout.
    pub fn jtag_command_timeout(&self) -> Duration {
        Duration::from_millis(self.jtag_command_timeout_ms)
    }
}

/// Settings for the DPDK pktgen controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PktgenSettings {
    /// Generator executable on the remote host
    pub binary: String,
    /// Run the generator through sudo
    pub use_sudo: bool,
    /// Per-command timeout on the generator console, in milliseconds
    pub command_timeout_ms: u64,
    /// Interval between progress polls, in milliseconds
    pub progress_poll_ms: u64,
    /// Pause after sending quit, in milliseconds
    pub quit_grace_ms: u64,
    /// Pause after relaunching for a new pcap, in milliseconds
    pub relaunch_settle_ms: u64,
    /// First address of generated address ranges
    pub default_init_ip: String,
    /// Pcap inspection executable on the remote host
    pub capinfos: String,
}

impl Default for PktgenSettings {
    fn default() -> Self {
        Self {
            binary: "pktgen".to_string(),
            use_sudo: true,
            command_timeout_ms: 500,
            progress_poll_ms: 1000,
            quit_grace_ms: 100,
            relaunch_settle_ms: 1000,
            default_init_ip: "192.168.0.0".to_string(),
            capinfos: "capinfos".to_string(),
        }
    }
}

impl PktgenSettings {
    /// Console command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Progress poll interval.
    pub fn progress_poll(&self) -> Duration {
        Duration::from_millis(self.progress_poll_ms)
    }

    /// Grace period after quit.
    pub fn quit_grace(&self) -> Duration {
        Duration::from_millis(self.quit_grace_ms)
    }

    /// Settle time after a relaunch.
    pub fn relaunch_settle(&self) -> Duration {
        Duration::from_millis(self.relaunch_settle_ms)
    }

    /// Parsed default base address.
    pub fn default_init_ip(&self) -> Result<IpAddr> {
        self.default_init_ip.parse().map_err(|_| {
            Error::Config(format!(
                "pktgen.default_init_ip is not an address: {}",
                self.default_init_ip
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetexpConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.watch.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.watch.max_match_length, 1024);
        assert_eq!(config.bringup.bitstream_attempts, 5);
        assert_eq!(config.bringup.console_retries, 5);
        assert_eq!(config.bringup.retry_backoff(), Duration::from_secs(1));
        assert_eq!(
            config.bringup.console_startup_timeout(),
            Duration::from_secs(10)
        );
        assert_eq!(config.bringup.path_setup_timeout(), Duration::from_secs(2));
        assert_eq!(config.pktgen.progress_poll(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_validation() {
        let config = NetexpConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_poll_interval() {
        let mut config = NetexpConfig::default();
        config.watch.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_match_window_is_rejected() {
        let err = NetexpConfig::from_yaml("watch:\n  max_match_length: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_match_length"));
    }

    #[test]
    fn test_invalid_retry_bound() {
        let mut config = NetexpConfig::default();
        config.bringup.console_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_init_ip() {
        let mut config = NetexpConfig::default();
        config.pktgen.default_init_ip = "not-an-ip".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
log_level: debug

watch:
  poll_interval_ms: 5
  forward_stdout: false

bringup:
  console_retries: 3
  retry_backoff_ms: 250

pktgen:
  use_sudo: false
  default_init_ip: "10.0.0.0"
"#;

        let config = NetexpConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.watch.poll_interval_ms, 5);
        assert!(!config.watch.forward_stdout);
        assert!(config.watch.forward_stderr);
        assert_eq!(config.watch.read_chunk, 512);
        assert_eq!(config.bringup.console_retries, 3);
        assert_eq!(config.bringup.bitstream_attempts, 5);
        assert_eq!(config.bringup.retry_backoff(), Duration::from_millis(250));
        assert!(!config.pktgen.use_sudo);
        assert_eq!(
            config.pktgen.default_init_ip().unwrap(),
            "10.0.0.0".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_parse_yaml_rejects_bad_values() {
        let yaml = r#"
watch:
  read_chunk: 0
"#;
        assert!(NetexpConfig::from_yaml(yaml).is_err());
    }
}
