//! Intel FPGA device lifecycle.
//!
//! Bring-up runs in two stages, each with its own bounded retry loop:
//!
//! 1. Load the bitstream (optional). A loader exit status of 0 ends the
//!    stage. Output containing the synchronization fault marker fails at
//!    once since only a power cycle fixes it.
//! 2. Launch the JTAG console and auto-detect the device. The console is
//!    given time to start, the path setup command makes it list the
//!    JTAG-addressable devices, and exactly one listing line must match the
//!    board. The console is then bound to that device with `set_jtag`.
//!
//! Any failure leaves the device in [`DeviceState::Failed`].

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use netexp_console::{CancelAction, StreamWatcher, WatchOptions};
use netexp_core::{
    BringupSettings, Channel, Error, ExecRequest, NetexpConfig, RemoteHost, Result, INTERRUPT,
};

use crate::detect::{resolve_device, Detection};
use crate::patterns::{JTAG_PROMPT, SYNC_FAILED};

/// Lifecycle state of an [`IntelFpga`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Constructed, bring-up not started
    Uninitialized,
    /// Running the bitstream loader
    BitstreamLoading,
    /// Launching the JTAG console and detecting the device
    ConsoleLaunching,
    /// Console bound to the device; commands may be issued
    Ready,
    /// Bring-up failed; the device is unusable
    Failed,
    /// Console torn down
    Closed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::BitstreamLoading => "loading bitstream",
            Self::ConsoleLaunching => "launching console",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// An Intel FPGA reached through a JTAG console on a remote host.
pub struct IntelFpga<H: RemoteHost> {
    host: H,
    fpga_id: String,
    remote_dir: PathBuf,
    settings: BringupSettings,
    watcher: StreamWatcher,
    console: Option<Box<dyn Channel>>,
    device: Option<String>,
    state: DeviceState,
}

impl<H: RemoteHost> fmt::Debug for IntelFpga<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntelFpga")
            .field("host", &self.host.hostname())
            .field("fpga_id", &self.fpga_id)
            .field("remote_dir", &self.remote_dir)
            .field("device", &self.device)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<H: RemoteHost> IntelFpga<H> {
    /// Create a device handle without touching the host.
    ///
    /// Call [`setup`](Self::setup) to bring it up.
    pub fn new(
        host: H,
        fpga_id: impl Into<String>,
        remote_dir: impl Into<PathBuf>,
        settings: BringupSettings,
        watcher: StreamWatcher,
    ) -> Self {
        Self {
            host,
            fpga_id: fpga_id.into(),
            remote_dir: remote_dir.into(),
            settings,
            watcher,
            console: None,
            device: None,
            state: DeviceState::Uninitialized,
        }
    }

    /// Create a device and bring it up with the given configuration.
    pub fn connect(
        host: H,
        fpga_id: impl Into<String>,
        remote_dir: impl Into<PathBuf>,
        load_bitstream: bool,
        config: &NetexpConfig,
    ) -> Result<Self> {
        let mut fpga = Self::new(
            host,
            fpga_id,
            remote_dir,
            config.bringup.clone(),
            StreamWatcher::new(config.watch.clone()),
        );
        fpga.setup(load_bitstream)?;
        Ok(fpga)
    }

    /// Run bring-up: optionally load the bitstream, then launch the console.
    ///
    /// Only valid on a device that has not been brought up yet.
    pub fn setup(&mut self, load_bitstream: bool) -> Result<()> {
        if self.state != DeviceState::Uninitialized {
            return Err(Error::DeviceNotReady(format!(
                "bring-up already ran for FPGA {} (state: {})",
                self.fpga_id, self.state
            )));
        }

        let result = self.bring_up(load_bitstream);
        if let Err(e) = &result {
            error!("Bring-up of FPGA {} failed: {}", self.fpga_id, e);
            self.state = DeviceState::Failed;
            self.release_console();
        }
        result
    }

    fn bring_up(&mut self, load_bitstream: bool) -> Result<()> {
        if load_bitstream {
            self.state = DeviceState::BitstreamLoading;
            self.load_bitstream()?;
        } else {
            debug!("Skipping bitstream load for FPGA {}", self.fpga_id);
        }

        self.state = DeviceState::ConsoleLaunching;
        self.launch_console()?;

        self.state = DeviceState::Ready;
        info!(
            "FPGA {} ready on {} (device {})",
            self.fpga_id,
            self.host.hostname(),
            self.device.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    fn load_bitstream(&mut self) -> Result<()> {
        let request = self.script_request(&self.settings.load_bitstream_script);
        let max_attempts = self.settings.bitstream_attempts;
        let mut attempts = 0;

        loop {
            attempts += 1;
            info!(
                "Loading bitstream on FPGA {} (attempt {}/{})",
                self.fpga_id, attempts, max_attempts
            );

            let mut app = self.host.exec(&request)?;
            let output = self.watcher.watch(
                app.as_mut(),
                WatchOptions::until_exit().with_cancel(CancelAction::Interrupt),
            )?;
            let status = self.watcher.wait_exit_status(app.as_mut())?;
            if let Err(e) = app.close() {
                debug!("Closing bitstream loader channel: {}", e);
            }

            if status == 0 {
                return Ok(());
            }

            if SYNC_FAILED.is_match(&output) {
                return Err(Error::BitstreamSyncFailed { transcript: output });
            }

            warn!(
                "Bitstream loader exited with status {} on FPGA {}",
                status, self.fpga_id
            );
            if attempts >= max_attempts {
                return Err(Error::BitstreamLoadFailed { attempts, status });
            }
        }
    }

    fn launch_console(&mut self) -> Result<()> {
        let request = self.script_request(&self.settings.console_script);
        let max_attempts = self.settings.console_retries;
        let path_setup = format!("{}\n", self.settings.path_setup_command);
        let mut attempts = 0;

        loop {
            attempts += 1;
            info!(
                "Launching JTAG console for FPGA {} (attempt {}/{})",
                self.fpga_id, attempts, max_attempts
            );

            let mut app = self.host.exec(&request)?;
            self.watcher.watch(
                app.as_mut(),
                WatchOptions::until_exit()
                    .with_timeout(self.settings.console_startup_timeout())
                    .with_cancel(CancelAction::Interrupt),
            )?;

            app.send(path_setup.as_bytes())?;
            let listing = self.watcher.watch(
                app.as_mut(),
                WatchOptions::until_exit()
                    .with_timeout(self.settings.path_setup_timeout())
                    .with_cancel(CancelAction::Interrupt),
            )?;

            let matches = match resolve_device(&listing, &self.fpga_id) {
                Detection::Unique(device) => {
                    self.console = Some(app);
                    return self.bind(device);
                }
                other => other.matches(),
            };

            warn!(
                "Failed to determine device for FPGA {} ({} matching lines)",
                self.fpga_id, matches
            );
            if let Err(e) = app.send(&[INTERRUPT]) {
                debug!("Interrupting console runner: {}", e);
            }
            if let Err(e) = app.close() {
                debug!("Closing console runner channel: {}", e);
            }

            if attempts >= max_attempts {
                return Err(Error::DeviceDetectionFailed { attempts, matches });
            }
            self.watcher.pause(self.settings.retry_backoff());
        }
    }

    fn bind(&mut self, device: String) -> Result<()> {
        info!("Binding JTAG console to {}", device);
        let command = format!("set_jtag {device}");
        self.device = Some(device);
        self.send_commands(&[command])?;
        Ok(())
    }

    /// Run commands on the JTAG console and return its output.
    ///
    /// Each command waits for the console prompt or the configured command
    /// timeout before the next one is sent.
    pub fn run_jtag_commands<I, S>(&mut self, commands: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_ready()?;
        self.send_commands(commands)
    }

    fn send_commands<I, S>(&mut self, commands: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let timeout = self.settings.jtag_command_timeout();
        let console = self
            .console
            .as_mut()
            .ok_or_else(|| Error::DeviceNotReady("JTAG console is not running".to_string()))?;
        self.watcher
            .run_commands(console.as_mut(), commands, timeout, Some(&*JTAG_PROMPT))
    }

    /// The JTAG console, for handing off to an interactive passthrough.
    pub fn console_mut(&mut self) -> Result<&mut dyn Channel> {
        self.ensure_ready()?;
        match self.console.as_mut() {
            Some(console) => Ok(console.as_mut()),
            None => Err(Error::DeviceNotReady(
                "JTAG console is not running".to_string(),
            )),
        }
    }

    /// Tear down the console.
    ///
    /// A failed device stays [`DeviceState::Failed`]; any other device
    /// becomes [`DeviceState::Closed`].
    pub fn close(&mut self) -> Result<()> {
        let result = match self.console.take() {
            Some(mut console) => {
                debug!("Closing JTAG console for FPGA {}", self.fpga_id);
                console.close()
            }
            None => Ok(()),
        };
        if self.state != DeviceState::Failed {
            self.state = DeviceState::Closed;
        }
        result
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Device address resolved by auto-detection.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Vendor-assigned board identifier.
    pub fn fpga_id(&self) -> &str {
        &self.fpga_id
    }

    /// Remote working directory.
    pub fn remote_dir(&self) -> &Path {
        &self.remote_dir
    }

    /// Host the board is attached to.
    pub fn host(&self) -> &H {
        &self.host
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state == DeviceState::Ready {
            Ok(())
        } else {
            Err(Error::DeviceNotReady(format!(
                "FPGA {} is {}",
                self.fpga_id, self.state
            )))
        }
    }

    fn release_console(&mut self) {
        if let Some(mut console) = self.console.take() {
            if let Err(e) = console.close() {
                debug!("Closing JTAG console: {}", e);
            }
        }
    }

    /// Launch request for a vendor script, run as `./<name> <fpga_id>` from
    /// the script's directory under the remote working directory.
    fn script_request(&self, script: &str) -> ExecRequest {
        let path = Path::new(script);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.remote_dir.join(parent),
            _ => self.remote_dir.clone(),
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| script.to_string());

        ExecRequest::new(format!("./{} {}", name, self.fpga_id))
            .in_dir(dir)
            .with_pty()
            .sourcing_bashrc()
    }
}

impl<H: RemoteHost> Drop for IntelFpga<H> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close FPGA {}: {}", self.fpga_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netexp_console::testing::ScriptedHost;

    #[test]
    fn test_script_request() {
        let fpga = IntelFpga::new(
            ScriptedHost::new("host"),
            "1-3",
            "/home/user/exp",
            BringupSettings::default(),
            StreamWatcher::default(),
        );

        let request = fpga.script_request("hardware_test/load_bitstream.sh");
        assert_eq!(request.command, "./load_bitstream.sh 1-3");
        assert_eq!(
            request.cwd,
            Some(PathBuf::from("/home/user/exp/hardware_test"))
        );
        assert!(request.pty);
        assert!(request.source_bashrc);
    }

    #[test]
    fn test_script_request_without_directory() {
        let fpga = IntelFpga::new(
            ScriptedHost::new("host"),
            "7",
            "/srv",
            BringupSettings::default(),
            StreamWatcher::default(),
        );

        let request = fpga.script_request("run_console.sh");
        assert_eq!(request.command, "./run_console.sh 7");
        assert_eq!(request.cwd, Some(PathBuf::from("/srv")));
    }

    #[test]
    fn test_new_device_is_not_ready() {
        let mut fpga = IntelFpga::new(
            ScriptedHost::new("host"),
            "1",
            "/srv",
            BringupSettings::default(),
            StreamWatcher::default(),
        );

        assert_eq!(fpga.state(), DeviceState::Uninitialized);
        assert!(matches!(
            fpga.run_jtag_commands(["get_service_paths device"]),
            Err(Error::DeviceNotReady(_))
        ));
        assert!(fpga.console_mut().is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DeviceState::Ready.to_string(), "ready");
        assert_eq!(DeviceState::BitstreamLoading.to_string(), "loading bitstream");
    }
}
