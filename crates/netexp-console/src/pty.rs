//! PTY-backed channel using portable-pty.

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use tracing::{debug, error, info, warn};

use netexp_core::{Channel, Error, Result};

/// Rows of the pseudo-terminal handed to the child.
const PTY_ROWS: u16 = 50;

/// Columns of the pseudo-terminal. Wide enough that device listings do not
/// wrap in the middle of a line.
const PTY_COLS: u16 = 250;

/// A process running inside a local pseudo-terminal.
///
/// Standard error is merged into the terminal, so the error stream of this
/// channel is always empty.
pub struct PtyChannel {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Option<Box<dyn Write + Send>>,
    reader: Box<dyn Read + Send>,
    /// Bytes read while probing readiness
    pending: Vec<u8>,
    exit_status: Option<u32>,
    eof: bool,
    closed: bool,
}

impl std::fmt::Debug for PtyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyChannel")
            .field("pending", &self.pending.len())
            .field("exit_status", &self.exit_status)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl PtyChannel {
    /// Spawn `program` with `args` inside a new PTY.
    ///
    /// # Example
    /// ```no_run
    /// use netexp_console::PtyChannel;
    ///
    /// # fn example() -> netexp_core::Result<()> {
    /// let channel = PtyChannel::spawn("ssh", &["-tt".into(), "fpga-host".into(), "ls".into()])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        info!("Spawning PTY: program='{}' args={:?}", program, args);

        let pty_system = native_pty_system();
        let pty_size = PtySize {
            rows: PTY_ROWS,
            cols: PTY_COLS,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system.openpty(pty_size).map_err(|e| {
            error!("Failed to open PTY: {}", e);
            Error::Channel(format!("Failed to open PTY: {e}"))
        })?;

        let mut cmd = CommandBuilder::new(program);
        for arg in args {
            cmd.arg(arg);
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!("Failed to spawn '{}': {}", program, e);
            Error::Channel(format!("Failed to spawn command: {e}"))
        })?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::Channel(format!("Failed to take writer: {e}")))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::Channel(format!("Failed to clone reader: {e}")))?;

        // Reads must never block the polling loop.
        #[cfg(unix)]
        {
            if let Some(master_fd) = pair.master.as_raw_fd() {
                unsafe {
                    let flags = libc::fcntl(master_fd, libc::F_GETFL, 0);
                    if flags != -1
                        && libc::fcntl(master_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1
                    {
                        error!("Failed to set master PTY to non-blocking mode");
                    }
                }
            }
        }

        Ok(Self {
            master: pair.master,
            child,
            writer: Some(writer),
            reader,
            pending: Vec::new(),
            exit_status: None,
            eof: false,
            closed: false,
        })
    }

    fn fill_pending(&mut self) -> Result<()> {
        if !self.pending.is_empty() || self.eof || self.closed {
            return Ok(());
        }

        let mut buffer = [0u8; 4096];
        match self.reader.read(&mut buffer) {
            Ok(0) => {
                self.eof = true;
            }
            Ok(n) => {
                self.pending.extend_from_slice(&buffer[..n]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                // Linux reports EIO on the master once the child side is gone.
                debug!("PTY read ended: {}", e);
                self.eof = true;
            }
        }
        Ok(())
    }

    /// Resize the terminal seen by the child.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::Channel(format!("Resize failed: {e}")))
    }
}

impl Channel for PtyChannel {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::Channel("PTY channel is closed".to_string()))?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(data.len())
    }

    fn recv_ready(&mut self) -> Result<bool> {
        self.fill_pending()?;
        Ok(!self.pending.is_empty())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.fill_pending()?;
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn recv_stderr_ready(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn recv_stderr(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn exit_status_ready(&mut self) -> Result<bool> {
        Ok(self.exit_status()?.is_some())
    }

    fn exit_status(&mut self) -> Result<Option<u32>> {
        if self.exit_status.is_none() {
            if let Some(status) = self.child.try_wait()? {
                debug!("PTY child exited with {}", status.exit_code());
                self.exit_status = Some(status.exit_code());
            }
        }
        Ok(self.exit_status)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer = None;

        if self.exit_status()?.is_none() {
            info!("Killing PTY process");
            if let Err(e) = self.child.kill() {
                warn!("Failed to kill PTY child: {}", e);
            }
        }
        Ok(())
    }
}

impl Drop for PtyChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close PTY channel: {}", e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pty_echo_and_exit() {
        let mut channel = PtyChannel::spawn("/bin/sh", &["-c".into(), "echo hello".into()]).unwrap();

        let mut output = Vec::new();
        for _ in 0..200 {
            let mut buf = [0u8; 512];
            if channel.recv_ready().unwrap() {
                let n = channel.recv(&mut buf).unwrap();
                output.extend_from_slice(&buf[..n]);
            }
            if channel.exit_status_ready().unwrap() && !channel.recv_ready().unwrap() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        assert!(String::from_utf8_lossy(&output).contains("hello"));
        assert_eq!(channel.exit_status().unwrap(), Some(0));
    }

    #[test]
    fn test_pty_close_kills_child() {
        let mut channel = PtyChannel::spawn("/bin/sh", &[]).unwrap();
        assert!(!channel.exit_status_ready().unwrap());
        channel.resize(40, 120).unwrap();

        channel.close().unwrap();
        channel.close().unwrap();
        assert!(channel.send(b"echo hi\n").is_err());
    }
}
