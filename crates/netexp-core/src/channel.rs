//! Capability traits for remote byte channels.
//!
//! The console engine never opens connections itself. It is handed a
//! [`RemoteHost`] that can launch commands, and drives the resulting
//! [`Channel`]s through non-blocking reads and writes.

use std::path::PathBuf;

use crate::Result;

/// Control byte sent to a console to interrupt the foreground process.
pub const INTERRUPT: u8 = 0x03;

/// A duplex byte channel attached to a remote process.
///
/// All methods are non-blocking. `recv` and `recv_stderr` should only be
/// called after the matching readiness check returned `true`; they return
/// `Ok(0)` when nothing is available.
pub trait Channel: Send {
    /// Write bytes to the process input.
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Whether output bytes are available.
    fn recv_ready(&mut self) -> Result<bool>;

    /// Read available output bytes into `buf`.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Whether error-stream bytes are available.
    fn recv_stderr_ready(&mut self) -> Result<bool>;

    /// Read available error-stream bytes into `buf`.
    fn recv_stderr(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Whether the remote process has reported an exit status.
    fn exit_status_ready(&mut self) -> Result<bool>;

    /// Exit status of the remote process, `None` while it is still running.
    fn exit_status(&mut self) -> Result<Option<u32>>;

    /// Tear the channel down. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        (**self).send(data)
    }

    fn recv_ready(&mut self) -> Result<bool> {
        (**self).recv_ready()
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).recv(buf)
    }

    fn recv_stderr_ready(&mut self) -> Result<bool> {
        (**self).recv_stderr_ready()
    }

    fn recv_stderr(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).recv_stderr(buf)
    }

    fn exit_status_ready(&mut self) -> Result<bool> {
        (**self).exit_status_ready()
    }

    fn exit_status(&mut self) -> Result<Option<u32>> {
        (**self).exit_status()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// A command to launch on a remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Command line to execute
    pub command: String,

    /// Directory to change into before running the command
    pub cwd: Option<PathBuf>,

    /// Allocate a pseudo-terminal for the process
    pub pty: bool,

    /// Source the login shell rc file first (vendor tool environments)
    pub source_bashrc: bool,
}

impl ExecRequest {
    /// Create a request for a plain command without a pty.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            pty: false,
            source_bashrc: false,
        }
    }

    /// Run inside a pseudo-terminal.
    pub fn with_pty(mut self) -> Self {
        self.pty = true;
        self
    }

    /// Change into `dir` before running.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Source `~/.bashrc` before running.
    pub fn sourcing_bashrc(mut self) -> Self {
        self.source_bashrc = true;
        self
    }

    /// Render the shell line executed on the remote side.
    pub fn shell_line(&self) -> String {
        let mut line = String::new();
        if self.source_bashrc {
            line.push_str("source ~/.bashrc; ");
        }
        if let Some(dir) = &self.cwd {
            line.push_str(&format!("cd '{}' && ", dir.display()));
        }
        line.push_str(&self.command);
        line
    }
}

/// Something that can launch commands and hand back their channels.
pub trait RemoteHost {
    /// Host name used for logging and diagnostics.
    fn hostname(&self) -> &str;

    /// Launch a command and return its channel.
    fn exec(&self, request: &ExecRequest) -> Result<Box<dyn Channel>>;
}
