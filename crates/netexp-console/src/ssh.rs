//! Remote host reached through the local `ssh` client.
//!
//! Authentication, host keys, proxies and `~/.ssh/config` are all left to
//! the ssh client itself.

use tracing::info;

use netexp_core::{Channel, ExecRequest, RemoteHost, Result};

use crate::pipe::PipeChannel;
use crate::pty::PtyChannel;

/// A host reachable with `ssh <host>`.
#[derive(Debug, Clone)]
pub struct SshHost {
    host: String,
    program: String,
    extra_args: Vec<String>,
}

impl SshHost {
    /// Create a host using the `ssh` found on `PATH`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            program: "ssh".to_string(),
            extra_args: Vec::new(),
        }
    }

    /// Use a different ssh executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Pass additional options to ssh (e.g. `-o BatchMode=yes`).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments passed to the ssh client for `request`.
    pub fn command_args(&self, request: &ExecRequest) -> Vec<String> {
        let mut args = self.extra_args.clone();
        // -tt forces a remote pty even though our side is not a terminal.
        args.push(if request.pty { "-tt" } else { "-T" }.to_string());
        args.push(self.host.clone());
        args.push(request.shell_line());
        args
    }
}

impl RemoteHost for SshHost {
    fn hostname(&self) -> &str {
        &self.host
    }

    fn exec(&self, request: &ExecRequest) -> Result<Box<dyn Channel>> {
        info!(host = %self.host, command = %request.command, pty = request.pty, "remote command");
        let args = self.command_args(request);
        if request.pty {
            Ok(Box::new(PtyChannel::spawn(&self.program, &args)?))
        } else {
            Ok(Box::new(PipeChannel::spawn(&self.program, &args)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pty_request_args() {
        let host = SshHost::new("fpga-host").with_args(["-o", "BatchMode=yes"]);
        let request = ExecRequest::new("./run_console.sh 1-3")
            .with_pty()
            .in_dir("/opt/exp/hardware_test");

        assert_eq!(
            host.command_args(&request),
            vec![
                "-o",
                "BatchMode=yes",
                "-tt",
                "fpga-host",
                "cd '/opt/exp/hardware_test' && ./run_console.sh 1-3",
            ]
        );
    }

    #[test]
    fn test_plain_request_args() {
        let host = SshHost::new("gen");
        let args = host.command_args(&ExecRequest::new("capinfos -z /tmp/a.pcap"));
        assert_eq!(args, vec!["-T", "gen", "capinfos -z /tmp/a.pcap"]);
        assert_eq!(host.hostname(), "gen");
    }
}
