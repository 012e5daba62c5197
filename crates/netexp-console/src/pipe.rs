//! Pipe-backed channel for commands that run without a terminal.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use tracing::{debug, info, warn};

use netexp_core::{Channel, Error, Result};

/// Reads one pipe on a background thread and forwards its chunks.
#[derive(Debug)]
struct PipeReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    eof: bool,
}

impl PipeReader {
    fn spawn<R: Read + Send + 'static>(mut source: R, name: &'static str) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buffer = [0u8; 4096];
            loop {
                match source.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buffer[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("{} reader stopped: {}", name, e);
                        break;
                    }
                }
            }
        });
        Self {
            rx,
            pending: Vec::new(),
            eof: false,
        }
    }

    fn poll(&mut self) {
        while !self.eof {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.eof = true,
            }
        }
    }

    fn ready(&mut self) -> bool {
        self.poll();
        !self.pending.is_empty()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.poll();
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }

    fn finished(&mut self) -> bool {
        self.poll();
        self.eof
    }
}

/// A child process with separate stdout and stderr pipes.
///
/// The exit status is only reported once both pipes have been closed by the
/// child, so everything it printed is available to the watcher by then.
#[derive(Debug)]
pub struct PipeChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: PipeReader,
    stderr: PipeReader,
    exit_status: Option<u32>,
    closed: bool,
}

impl PipeChannel {
    /// Spawn `program` with `args`.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        info!("Spawning process: program='{}' args={:?}", program, args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Channel(format!("Failed to spawn '{program}': {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Channel("child stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Channel("child stderr not captured".to_string()))?;
        let stdin = child.stdin.take();

        Ok(Self {
            child,
            stdin,
            stdout: PipeReader::spawn(stdout, "stdout"),
            stderr: PipeReader::spawn(stderr, "stderr"),
            exit_status: None,
            closed: false,
        })
    }
}

impl Channel for PipeChannel {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Channel("process input is closed".to_string()))?;
        stdin.write_all(data)?;
        stdin.flush()?;
        Ok(data.len())
    }

    fn recv_ready(&mut self) -> Result<bool> {
        Ok(self.stdout.ready())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stdout.read(buf))
    }

    fn recv_stderr_ready(&mut self) -> Result<bool> {
        Ok(self.stderr.ready())
    }

    fn recv_stderr(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stderr.read(buf))
    }

    fn exit_status_ready(&mut self) -> Result<bool> {
        Ok(self.exit_status()?.is_some())
    }

    fn exit_status(&mut self) -> Result<Option<u32>> {
        if self.exit_status.is_none() && self.stdout.finished() && self.stderr.finished() {
            if let Some(status) = self.child.try_wait()? {
                // Killed by a signal: report the shell convention 128 + signo.
                #[cfg(unix)]
                let code = {
                    use std::os::unix::process::ExitStatusExt;
                    status
                        .code()
                        .or_else(|| status.signal().map(|signo| 128 + signo))
                        .unwrap_or(255)
                };
                #[cfg(not(unix))]
                let code = status.code().unwrap_or(255);

                debug!("process exited with {}", code);
                self.exit_status = Some(code as u32);
            }
        }
        Ok(self.exit_status)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stdin = None;

        if self.child.try_wait()?.is_none() {
            if let Err(e) = self.child.kill() {
                warn!("Failed to kill process: {}", e);
            }
            let _ = self.child.wait();
        }
        Ok(())
    }
}

impl Drop for PipeChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close process channel: {}", e);
        }
    }
}
