//! In-memory channels, hosts and pacers for deterministic tests.
//!
//! [`ScriptedChannel`] plays back queued output and answers commands through
//! responders; [`ScriptedHost`] hands out scripted channels in launch order;
//! [`ManualPacer`] runs the polling loops on a virtual clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use netexp_core::{Channel, Error, ExecRequest, RemoteHost, Result};

use crate::pacer::Pacer;

type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

#[derive(Default)]
struct ScriptState {
    stdout: VecDeque<Vec<u8>>,
    stderr: VecDeque<Vec<u8>>,
    sent: Vec<u8>,
    responders: Vec<Responder>,
    exit_code: Option<u32>,
    closed: bool,
}

impl ScriptState {
    fn drained(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

fn pop_chunk(queue: &mut VecDeque<Vec<u8>>, buf: &mut [u8]) -> usize {
    let Some(mut chunk) = queue.pop_front() else {
        return 0;
    };
    let n = buf.len().min(chunk.len());
    buf[..n].copy_from_slice(&chunk[..n]);
    if n < chunk.len() {
        queue.push_front(chunk.split_off(n));
    }
    n
}

/// A scripted console.
///
/// Clones share state, so a test can keep a handle after moving the channel
/// into a driver. Each queued chunk is returned by one `recv` call. The
/// process counts as exited once an exit code is set and all queued output
/// has been read.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    state: Arc<Mutex<ScriptState>>,
}

impl std::fmt::Debug for ScriptedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ScriptedChannel")
            .field("queued_stdout", &state.stdout.len())
            .field("queued_stderr", &state.stderr.len())
            .field("sent", &state.sent.len())
            .field("exit_code", &state.exit_code)
            .field("closed", &state.closed)
            .finish()
    }
}

impl ScriptedChannel {
    /// Create an empty, running channel.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue one chunk of output.
    pub fn push_output(&self, text: &str) -> &Self {
        self.lock().stdout.push_back(text.as_bytes().to_vec());
        self
    }

    /// Queue one chunk of error output.
    pub fn push_stderr(&self, text: &str) -> &Self {
        self.lock().stderr.push_back(text.as_bytes().to_vec());
        self
    }

    /// Exit with `code` once queued output is consumed.
    pub fn exit_with(&self, code: u32) -> &Self {
        self.lock().exit_code = Some(code);
        self
    }

    /// Queue `reply` every time sent data contains `trigger`.
    pub fn respond(&self, trigger: &str, reply: &str) -> &Self {
        let trigger = trigger.to_string();
        let reply = reply.to_string();
        self.respond_with(move |sent| sent.contains(&trigger).then(|| reply.clone()))
    }

    /// Queue whatever `responder` returns for each send.
    pub fn respond_with(
        &self,
        responder: impl FnMut(&str) -> Option<String> + Send + 'static,
    ) -> &Self {
        self.lock().responders.push(Box::new(responder));
        self
    }

    /// Every byte sent so far.
    pub fn sent(&self) -> Vec<u8> {
        self.lock().sent.clone()
    }

    /// Sent bytes as text.
    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.lock().sent).into_owned()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Channel for ScriptedChannel {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::Channel("scripted channel is closed".to_string()));
        }
        state.sent.extend_from_slice(data);

        let text = String::from_utf8_lossy(data).into_owned();
        let mut replies = Vec::new();
        for responder in state.responders.iter_mut() {
            if let Some(reply) = responder(&text) {
                replies.push(reply.into_bytes());
            }
        }
        state.stdout.extend(replies);
        Ok(data.len())
    }

    fn recv_ready(&mut self) -> Result<bool> {
        Ok(!self.lock().stdout.is_empty())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(pop_chunk(&mut self.lock().stdout, buf))
    }

    fn recv_stderr_ready(&mut self) -> Result<bool> {
        Ok(!self.lock().stderr.is_empty())
    }

    fn recv_stderr(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(pop_chunk(&mut self.lock().stderr, buf))
    }

    fn exit_status_ready(&mut self) -> Result<bool> {
        let state = self.lock();
        Ok(state.exit_code.is_some() && state.drained())
    }

    fn exit_status(&mut self) -> Result<Option<u32>> {
        let state = self.lock();
        Ok(state.exit_code.filter(|_| state.drained()))
    }

    fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

#[derive(Default)]
struct HostState {
    channels: VecDeque<ScriptedChannel>,
    requests: Vec<ExecRequest>,
}

/// A host that returns pre-scripted channels in launch order.
#[derive(Clone)]
pub struct ScriptedHost {
    hostname: String,
    state: Arc<Mutex<HostState>>,
}

impl ScriptedHost {
    /// Create a host with no scripted launches.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Script the next launch. Returns a handle to the channel.
    pub fn expect_launch(&self, channel: ScriptedChannel) -> ScriptedChannel {
        self.lock().channels.push_back(channel.clone());
        channel
    }

    /// Every launch request received so far.
    pub fn requests(&self) -> Vec<ExecRequest> {
        self.lock().requests.clone()
    }

    /// Number of scripted launches not yet used.
    pub fn remaining(&self) -> usize {
        self.lock().channels.len()
    }
}

impl RemoteHost for ScriptedHost {
    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn exec(&self, request: &ExecRequest) -> Result<Box<dyn Channel>> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        let channel = state.channels.pop_front().ok_or_else(|| {
            Error::Channel(format!("no scripted channel for '{}'", request.command))
        })?;
        Ok(Box::new(channel))
    }
}

/// A pacer with a virtual clock.
///
/// `sleep` returns immediately and advances the clock. An interrupt can be
/// scheduled to fire on the N-th sleep.
#[derive(Debug)]
pub struct ManualPacer {
    origin: Instant,
    elapsed_nanos: AtomicU64,
    sleeps: AtomicU64,
    interrupt_at: AtomicU64,
}

impl Default for ManualPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualPacer {
    /// Create a pacer at virtual time zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_nanos: AtomicU64::new(0),
            sleeps: AtomicU64::new(0),
            interrupt_at: AtomicU64::new(u64::MAX),
        }
    }

    /// Deliver an interrupt once `sleeps` sleeps have happened.
    pub fn interrupt_after(&self, sleeps: u64) {
        self.interrupt_at.store(sleeps, Ordering::SeqCst);
    }

    /// Virtual time elapsed.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }

    /// Number of sleeps so far.
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Pacer for ManualPacer {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.elapsed_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }

    fn interrupted(&self) -> bool {
        let at = self.interrupt_at.load(Ordering::SeqCst);
        if self.sleep_count() >= at {
            self.interrupt_at.store(u64::MAX, Ordering::SeqCst);
            return true;
        }
        false
    }
}
