//! Stream watching: poll a channel until something tells us to stop.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use netexp_core::{Channel, Error, Pattern, Result, WatchSettings, INTERRUPT};

use crate::pacer::{Pacer, SystemPacer};

/// Predicate evaluated on every poll when no stop pattern matched.
pub type StopPredicate<'a> = Box<dyn FnMut(&mut dyn Channel) -> Result<bool> + 'a>;

/// When to stop watching, in addition to the stop pattern and timeout.
pub enum StopCondition<'a> {
    /// Stop once the remote process has reported an exit status
    ProcessExit,
    /// Only the stop pattern or the timeout can end the watch
    Never,
    /// Stop when the predicate returns true
    Predicate(StopPredicate<'a>),
}

impl fmt::Debug for StopCondition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessExit => f.write_str("ProcessExit"),
            Self::Never => f.write_str("Never"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// What to do to the remote side when a watch is interrupted locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelAction {
    /// Leave the remote process alone
    #[default]
    None,
    /// Send the interrupt control byte (0x03)
    Interrupt,
    /// Close the channel
    Close,
}

/// Options for a single watch.
#[derive(Debug)]
pub struct WatchOptions<'a> {
    /// Condition checked when the stop pattern has not matched
    pub stop_condition: StopCondition<'a>,

    /// Action run before an interrupt is propagated
    pub on_cancel: CancelAction,

    /// Soft timeout; checked after each drain cycle
    pub timeout: Option<Duration>,

    /// Mirror output to local stdout
    pub forward_stdout: bool,

    /// Mirror error output to local stderr
    pub forward_stderr: bool,

    /// Regex that ends the watch when found in the trailing window
    pub stop_pattern: Option<Pattern>,

    /// Size of the trailing window in characters (`None` = whole transcript)
    pub max_match_length: Option<usize>,
}

impl Default for WatchOptions<'_> {
    fn default() -> Self {
        Self {
            stop_condition: StopCondition::ProcessExit,
            on_cancel: CancelAction::None,
            timeout: None,
            forward_stdout: true,
            forward_stderr: true,
            stop_pattern: None,
            max_match_length: None,
        }
    }
}

impl<'a> WatchOptions<'a> {
    /// Watch until the remote process exits.
    pub fn until_exit() -> Self {
        Self::default()
    }

    /// Watch until `pattern` shows up (or the process exits).
    pub fn until_pattern(pattern: Pattern) -> Self {
        Self {
            stop_pattern: Some(pattern),
            ..Self::default()
        }
    }

    /// Watch until `predicate` returns true.
    pub fn until(predicate: impl FnMut(&mut dyn Channel) -> Result<bool> + 'a) -> Self {
        Self {
            stop_condition: StopCondition::Predicate(Box::new(predicate)),
            ..Self::default()
        }
    }

    /// Replace the stop condition.
    pub fn with_stop_condition(mut self, condition: StopCondition<'a>) -> Self {
        self.stop_condition = condition;
        self
    }

    /// Set the stop pattern.
    pub fn with_stop_pattern(mut self, pattern: Pattern) -> Self {
        self.stop_pattern = Some(pattern);
        self
    }

    /// Set timeout duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Restrict pattern matching to the last `window` characters.
    pub fn with_window(mut self, window: Option<usize>) -> Self {
        self.max_match_length = window;
        self
    }

    /// Set the cancel action.
    pub fn with_cancel(mut self, action: CancelAction) -> Self {
        self.on_cancel = action;
        self
    }

    /// Choose which streams are mirrored locally.
    pub fn with_forwarding(mut self, stdout: bool, stderr: bool) -> Self {
        self.forward_stdout = stdout;
        self.forward_stderr = stderr;
        self
    }

    /// Mirror nothing locally.
    pub fn silent(self) -> Self {
        self.with_forwarding(false, false)
    }
}

/// Why a watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Pattern,
    Condition,
    Timeout,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Polls channels on a fixed interval and accumulates their output.
#[derive(Clone)]
pub struct StreamWatcher {
    pacer: Arc<dyn Pacer>,
    settings: WatchSettings,
}

impl fmt::Debug for StreamWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWatcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for StreamWatcher {
    fn default() -> Self {
        Self::new(WatchSettings::default())
    }
}

impl StreamWatcher {
    /// Create a watcher that uses the real clock.
    pub fn new(settings: WatchSettings) -> Self {
        Self::with_pacer(Arc::new(SystemPacer), settings)
    }

    /// Create a watcher with a custom pacer.
    pub fn with_pacer(pacer: Arc<dyn Pacer>, settings: WatchSettings) -> Self {
        Self { pacer, settings }
    }

    /// Watch settings in effect.
    pub fn settings(&self) -> &WatchSettings {
        &self.settings
    }

    /// The pacer driving this watcher.
    pub fn pacer(&self) -> &Arc<dyn Pacer> {
        &self.pacer
    }

    /// Sleep through the pacer.
    pub fn pause(&self, duration: Duration) {
        self.pacer.sleep(duration);
    }

    /// Watch a channel until a stop condition fires and return everything
    /// it printed meanwhile.
    ///
    /// On every poll the stop pattern is searched in the trailing
    /// `max_match_length` characters of the transcript; if it does not
    /// match, the stop condition is evaluated. Then the loop sleeps, reads
    /// at most one chunk from each stream, and checks the soft timeout.
    ///
    /// The transcript is returned whichever condition ended the loop. A
    /// local interrupt runs `on_cancel` and returns [`Error::Interrupted`].
    pub fn watch(&self, channel: &mut dyn Channel, options: WatchOptions<'_>) -> Result<String> {
        let mut options = options;
        let deadline = options.timeout.map(|timeout| self.pacer.now() + timeout);
        let forward_stdout = options.forward_stdout && self.settings.forward_stdout;
        let forward_stderr = options.forward_stderr && self.settings.forward_stderr;

        let mut transcript = String::new();
        let mut stdout_decoder = Utf8Decoder::default();
        let mut stderr_decoder = Utf8Decoder::default();
        let mut buf = vec![0u8; self.settings.read_chunk];

        let reason = loop {
            if let Some(reason) = Self::stop_reason(channel, &mut options, &transcript)? {
                break reason;
            }

            self.pacer.sleep(self.settings.poll_interval());

            if self.pacer.interrupted() {
                warn!(action = ?options.on_cancel, "watch interrupted");
                Self::cancel(channel, options.on_cancel);
                return Err(Error::Interrupted);
            }

            Self::drain(
                channel,
                Stream::Stdout,
                &mut buf,
                &mut stdout_decoder,
                &mut transcript,
                forward_stdout,
            )?;
            Self::drain(
                channel,
                Stream::Stderr,
                &mut buf,
                &mut stderr_decoder,
                &mut transcript,
                forward_stderr,
            )?;

            if let Some(deadline) = deadline {
                if self.pacer.now() > deadline {
                    break StopReason::Timeout;
                }
            }
        };

        // Output written just before exit may still be buffered.
        if reason == StopReason::Condition
            && matches!(options.stop_condition, StopCondition::ProcessExit)
        {
            loop {
                let out = Self::drain(
                    channel,
                    Stream::Stdout,
                    &mut buf,
                    &mut stdout_decoder,
                    &mut transcript,
                    forward_stdout,
                )?;
                let err = Self::drain(
                    channel,
                    Stream::Stderr,
                    &mut buf,
                    &mut stderr_decoder,
                    &mut transcript,
                    forward_stderr,
                )?;
                if out + err == 0 {
                    break;
                }
            }
        }

        debug!(?reason, bytes = transcript.len(), "watch finished");
        Ok(transcript)
    }

    /// Poll until the channel reports an exit status and return it.
    pub fn wait_exit_status(&self, channel: &mut dyn Channel) -> Result<u32> {
        loop {
            if let Some(status) = channel.exit_status()? {
                return Ok(status);
            }
            self.pacer.sleep(self.settings.poll_interval());
            if self.pacer.interrupted() {
                return Err(Error::Interrupted);
            }
        }
    }

    fn stop_reason(
        channel: &mut dyn Channel,
        options: &mut WatchOptions<'_>,
        transcript: &str,
    ) -> Result<Option<StopReason>> {
        if let Some(pattern) = &options.stop_pattern {
            if pattern.is_match_in_tail(transcript, options.max_match_length) {
                return Ok(Some(StopReason::Pattern));
            }
        }

        let stop = match &mut options.stop_condition {
            StopCondition::ProcessExit => channel.exit_status_ready()?,
            StopCondition::Never => false,
            StopCondition::Predicate(predicate) => predicate(channel)?,
        };

        Ok(stop.then_some(StopReason::Condition))
    }

    fn drain(
        channel: &mut dyn Channel,
        stream: Stream,
        buf: &mut [u8],
        decoder: &mut Utf8Decoder,
        transcript: &mut String,
        forward: bool,
    ) -> Result<usize> {
        let ready = match stream {
            Stream::Stdout => channel.recv_ready()?,
            Stream::Stderr => channel.recv_stderr_ready()?,
        };
        if !ready {
            return Ok(0);
        }

        let n = match stream {
            Stream::Stdout => channel.recv(buf)?,
            Stream::Stderr => channel.recv_stderr(buf)?,
        };
        if n == 0 {
            return Ok(0);
        }

        let text = decoder.decode(&buf[..n]);
        trace!(?stream, bytes = n, "received");
        transcript.push_str(&text);

        if forward {
            match stream {
                Stream::Stdout => {
                    let mut out = std::io::stdout().lock();
                    out.write_all(text.as_bytes())?;
                    out.flush()?;
                }
                Stream::Stderr => {
                    let mut err = std::io::stderr().lock();
                    err.write_all(text.as_bytes())?;
                    err.flush()?;
                }
            }
        }
        Ok(n)
    }

    fn cancel(channel: &mut dyn Channel, action: CancelAction) {
        let result = match action {
            CancelAction::None => Ok(()),
            CancelAction::Interrupt => channel.send(&[INTERRUPT]).map(|_| ()),
            CancelAction::Close => channel.close(),
        };
        if let Err(e) = result {
            warn!("Cancel action {:?} failed: {}", action, e);
        }
    }
}

/// Incremental UTF-8 decoding across read boundaries.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualPacer, ScriptedChannel};

    fn watcher(pacer: &Arc<ManualPacer>) -> StreamWatcher {
        StreamWatcher::with_pacer(pacer.clone(), WatchSettings::default())
    }

    #[test]
    fn test_decoder_joins_split_sequences() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "é".as_bytes();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..]), "é");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_watch_until_exit_collects_all_output() {
        let pacer = Arc::new(ManualPacer::new());
        let mut channel = ScriptedChannel::new();
        channel.push_output("loading...\r\n");
        channel.push_stderr("warning: slow cable\r\n");
        channel.push_output("done\r\n");
        channel.exit_with(0);

        let transcript = watcher(&pacer)
            .watch(&mut channel, WatchOptions::until_exit().silent())
            .unwrap();

        assert!(transcript.contains("loading..."));
        assert!(transcript.contains("warning: slow cable"));
        assert!(transcript.contains("done"));
    }

    #[test]
    fn test_watch_stops_on_pattern() {
        let pacer = Arc::new(ManualPacer::new());
        let mut channel = ScriptedChannel::new();
        channel.push_output("banner\r\nPktgen:/> ");
        channel.push_output("never read");

        let prompt = Pattern::new("\r\nPktgen:/> ").unwrap();
        let window = Some(prompt.char_len());
        let transcript = watcher(&pacer)
            .watch(
                &mut channel,
                WatchOptions::until_pattern(prompt)
                    .with_window(window)
                    .with_stop_condition(StopCondition::Never)
                    .silent(),
            )
            .unwrap();

        assert_eq!(transcript, "banner\r\nPktgen:/> ");
    }

    #[test]
    fn test_watch_times_out() {
        let pacer = Arc::new(ManualPacer::new());
        let mut channel = ScriptedChannel::new();
        channel.push_output("still booting");

        let transcript = watcher(&pacer)
            .watch(
                &mut channel,
                WatchOptions::until_exit()
                    .with_timeout(Duration::from_secs(2))
                    .silent(),
            )
            .unwrap();

        assert_eq!(transcript, "still booting");
        assert!(pacer.elapsed() > Duration::from_secs(2));
        assert!(pacer.elapsed() <= Duration::from_secs(2) + Duration::from_millis(10));
    }

    #[test]
    fn test_watch_predicate() {
        let pacer = Arc::new(ManualPacer::new());
        let mut channel = ScriptedChannel::new();
        let mut polls = 0;

        watcher(&pacer)
            .watch(
                &mut channel,
                WatchOptions::until(|_| {
                    polls += 1;
                    Ok(polls == 3)
                })
                .silent(),
            )
            .unwrap();

        assert_eq!(polls, 3);
        assert_eq!(pacer.sleep_count(), 2);
    }

    #[test]
    fn test_interrupt_sends_control_byte() {
        let pacer = Arc::new(ManualPacer::new());
        pacer.interrupt_after(3);
        let mut channel = ScriptedChannel::new();

        let result = watcher(&pacer).watch(
            &mut channel,
            WatchOptions::until_exit()
                .with_cancel(CancelAction::Interrupt)
                .silent(),
        );

        assert!(matches!(result, Err(Error::Interrupted)));
        assert_eq!(channel.sent(), vec![INTERRUPT]);
    }

    #[test]
    fn test_interrupt_can_close_channel() {
        let pacer = Arc::new(ManualPacer::new());
        pacer.interrupt_after(1);
        let mut channel = ScriptedChannel::new();

        let result = watcher(&pacer).watch(
            &mut channel,
            WatchOptions::until_exit()
                .with_cancel(CancelAction::Close)
                .silent(),
        );

        assert!(matches!(result, Err(Error::Interrupted)));
        assert!(channel.is_closed());
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn test_wait_exit_status() {
        let pacer = Arc::new(ManualPacer::new());
        let mut channel = ScriptedChannel::new();
        channel.exit_with(3);
        assert_eq!(watcher(&pacer).wait_exit_status(&mut channel).unwrap(), 3);
    }
}
