//! Command sequencing over a prompt-driven console.

use std::time::Duration;

use tracing::debug;

use netexp_core::{Channel, Pattern, Result};

use crate::watch::{CancelAction, StreamWatcher, WatchOptions};

impl StreamWatcher {
    /// Send line commands one at a time and collect the console's replies.
    ///
    /// Each command gets a trailing newline and is followed by a watch that
    /// ends when `prompt` shows up in a window exactly as long as the
    /// prompt, when the process exits, or after `timeout`. Command *n + 1*
    /// is never sent before command *n*'s watch has finished. An interrupt
    /// during a watch sends 0x03 to the console and aborts the sequence.
    ///
    /// # Example
    /// ```no_run
    /// # use netexp_console::{StreamWatcher, testing::ScriptedChannel};
    /// # use netexp_core::Pattern;
    /// # use std::time::Duration;
    /// # let mut console = ScriptedChannel::new();
    /// let watcher = StreamWatcher::default();
    /// let prompt = Pattern::new("\r\n% ").unwrap();
    /// let output = watcher
    ///     .run_commands(&mut console, ["get_service_paths device"], Duration::from_secs(1), Some(&prompt))
    ///     .unwrap();
    /// # let _ = output;
    /// ```
    pub fn run_commands<I, S>(
        &self,
        channel: &mut dyn Channel,
        commands: I,
        timeout: Duration,
        prompt: Option<&Pattern>,
    ) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut output = String::new();

        for command in commands {
            let command = command.as_ref();
            debug!(command, "sending console command");
            channel.send(format!("{command}\n").as_bytes())?;

            let mut options = WatchOptions::until_exit()
                .with_timeout(timeout)
                .with_cancel(CancelAction::Interrupt);
            if let Some(prompt) = prompt {
                options = options
                    .with_stop_pattern(prompt.clone())
                    .with_window(Some(prompt.char_len()));
            }

            output.push_str(&self.watch(channel, options)?);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use netexp_core::{Error, WatchSettings, INTERRUPT};

    use super::*;
    use crate::testing::{ManualPacer, ScriptedChannel};

    fn quiet_watcher(pacer: &Arc<ManualPacer>) -> StreamWatcher {
        let settings = WatchSettings {
            forward_stdout: false,
            forward_stderr: false,
            ..WatchSettings::default()
        };
        StreamWatcher::with_pacer(pacer.clone(), settings)
    }

    #[test]
    fn test_commands_are_sent_in_order_with_newlines() {
        let pacer = Arc::new(ManualPacer::new());
        let mut console = ScriptedChannel::new();
        console.respond("first", "first\r\nok 1\r\n% ");
        console.respond("second", "second\r\nok 2\r\n% ");

        let prompt = Pattern::new("\r\n% ").unwrap();
        let output = quiet_watcher(&pacer)
            .run_commands(
                &mut console,
                ["first", "second"],
                Duration::from_secs(1),
                Some(&prompt),
            )
            .unwrap();

        assert_eq!(console.sent_text(), "first\nsecond\n");
        assert_eq!(output, "first\r\nok 1\r\n% second\r\nok 2\r\n% ");
    }

    #[test]
    fn test_prompt_ends_each_wait_before_timeout() {
        let pacer = Arc::new(ManualPacer::new());
        let mut console = ScriptedChannel::new();
        console.respond("set_jtag", "\r\n% ");

        let prompt = Pattern::new("\r\n% ").unwrap();
        quiet_watcher(&pacer)
            .run_commands(
                &mut console,
                ["set_jtag dev0"],
                Duration::from_secs(1),
                Some(&prompt),
            )
            .unwrap();

        assert!(pacer.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_without_prompt_each_command_waits_for_timeout() {
        let pacer = Arc::new(ManualPacer::new());
        let mut console = ScriptedChannel::new();

        let output = quiet_watcher(&pacer)
            .run_commands(
                &mut console,
                vec!["a".to_string(), "b".to_string()],
                Duration::from_millis(500),
                None,
            )
            .unwrap();

        assert!(output.is_empty());
        assert!(pacer.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_interrupt_aborts_remaining_commands() {
        let pacer = Arc::new(ManualPacer::new());
        pacer.interrupt_after(2);
        let mut console = ScriptedChannel::new();

        let result = quiet_watcher(&pacer).run_commands(
            &mut console,
            ["hang", "never sent"],
            Duration::from_secs(5),
            None,
        );

        assert!(matches!(result, Err(Error::Interrupted)));
        let mut expected = b"hang\n".to_vec();
        expected.push(INTERRUPT);
        assert_eq!(console.sent(), expected);
    }
}
