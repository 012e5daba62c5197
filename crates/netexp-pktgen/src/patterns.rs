//! Console text printed by pktgen, reproduced verbatim.

use lazy_static::lazy_static;
use netexp_core::Pattern;

/// Prompt printed once pktgen has finished starting up.
pub const READY_PROMPT_TEXT: &str = "\r\nPktgen:/>";

/// Idle prompt printed after every command.
pub const COMMAND_PROMPT_TEXT: &str = "\r\nPktgen:/> ";

/// A digit-only line followed by the idle prompt: the end of a statistics
/// query reply. Replies may arrive over several reads, so the wait only
/// ends once the prompt closing the reply has been seen.
pub const STAT_REPLY_TEXT: &str = "\r\n\\d+\r\nPktgen:/> ";

lazy_static! {
    /// Startup prompt.
    pub static ref READY_PROMPT: Pattern =
        Pattern::new(READY_PROMPT_TEXT).expect("ready prompt is a valid pattern");

    /// Command prompt.
    pub static ref COMMAND_PROMPT: Pattern =
        Pattern::new(COMMAND_PROMPT_TEXT).expect("command prompt is a valid pattern");

    /// Digit-only line and prompt ending a statistics query.
    pub static ref STAT_REPLY: Pattern =
        Pattern::new(STAT_REPLY_TEXT).expect("statistics reply is a valid pattern");
}
