//! # netexp-console
//!
//! Interactive console automation for netexp.
//!
//! This crate provides:
//! - The stream watcher: poll a channel until a pattern, predicate or
//!   timeout stops it
//! - The command sequencer: send line commands one at a time, waiting for
//!   the console prompt after each
//! - A pluggable pacer (clock, sleep, interrupt) for the polling loop
//! - Channel adapters for PTY and pipe processes, and an ssh transport
//! - In-memory fakes for driving all of the above in tests
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on netexp-core and is
//! used by both device drivers (netexp-fpga, netexp-pktgen).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pacer;
pub mod pipe;
pub mod pty;
pub mod sequence;
pub mod ssh;
pub mod testing;
pub mod watch;

// Re-export commonly used types
pub use pacer::{install_interrupt_handler, Pacer, SystemPacer};
pub use pipe::PipeChannel;
pub use pty::PtyChannel;
pub use ssh::SshHost;
pub use watch::{CancelAction, StopCondition, StreamWatcher, WatchOptions};
