//! Time and interrupt source for polling loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use netexp_core::{Error, Result};
use tracing::debug;

/// Set by the SIGINT handler, consumed by the next poll that notices it.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Clock, sleep and interrupt source used by every polling loop.
pub trait Pacer: Send + Sync {
    /// Current time.
    fn now(&self) -> Instant;

    /// Suspend the caller.
    fn sleep(&self, duration: Duration);

    /// Whether a local interrupt arrived since the last call.
    fn interrupted(&self) -> bool;
}

/// Real clock, real sleeps, and the process-wide SIGINT flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPacer;

impl Pacer for SystemPacer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn interrupted(&self) -> bool {
        INTERRUPTED.swap(false, Ordering::SeqCst)
    }
}

/// Route SIGINT into the interrupt flag read by [`SystemPacer`].
///
/// Without this, Ctrl-C terminates the process immediately and no cancel
/// action reaches the remote console.
pub fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::SeqCst);
    })
    .map_err(|e| Error::Channel(format!("Failed to install SIGINT handler: {e}")))?;
    debug!("SIGINT handler installed");
    Ok(())
}
