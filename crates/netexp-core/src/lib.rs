//! # netexp-core
//!
//! Core types for netexp.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other netexp crates. It provides:
//!
//! - Error types
//! - Configuration (YAML) with documented defaults
//! - The `Channel` and `RemoteHost` capability traits
//! - The `Pattern` utility used to scrape console output
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other netexp crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod error;
pub mod pattern;

// Re-export commonly used types
pub use channel::{Channel, ExecRequest, RemoteHost, INTERRUPT};
pub use config::{BringupSettings, NetexpConfig, PktgenSettings, WatchSettings};
pub use error::{Error, Result};
pub use pattern::{tail, Pattern};
