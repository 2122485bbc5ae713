//! Unified error types for the lock lifecycle manager.
//!
//! Follows embedded practice: a single `Error` enum that every subsystem can
//! convert into, keeping top-level error handling uniform. All variants are
//! `Copy` so they pass through the poll loop without allocation.
//!
//! Recoverable conditions (connect failure, authenticate failure, history
//! timeout) never appear here — they are expressed as state transitions
//! inspected on the next poll tick. `Error` is reserved for the fatal
//! configuration/setup class that marks an instance permanently failed.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Instance setup failed (bad keys, unsupported model, missing handles).
    Setup(SetupError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(e) => write!(f, "setup: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Setup errors (fatal at initialization, no reboot — operator must fix)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    /// The session client rejected the device address / model combination.
    UnsupportedModel,
    /// Key material failed validation in the session client.
    InvalidKeys,
    /// A `lock` feature was configured on a model that cannot lock.
    NotLockable,
    /// The shared connect worker could not be started.
    WorkerUnavailable,
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedModel => write!(f, "unsupported model"),
            Self::InvalidKeys => write!(f, "invalid pubkey or secret"),
            Self::NotLockable => write!(f, "model does not support lock"),
            Self::WorkerUnavailable => write!(f, "connect worker unavailable"),
        }
    }
}

impl From<SetupError> for Error {
    fn from(e: SetupError) -> Self {
        Self::Setup(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
