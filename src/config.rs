//! Per-lock configuration
//!
//! All tunable parameters for one lock instance. Values come from the
//! deployment configuration at build time; key material and the BLE address
//! are handed directly to the session client adapter and never stored here.

use serde::{Deserialize, Serialize};

use crate::lock::LockState;
use crate::model::LockModel;
use crate::{Error, Result};

/// Configuration for a single lock instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Device model — selects the capability descriptor.
    pub model: LockModel,

    // --- Connection ---
    /// Give up and reboot after this many failed connect attempts (0 = unlimited).
    pub connect_retry_limit: u16,
    /// Session-client connect timeout (milliseconds).
    pub connect_timeout_ms: u32,
    /// Minimum interval between connect attempts (milliseconds).
    pub connect_retry_interval_ms: u32,
    /// Extra margin on top of `connect_timeout_ms` before declaring a
    /// connect attempt stuck (milliseconds).
    pub connect_timeout_margin_ms: u32,
    /// Authentication handshake timeout (milliseconds).
    pub authenticate_timeout_ms: u32,
    /// Hold a connection at all times, or connect on demand only.
    pub always_connect: bool,
    /// Delay between retry exhaustion and the actual reboot (milliseconds).
    pub reboot_delay_ms: u32,

    // --- Lock state derivation ---
    /// Ambiguous sensor readings are treated as jammed after this long
    /// (milliseconds).
    pub jam_detect_timeout_ms: u32,
    /// Published when no telemetry is available (`Unknown` unless overridden
    /// to a safer assumed state).
    pub unknown_state_alternative: LockState,
    /// Telemetry absent for this long forces a fallback publish
    /// (milliseconds, 0 = disabled).
    pub unknown_state_timeout_ms: u32,

    // --- History ---
    /// Give up waiting for a history record after this long (milliseconds).
    pub history_timeout_ms: u32,
    /// Backoff before re-requesting history after a failed read (milliseconds).
    pub history_retry_backoff_ms: u32,
    /// Publish lock state immediately, amend when history arrives.
    pub fast_notify: bool,
}

impl LockConfig {
    /// Defaults for the given model, matching the shipped firmware timings.
    pub fn for_model(model: LockModel) -> Self {
        Self {
            model,
            connect_retry_limit: 0,
            connect_timeout_ms: 10_000,
            connect_retry_interval_ms: 3_000,
            connect_timeout_margin_ms: 3_000,
            authenticate_timeout_ms: 5_000,
            always_connect: true,
            reboot_delay_ms: 5_000,
            jam_detect_timeout_ms: 3_000,
            unknown_state_alternative: LockState::Unknown,
            unknown_state_timeout_ms: 20_000,
            history_timeout_ms: 3_000,
            history_retry_backoff_ms: 300,
            fast_notify: false,
        }
    }

    /// Reject configurations that would wedge the state machine.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be > 0"));
        }
        if self.connect_retry_interval_ms == 0 {
            return Err(Error::Config("connect_retry_interval_ms must be > 0"));
        }
        if self.authenticate_timeout_ms == 0 {
            return Err(Error::Config("authenticate_timeout_ms must be > 0"));
        }
        if self.jam_detect_timeout_ms == 0 {
            return Err(Error::Config("jam_detect_timeout_ms must be > 0"));
        }
        if self.unknown_state_alternative == LockState::Jammed {
            return Err(Error::Config("unknown_state_alternative cannot be Jammed"));
        }
        Ok(())
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::for_model(LockModel::Sesame5)
    }
}
