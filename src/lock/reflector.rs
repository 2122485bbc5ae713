//! Status reflector — maps raw telemetry onto a discrete lock state.
//!
//! The device reports two position sensors (`in_lock`, `in_unlock`) that are
//! individually unreliable during physical transitions: both or neither may
//! be asserted while the thumb-turn travels. A resolved state is therefore
//! only produced when exactly one sensor is asserted; ambiguous readings
//! start a debounce window that resolves to `Jammed` when it expires.
//! An explicit hardware `is_critical` flag, on models that have one, is
//! authoritative and bypasses the debounce.

use log::debug;

use crate::app::ports::SesameStatus;
use crate::model::Capabilities;

use super::LockState;

/// Outcome of evaluating one telemetry snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflection {
    /// The snapshot resolves to a definite state.
    Settled(LockState),
    /// The motor is actively driving on a momentary-actuation model;
    /// not a settled state, no publish yet.
    Transitioning,
    /// Sensor flags are ambiguous; the jam debounce window is running.
    Undetermined,
}

/// Stateful snapshot evaluator, one per lock instance.
pub struct StatusReflector {
    caps: Capabilities,
    jam_started_ms: Option<u64>,
}

impl StatusReflector {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            jam_started_ms: None,
        }
    }

    /// Evaluate a snapshot against the current derived state.
    pub fn evaluate(
        &mut self,
        status: Option<&SesameStatus>,
        current: LockState,
        now_ms: u64,
    ) -> Reflection {
        let Some(status) = status else {
            self.jam_started_ms = None;
            return Reflection::Settled(LockState::Unknown);
        };

        // Hardware-reported fault takes precedence over the normal mapping
        // and short-circuits the debounce.
        if self.caps.supports_critical_flag && status.is_critical == Some(true) {
            self.jam_started_ms = None;
            return Reflection::Settled(LockState::Jammed);
        }

        if self.caps.supports_click && status.motor_status.is_driving() {
            return Reflection::Transitioning;
        }

        match (status.in_lock, status.in_unlock) {
            (true, false) => {
                self.jam_started_ms = None;
                Reflection::Settled(LockState::Locked)
            }
            (false, true) => {
                self.jam_started_ms = None;
                Reflection::Settled(LockState::Unlocked)
            }
            // Both or neither: cannot be determined from this sample.
            _ => {
                if self.jam_started_ms.is_none() && current != LockState::Jammed {
                    debug!("lock state ambiguous, starting jam detection");
                    self.jam_started_ms = Some(now_ms);
                }
                Reflection::Undetermined
            }
        }
    }

    /// A debounce window is currently running.
    pub fn jam_pending(&self) -> bool {
        self.jam_started_ms.is_some()
    }

    /// Returns `true` exactly once when the running debounce window has
    /// outlived `timeout_ms`; the window is cleared in the same call.
    pub fn jam_expired(&mut self, now_ms: u64, timeout_ms: u32) -> bool {
        match self.jam_started_ms {
            Some(start) if now_ms.saturating_sub(start) > timeout_ms as u64 => {
                self.jam_started_ms = None;
                true
            }
            _ => false,
        }
    }
}
