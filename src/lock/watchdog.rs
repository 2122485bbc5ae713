//! Unknown-state watchdog.
//!
//! When the device stops delivering telemetry (connection lost, device out
//! of range) the externally published state would otherwise go stale
//! forever. The watchdog runs whenever no telemetry snapshot is held and the
//! derived state is not already unknown; when the window expires the caller
//! forces the configured fallback publish and clears the history sensors.

/// Telemetry-staleness timer, one per lock instance.
#[derive(Debug, Default)]
pub struct UnknownWatchdog {
    started_ms: Option<u64>,
}

impl UnknownWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the watchdog. Returns `true` exactly once when the published
    /// state must be forced to unknown.
    ///
    /// Fresh telemetry resets the timer; a derived state that is already
    /// unknown keeps it idle; `timeout_ms == 0` disables it.
    pub fn tick(
        &mut self,
        telemetry_present: bool,
        state_is_unknown: bool,
        now_ms: u64,
        timeout_ms: u32,
    ) -> bool {
        if telemetry_present || state_is_unknown || timeout_ms == 0 {
            self.started_ms = None;
            return false;
        }
        match self.started_ms {
            None => {
                self.started_ms = Some(now_ms);
                false
            }
            Some(start) if now_ms.saturating_sub(start) > timeout_ms as u64 => {
                self.started_ms = None;
                true
            }
            Some(_) => false,
        }
    }

    pub fn armed(&self) -> bool {
        self.started_ms.is_some()
    }
}
