//! Lock-state domain: reflection, history reconciliation, staleness.
//!
//! [`LockFeature`] owns the derived lock state for one instance and drives
//! the publish pipeline: telemetry snapshots go through the
//! [`StatusReflector`](reflector::StatusReflector), settled transitions are
//! held by the [`HistoryGate`](history::HistoryGate) until attribution
//! arrives, and the [`UnknownWatchdog`](watchdog::UnknownWatchdog) forces a
//! fallback publish when telemetry goes stale.

pub mod history;
pub mod reflector;
pub mod watchdog;

use core::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, SesameStatus, SessionPort, StateSink, TriggerClassifier};
use crate::config::LockConfig;
use crate::model::Capabilities;

use history::{GateDecision, HistoryGate};
use reflector::{Reflection, StatusReflector};
use watchdog::UnknownWatchdog;

/// Externally visible lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    /// No telemetry available; the real position is not known.
    Unknown,
    Locked,
    Unlocked,
    /// The mechanism stalled between positions.
    Jammed,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::Jammed => "jammed",
        };
        f.write_str(s)
    }
}

/// Derived-state owner and publish pipeline for one lock instance.
pub struct LockFeature {
    name: &'static str,
    caps: Capabilities,
    /// History sensors are configured for this instance.
    uses_history: bool,
    fast_notify: bool,
    jam_timeout_ms: u32,
    history_timeout_ms: u32,
    unknown_timeout_ms: u32,
    unknown_alternative: LockState,
    /// Internal derived state; `Unknown` means undetermined.
    lock_state: LockState,
    /// Last state actually handed to the sink, after fallback mapping.
    published: Option<LockState>,
    reflector: StatusReflector,
    gate: HistoryGate,
    watchdog: UnknownWatchdog,
}

impl LockFeature {
    pub fn new(name: &'static str, config: &LockConfig, uses_history: bool) -> Self {
        let caps = config.model.capabilities();
        Self {
            name,
            caps,
            uses_history,
            fast_notify: config.fast_notify,
            jam_timeout_ms: config.jam_detect_timeout_ms,
            history_timeout_ms: config.history_timeout_ms,
            unknown_timeout_ms: config.unknown_state_timeout_ms,
            unknown_alternative: config.unknown_state_alternative,
            lock_state: LockState::Unknown,
            published: None,
            reflector: StatusReflector::new(caps),
            gate: HistoryGate::new(caps.history_semantics),
            watchdog: UnknownWatchdog::new(),
        }
    }

    pub fn lock_state(&self) -> LockState {
        self.lock_state
    }

    pub fn published(&self) -> Option<LockState> {
        self.published
    }

    pub fn history_pending(&self) -> bool {
        self.gate.pending()
    }

    /// The open operation is a momentary click on this model.
    pub fn open_uses_click(&self) -> bool {
        self.caps.supports_click
    }

    /// Unconditional first publish so the frontend never shows a blank
    /// entity while the first connection is still being established.
    pub fn publish_initial_state(&mut self, out: &mut (impl StateSink + EventSink)) {
        let mapped = self.mapped_state();
        out.publish_lock_state(mapped);
        self.published = Some(mapped);
    }

    /// Run a telemetry snapshot through the reflector and act on the result.
    pub fn reflect_status(
        &mut self,
        status: Option<&SesameStatus>,
        now_ms: u64,
        session: &mut impl SessionPort,
        out: &mut (impl StateSink + EventSink),
    ) {
        match self.reflector.evaluate(status, self.lock_state, now_ms) {
            Reflection::Settled(state) => self.update_lock_state(state, now_ms, session, out),
            Reflection::Transitioning => {
                // Drive in progress on a bot: fetch the triggering record
                // early so it is ready when the motion settles.
                if self.uses_history && !self.gate.pending() {
                    self.gate.request(self.lock_state, now_ms);
                    if !session.request_history() {
                        self.gate.abandon();
                    }
                }
            }
            Reflection::Undetermined => {}
        }
    }

    /// Feed a history record into the gate. The caller schedules the
    /// follow-up the decision asks for.
    pub fn on_history(
        &mut self,
        record: &crate::app::ports::HistoryRecord,
        classifier: &impl TriggerClassifier,
    ) -> GateDecision {
        self.gate.on_record(record, classifier)
    }

    /// Publish the held state together with its attribution (or lack of it).
    pub fn publish_history_state(&mut self, out: &mut (impl StateSink + EventSink)) {
        {
            let (type_code, tag) = self.gate.received();
            out.publish_history_type(type_code.map_or(f32::NAN, f32::from));
            out.publish_history_tag(tag);
        }
        self.push_state(out);
    }

    /// Re-issue a failed history read, or publish without attribution when
    /// the request cannot be placed at all.
    pub fn retry_history(
        &mut self,
        now_ms: u64,
        session: &mut impl SessionPort,
        out: &mut (impl StateSink + EventSink),
    ) {
        if !self.gate.pending() {
            return;
        }
        if session.request_history() {
            self.gate.touch(now_ms);
        } else {
            warn!("{}: history retry could not be issued", self.name);
            self.gate.abandon();
            self.publish_history_state(out);
        }
    }

    /// Expire the history wait and the jam debounce window.
    pub fn test_timeouts(
        &mut self,
        now_ms: u64,
        session: &mut impl SessionPort,
        out: &mut (impl StateSink + EventSink),
    ) {
        if self.gate.expired(now_ms, self.history_timeout_ms) {
            warn!("{}: history not received in time", self.name);
            self.publish_history_state(out);
        }
        if self.reflector.jam_expired(now_ms, self.jam_timeout_ms) {
            warn!("{}: lock state not determined, jam detected", self.name);
            self.update_lock_state(LockState::Jammed, now_ms, session, out);
        }
    }

    /// Advance the staleness watchdog; force the fallback publish and clear
    /// the history sensors when it fires.
    pub fn test_unknown_state(
        &mut self,
        telemetry_present: bool,
        now_ms: u64,
        out: &mut (impl StateSink + EventSink),
    ) {
        let fired = self.watchdog.tick(
            telemetry_present,
            self.lock_state == LockState::Unknown,
            now_ms,
            self.unknown_timeout_ms,
        );
        if fired {
            warn!(
                "{}: no status for {}ms, lock state unknown",
                self.name, self.unknown_timeout_ms
            );
            self.lock_state = LockState::Unknown;
            self.gate.abandon();
            self.gate.clear_received();
            self.publish_history_state(out);
        }
    }

    fn update_lock_state(
        &mut self,
        new: LockState,
        now_ms: u64,
        session: &mut impl SessionPort,
        out: &mut (impl StateSink + EventSink),
    ) {
        // Same settled state never re-triggers a history fetch.
        if new == self.lock_state {
            return;
        }
        debug!("{}: lock state {} -> {}", self.name, self.lock_state, new);
        self.lock_state = new;

        if new != LockState::Unknown && self.uses_history {
            self.gate.request(new, now_ms);
            if !session.request_history() {
                warn!("{}: could not request history", self.name);
                self.gate.abandon();
                self.push_state(out);
                return;
            }
            if self.fast_notify {
                // Publish now; the attribution amends the sensors later.
                self.push_state(out);
            }
            // Otherwise the publish waits for the record or the timeout.
        } else {
            self.push_state(out);
        }
    }

    fn mapped_state(&self) -> LockState {
        if self.lock_state == LockState::Unknown {
            self.unknown_alternative
        } else {
            self.lock_state
        }
    }

    fn push_state(&mut self, out: &mut (impl StateSink + EventSink)) {
        let mapped = self.mapped_state();
        if self.published == Some(mapped) {
            return;
        }
        info!("{}: lock state is now {}", self.name, mapped);
        out.publish_lock_state(mapped);
        if let Some(prev) = self.published {
            out.emit(&AppEvent::LockStateChanged {
                from: prev,
                to: mapped,
            });
        }
        self.published = Some(mapped);
    }
}
