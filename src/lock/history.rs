//! History reconciliation gate.
//!
//! After the reflector settles on a new lock state, the publish is held back
//! until the device's most recent history record is fetched, so that state
//! and attribution (tag, trigger type) reach the frontend together. The gate
//! tracks one outstanding request per instance, decides whether an incoming
//! record correlates with the settled state, and bounds the wait with a
//! timeout after which the state is published without attribution.

use log::{debug, warn};

use crate::app::ports::{HistoryRecord, HistoryResult, TriggerClass, TriggerClassifier, HISTORY_TAG_MAX};
use crate::model::HistorySemantics;

use super::LockState;

/// What the caller should do with an incoming history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The record (or its definitive absence) resolves the gate; publish
    /// the held state together with the stored attribution.
    Publish,
    /// Transient read failure; re-request after a short backoff.
    Retry,
    /// The record is unrelated; keep waiting.
    Ignore,
}

/// Single-slot reconciliation gate, one per lock instance.
pub struct HistoryGate {
    semantics: HistorySemantics,
    /// Set while a request is outstanding; doubles as the timeout anchor.
    requested_at_ms: Option<u64>,
    /// The settled state the outstanding request is correlating against.
    target: LockState,
    recv_type: Option<u8>,
    recv_tag: heapless::String<HISTORY_TAG_MAX>,
}

impl HistoryGate {
    pub fn new(semantics: HistorySemantics) -> Self {
        Self {
            semantics,
            requested_at_ms: None,
            target: LockState::Unknown,
            recv_type: None,
            recv_tag: heapless::String::new(),
        }
    }

    /// Arm the gate for a settled `target` state. A previous outstanding
    /// request is superseded; only the newest transition is reconciled.
    pub fn request(&mut self, target: LockState, now_ms: u64) {
        self.requested_at_ms = Some(now_ms);
        self.target = target;
        self.clear_received();
    }

    /// Refresh the timeout anchor when a retry is re-issued.
    pub fn touch(&mut self, now_ms: u64) {
        if self.requested_at_ms.is_some() {
            self.requested_at_ms = Some(now_ms);
        }
    }

    /// Give up on an outstanding request (request could not be issued).
    pub fn abandon(&mut self) {
        self.requested_at_ms = None;
    }

    pub fn pending(&self) -> bool {
        self.requested_at_ms.is_some()
    }

    /// Last received attribution, for the publish path. The type is `None`
    /// and the tag empty when no attributable record exists.
    pub fn received(&self) -> (Option<u8>, &str) {
        (self.recv_type, self.recv_tag.as_str())
    }

    /// Reset stored attribution to "none".
    pub fn clear_received(&mut self) {
        self.recv_type = None;
        self.recv_tag.clear();
    }

    /// Feed a history record from the device into the gate.
    ///
    /// Records are also accepted after the wait window expired: a late
    /// record that correlates still amends the already-published state.
    pub fn on_record(
        &mut self,
        record: &HistoryRecord,
        classifier: &impl TriggerClassifier,
    ) -> GateDecision {
        match record.result {
            HistoryResult::NotFound => {
                // Definitive: no record will ever exist for this transition.
                debug!("no history record for transition");
                self.clear_received();
                self.requested_at_ms = None;
                GateDecision::Publish
            }
            HistoryResult::Other => {
                if self.pending() {
                    warn!("history read failed, will retry");
                    GateDecision::Retry
                } else {
                    GateDecision::Ignore
                }
            }
            HistoryResult::Success => {
                let class = classifier.classify(record.type_code);
                if !self.correlates(class) {
                    debug!(
                        "history type {} does not correlate with {}, ignored",
                        record.type_code, self.target
                    );
                    return GateDecision::Ignore;
                }
                self.recv_type = Some(record.type_code);
                self.recv_tag = record.tag.clone();
                self.requested_at_ms = None;
                GateDecision::Publish
            }
        }
    }

    /// Returns `true` exactly once when the wait window has outlived
    /// `timeout_ms`; the caller publishes without attribution.
    pub fn expired(&mut self, now_ms: u64, timeout_ms: u32) -> bool {
        match self.requested_at_ms {
            Some(at) if now_ms.saturating_sub(at) > timeout_ms as u64 => {
                self.requested_at_ms = None;
                self.clear_received();
                true
            }
            _ => false,
        }
    }

    fn correlates(&self, class: TriggerClass) -> bool {
        match self.semantics {
            // Bots and bikes: any user-attributable record counts.
            HistorySemantics::Simple => class != TriggerClass::DriveOriginated,
            HistorySemantics::Correlated => match self.target {
                LockState::Locked => class == TriggerClass::LockEvent,
                LockState::Unlocked => class == TriggerClass::UnlockEvent,
                // Jammed and Unknown have no specific trigger; accept any.
                _ => class != TriggerClass::DriveOriginated,
            },
        }
    }
}
