//! Outbound application events.
//!
//! The [`LockService`](super::service::LockService) emits these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them — log to serial, surface diagnostics, or, for
//! [`AppEvent::RebootRequested`], trigger the platform's safe-reboot hook.

use crate::fsm::StateId;
use crate::lock::LockState;

/// Structured events emitted by the lock service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The service has started (carries the initial connection state).
    Started(StateId),

    /// The connection state machine transitioned.
    ConnectionStateChanged { from: StateId, to: StateId },

    /// The externally published lock state changed.
    LockStateChanged { from: LockState, to: LockState },

    /// Retry exhaustion or a stuck connect: the platform must restart the
    /// device. The service is permanently failed from this point on.
    RebootRequested,
}
