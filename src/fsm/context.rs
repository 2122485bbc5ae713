//! Shared mutable context threaded through every connection state handler.
//!
//! `FsmContext` is the blackboard the state handlers read from and write to:
//! the mirrored session state, cached telemetry, retry bookkeeping, timing,
//! and an outgoing command block the service applies to the session port
//! after each tick. Handlers never touch the port or the arbiter directly.

use crate::app::ports::{SesameStatus, SessionState};
use crate::arbiter::LockId;
use crate::config::LockConfig;

// ---------------------------------------------------------------------------
// Pending operation requests
// ---------------------------------------------------------------------------

/// Externally requested operations not yet serviced. Any set bit makes
/// "should be connected" true in on-demand mode; all are serviced and
/// cleared once the instance reaches `Running`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationRequests {
    pub update_status: bool,
    pub lock: bool,
    pub unlock: bool,
    pub open: bool,
}

impl OperationRequests {
    pub fn any(self) -> bool {
        self.update_status || self.lock || self.unlock || self.open
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Session commands (written by state handlers; applied by the service)
// ---------------------------------------------------------------------------

/// Side effects requested by state handlers, applied to the session port
/// and the arbiter by the service after the FSM tick, then cleared.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCommands {
    /// Join the arbiter's connect queue.
    pub enqueue_connect: bool,
    /// Leave the arbiter's queue (normal head release or defensive removal).
    pub release_arbiter: bool,
    /// Start the asynchronous connect on the worker context.
    pub start_connect: bool,
    /// Evict a competing server-role connection.
    pub disconnect_server: bool,
    /// Tear down the session and clear cached telemetry.
    pub disconnect: bool,
    /// New value for the connection indicator sink.
    pub publish_connection: Option<bool>,
    /// Escalate to a full device restart.
    pub reboot: bool,
}

impl SessionCommands {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    /// Queue identity of this instance.
    pub id: LockId,
    /// Log tag.
    pub name: &'static str,
    /// Instance configuration.
    pub config: LockConfig,

    // -- Timing --
    /// Current poll timestamp (milliseconds, monotonic).
    pub now_ms: u64,
    /// Timestamp of the last genuine state transition. Never reset by
    /// same-state no-ops; the sole basis for elapsed-time timeouts.
    pub state_started_ms: u64,

    // -- Mirrored collaborator state --
    /// Session client state, mirrored from its state callback.
    pub session_state: SessionState,
    /// Latest telemetry snapshot; `None` means "telemetry unknown".
    pub sesame_status: Option<SesameStatus>,
    /// A server-role BLE link is currently up (sampled each tick).
    pub server_connected: bool,
    /// This instance holds the head of the connect queue (sampled each tick).
    pub arbiter_granted: bool,
    /// Result of the async connect attempt, delivered via deferred callback.
    pub connect_result: Option<bool>,

    // -- Retry bookkeeping --
    /// Connect attempts since the last successful authentication.
    pub connect_tried: u16,
    /// When the last connect was issued; gates the retry interval.
    pub last_connect_attempt_ms: Option<u64>,
    /// The reboot escalation has been requested (one-shot).
    pub reboot_requested: bool,

    // -- Operation requests --
    pub pending_ops: OperationRequests,

    // -- Outputs --
    pub commands: SessionCommands,
}

impl FsmContext {
    pub fn new(id: LockId, name: &'static str, config: LockConfig) -> Self {
        Self {
            id,
            name,
            config,
            now_ms: 0,
            state_started_ms: 0,
            session_state: SessionState::Idle,
            sesame_status: None,
            server_connected: false,
            arbiter_granted: false,
            connect_result: None,
            connect_tried: 0,
            last_connect_attempt_ms: None,
            reboot_requested: false,
            pending_ops: OperationRequests::default(),
            commands: SessionCommands::default(),
        }
    }

    /// Milliseconds spent in the current state.
    pub fn ms_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_started_ms)
    }

    /// Always-connect configuration, or an unserviced operation request.
    pub fn should_connect(&self) -> bool {
        self.config.always_connect || self.pending_ops.any()
    }

    /// The connect attempt has been stuck longer than the session client's
    /// own timeout plus margin — a driver/radio fault, not a retry case.
    pub fn connect_window_expired(&self) -> bool {
        let limit = self.config.connect_timeout_ms + self.config.connect_timeout_margin_ms;
        self.ms_in_state() > limit as u64
    }
}
