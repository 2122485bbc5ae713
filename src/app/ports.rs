//! Port traits — the boundary between the lifecycle manager and the world.
//!
//! ```text
//!   SessionPort (BLE session adapter) ──▶ LockService ──▶ StateSink
//!                                                     ──▶ TelemetrySink
//!                                                     ──▶ EventSink
//! ```
//!
//! The session client (encrypted device session, operation primitives) and
//! the sensor sinks are external collaborators; adapters implement these
//! traits and the [`LockService`](super::service::LockService) consumes them
//! via generics, so the core never touches a radio or a sensor framework.
//!
//! Callback discipline: adapters may receive session events on a different
//! execution context, but they must deliver them to the service's
//! `on_*` entry points from the poll loop's context only. The service then
//! stores the data and defers re-evaluation to the next tick.

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::lock::LockState;

/// Longest history tag accepted from the device (protocol limit + NUL).
pub const HISTORY_TAG_MAX: usize = 32;

// ───────────────────────────────────────────────────────────────
// Session client data types
// ───────────────────────────────────────────────────────────────

/// Coarse session-client state, mirrored via its state callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Authenticating,
    Active,
}

/// Mechanical state of the drive motor as reported in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorStatus {
    Idle,
    Holding,
    Moving,
}

impl MotorStatus {
    /// The motor is actively driving (neither settled nor holding torque).
    pub fn is_driving(self) -> bool {
        self == Self::Moving
    }
}

/// A point-in-time telemetry snapshot pushed by the session client.
#[derive(Debug, Clone, Copy)]
pub struct SesameStatus {
    /// The locked-position sensor is asserted.
    pub in_lock: bool,
    /// The unlocked-position sensor is asserted.
    pub in_unlock: bool,
    /// Explicit hardware fault flag; `None` on models without it.
    pub is_critical: Option<bool>,
    pub motor_status: MotorStatus,
    pub battery_pct: f32,
    pub battery_voltage: f32,
}

/// Result code carried by a history response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryResult {
    Success,
    /// No attributable record exists for the transition.
    NotFound,
    /// Transient read failure; a retry is expected to succeed.
    Other,
}

/// An audit-trail record correlating a state change with its trigger.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub result: HistoryResult,
    /// Raw device-specific trigger-subtype code.
    pub type_code: u8,
    /// Free-text tag (who/what performed the operation), size-bounded.
    pub tag: String<HISTORY_TAG_MAX>,
}

/// Classification of a history trigger code, relative to lock semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerClass {
    /// The record describes the device becoming locked.
    LockEvent,
    /// The record describes the device becoming unlocked.
    UnlockEvent,
    /// Internal drive-mechanism record, never attributable to a user.
    DriveOriginated,
    Other,
}

/// Maps raw trigger-subtype codes to [`TriggerClass`].
///
/// The code vocabulary is closed but device-specific; the protocol
/// collaborator supplies the table rather than this crate hardcoding it.
pub trait TriggerClassifier {
    fn classify(&self, type_code: u8) -> TriggerClass;
}

// ───────────────────────────────────────────────────────────────
// Session port (driven adapter: domain → BLE session client)
// ───────────────────────────────────────────────────────────────

/// Operations the lifecycle manager invokes on the encrypted session client.
pub trait SessionPort {
    /// Validate address/model/keys and prepare the client.
    /// Failure is fatal for the instance (configuration class).
    fn begin(&mut self) -> Result<(), crate::SetupError>;

    /// Start the connect handshake on the worker context. The result comes
    /// back through the service's `on_connect_result` entry point.
    fn connect_async(&mut self);

    /// Release the transport resource.
    fn disconnect(&mut self);

    /// A competing server-role BLE link is currently up.
    fn server_connected(&self) -> bool;

    /// Drop the server-role link so the client-role connect can proceed.
    fn disconnect_server(&mut self);

    fn lock(&mut self, tag: &str);
    fn unlock(&mut self, tag: &str);
    /// Momentary actuation (bots only).
    fn click(&mut self, tag: &str);

    /// Ask the device for the most recent history record.
    /// Returns `false` if the request could not be issued.
    fn request_history(&mut self) -> bool;

    /// Ask the device for a fresh status report.
    fn request_status(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Outbound sinks (driven adapters: domain → sensor entities)
// ───────────────────────────────────────────────────────────────

/// Receives the externally visible lock state and history metadata.
pub trait StateSink {
    fn publish_lock_state(&mut self, state: LockState);
    /// History tag text; empty string clears the entity.
    fn publish_history_tag(&mut self, tag: &str);
    /// History type code; `f32::NAN` clears the entity.
    fn publish_history_type(&mut self, type_code: f32);
}

/// Receives battery readings and the connection indicator.
pub trait TelemetrySink {
    fn publish_battery_pct(&mut self, pct: f32);
    fn publish_battery_voltage(&mut self, volts: f32);
    fn publish_connected(&mut self, connected: bool);
}

/// The service emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go (serial log, reboot
/// hook, diagnostics buffer).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
