//! Inbound commands to the lock service.
//!
//! These represent actions requested by the outside world (home-automation
//! frontend, scheduler, serial console) that the
//! [`LockService`](super::service::LockService) interprets and acts upon.
//! Operations issued through commands use the instance's default history
//! tag; callers that need a custom tag use the service methods directly.

/// Commands that external adapters can send into the lock service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCommand {
    /// Drive the mechanism to the locked position.
    Lock,

    /// Drive the mechanism to the unlocked position.
    Unlock,

    /// Momentary open: `click` on bot models, `unlock` otherwise.
    Open,

    /// Ask the device for a fresh status report (polling hook).
    RequestStatus,
}
