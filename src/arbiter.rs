//! Connection arbiter — FIFO gatekeeper for the shared BLE radio.
//!
//! The radio controller is a single OS-level resource; concurrent connect
//! sequences from two lock instances corrupt or fail. Every instance that
//! wants to connect enqueues here and polls [`ConnectArbiter::can_proceed`]
//! each tick until it reaches the head of the queue.
//!
//! None of these operations block or fail. "Failure" is `can_proceed`
//! staying false, which the caller's state machine bounds with its own
//! timeout so a peer that never releases cannot starve the rest.

use core::fmt;
use std::sync::{Mutex, PoisonError};

use heapless::Deque;
use log::{debug, warn};

/// Maximum number of lock instances sharing one radio.
pub const MAX_LOCKS: usize = 8;

/// Stable identity of one lock instance in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockId(pub u8);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock#{}", self.0)
    }
}

/// Process-wide FIFO of instances waiting to drive the connect sequence.
///
/// One arbiter exists per radio, created at process start and shared by
/// every [`LockService`](crate::app::service::LockService) as an injected
/// service object (keeps it testable with fake instances).
pub struct ConnectArbiter {
    queue: Mutex<Deque<LockId, MAX_LOCKS>>,
}

impl ConnectArbiter {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Deque::new()),
        }
    }

    /// Append `id` to the tail. Returns `true` iff the instance is now the
    /// head and may start connecting immediately.
    ///
    /// Callers must not enqueue twice without a matching [`release`];
    /// a duplicate is dropped with a warning rather than queued again.
    ///
    /// [`release`]: Self::release
    pub fn enqueue(&self, id: LockId) -> bool {
        let mut q = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if q.iter().any(|&e| e == id) {
            warn!("{id}: already queued for connect, enqueue ignored");
        } else if q.push_back(id).is_err() {
            // Capacity equals the instance limit, so this means a caller
            // leaked a slot. Recoverable: the caller retries next tick.
            warn!("{id}: connect queue full, enqueue dropped");
            return false;
        } else {
            debug!("{id}: queued for connect ({} waiting)", q.len());
        }
        q.front() == Some(&id)
    }

    /// `true` iff `id` holds the head of the queue.
    pub fn can_proceed(&self, id: LockId) -> bool {
        let q = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        q.front() == Some(&id)
    }

    /// Remove `id` from the queue.
    ///
    /// Normally `id` is the head. A non-head removal can happen when a
    /// wait-connect timeout fires out of expected order; it is compensated
    /// by a linear scan and logged, never fatal.
    pub fn release(&self, id: LockId) {
        let mut q = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if q.front() == Some(&id) {
            q.pop_front();
            return;
        }
        let before = q.len();
        let mut rest: Deque<LockId, MAX_LOCKS> = Deque::new();
        while let Some(e) = q.pop_front() {
            if e != id {
                // push_back cannot fail: we only ever put back what we took out.
                let _ = rest.push_back(e);
            }
        }
        if rest.len() != before {
            warn!("{id}: released from non-head queue position");
        }
        *q = rest;
    }

    /// Number of instances currently queued.
    pub fn waiting(&self) -> usize {
        let q = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        q.len()
    }
}

impl Default for ConnectArbiter {
    fn default() -> Self {
        Self::new()
    }
}
