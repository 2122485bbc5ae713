//! Deferred-task runner — the scheduler adapter.
//!
//! Abstracts the host framework's "run this once after N milliseconds" and
//! "run this on the next tick" primitives. Session-client callbacks may fire
//! from a different execution context; their handlers only record data and
//! defer the actual re-evaluation through this runner, so per-instance state
//! is mutated exclusively from the poll loop.
//!
//! The runner is generic over the task type — the service instantiates it
//! with its own task enum, keeping the engine free of `dyn` and boxing.

use heapless::Vec;
use log::warn;

/// Maximum number of pending deferred tasks per instance.
const MAX_DEFERRED: usize = 16;

/// A fixed-capacity queue of tasks with due timestamps.
pub struct DeferredRunner<T> {
    entries: Vec<Entry<T>, MAX_DEFERRED>,
}

struct Entry<T> {
    due_ms: u64,
    task: T,
}

impl<T> DeferredRunner<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Run `task` on the next tick.
    pub fn defer(&mut self, task: T) {
        self.defer_at(0, task);
    }

    /// Run `task` once `now >= due_ms`.
    pub fn defer_ms(&mut self, now_ms: u64, delay_ms: u64, task: T) {
        self.defer_at(now_ms + delay_ms, task);
    }

    fn defer_at(&mut self, due_ms: u64, task: T) {
        if self.entries.push(Entry { due_ms, task }).is_err() {
            // Bounded by design: dropping the newest task is recoverable
            // because every consumer re-evaluates from current state.
            warn!("deferred task queue full, task dropped");
        }
    }

    /// Remove and return the oldest task whose due time has passed.
    ///
    /// Call in a loop each tick until it returns `None`; due tasks run in
    /// the order they were deferred.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<T> {
        let idx = self.entries.iter().position(|e| e.due_ms <= now_ms)?;
        // remove() preserves the relative order of the remainder.
        Some(self.entries.remove(idx).task)
    }

    /// Number of tasks still pending (due or not).
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Drop every pending task.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for DeferredRunner<T> {
    fn default() -> Self {
        Self::new()
    }
}
