//! Function-pointer finite state machine for the BLE connection lifecycle.
//!
//! Classic embedded FSM pattern: a fixed table of state descriptors, each a
//! set of plain `fn` pointers — no closures, no dynamic dispatch, no heap.
//!
//! ```text
//! NOT_CONNECTED ──[should connect, retry interval]──▶ WAIT_CONNECT
//!   ▲    ▲                                               │
//!   │    │                              [arbiter grant]  │  [server link up]
//!   │    │                                    ┌──────────┴─────▶ WAIT_SERVER_DISCONNECT
//!   │    │                                    ▼                        │
//!   │    └──────[connect failed]───────── CONNECTING ◀─────────────────┘
//!   │                                         │ [transport connected]
//!   │                                         ▼
//!   └────[idle / timeout / session drop]─ AUTHENTICATING ──[active]──▶ RUNNING
//!
//! retry exhausted or connect stuck ──▶ WAIT_REBOOT (terminal, absorbs all)
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state. If it
//! returns `Some(next)`, the engine runs `on_exit`, updates the pointer and
//! the `state_started_ms` timestamp, then runs `on_enter`. Timeouts are
//! computed exclusively from `state_started_ms`, which a same-state return
//! never resets.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Connection lifecycle states of one lock instance.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    NotConnected = 0,
    WaitConnect = 1,
    WaitServerDisconnect = 2,
    Connecting = 3,
    Authenticating = 4,
    Running = 5,
    WaitReboot = 6,
}

impl StateId {
    /// Total number of states — sizes the table array.
    pub const COUNT: usize = 7;

    /// Convert a `u8` index back to `StateId`. Panics on out-of-range in
    /// debug builds; returns `NotConnected` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::NotConnected,
            1 => Self::WaitConnect,
            2 => Self::WaitServerDisconnect,
            3 => Self::Connecting,
            4 => Self::Authenticating,
            5 => Self::Running,
            6 => Self::WaitReboot,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::NotConnected
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single connection state.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The connection state machine engine.
///
/// Owns the state table and is driven by the poll loop; all waiting is
/// expressed as states checked on the next tick, never as blocking calls.
pub struct Fsm {
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!(
            "{}: FSM starting in state {}",
            ctx.name, self.table[self.current].name
        );
        ctx.state_started_ms = ctx.now_ms;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        let next = (self.table[self.current].on_update)(ctx);
        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        // Same state → no-op; the state timer must not be reset.
        if next_idx == self.current {
            return;
        }
        // WaitReboot is terminal and absorbs every further transition request.
        if self.current == StateId::WaitReboot as usize {
            return;
        }

        info!(
            "{}: {} -> {}",
            ctx.name, self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        ctx.state_started_ms = ctx.now_ms;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
