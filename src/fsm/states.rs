//! Concrete connection state handlers and table builder.
//!
//! The handlers implement the lifecycle documented in [`super`]: connect
//! attempts are serialized through the arbiter, the session client does the
//! actual handshake on a worker context, and everything unrecoverable ends
//! in `WaitReboot`. Handlers only mutate the context; the service applies
//! the resulting [`SessionCommands`](super::context::SessionCommands).

use super::context::FsmContext;
use super::{StateDescriptor, StateId};
use log::{error, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table. Called once per instance at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — NotConnected
        StateDescriptor {
            id: StateId::NotConnected,
            name: "NotConnected",
            on_enter: None,
            on_exit: None,
            on_update: not_connected_update,
        },
        // Index 1 — WaitConnect
        StateDescriptor {
            id: StateId::WaitConnect,
            name: "WaitConnect",
            on_enter: None,
            on_exit: None,
            on_update: wait_connect_update,
        },
        // Index 2 — WaitServerDisconnect
        StateDescriptor {
            id: StateId::WaitServerDisconnect,
            name: "WaitServerDisconnect",
            on_enter: None,
            on_exit: None,
            on_update: wait_server_disconnect_update,
        },
        // Index 3 — Connecting
        StateDescriptor {
            id: StateId::Connecting,
            name: "Connecting",
            on_enter: None,
            on_exit: None,
            on_update: connecting_update,
        },
        // Index 4 — Authenticating
        StateDescriptor {
            id: StateId::Authenticating,
            name: "Authenticating",
            on_enter: None,
            on_exit: None,
            on_update: authenticating_update,
        },
        // Index 5 — Running
        StateDescriptor {
            id: StateId::Running,
            name: "Running",
            on_enter: None,
            on_exit: None,
            on_update: running_update,
        },
        // Index 6 — WaitReboot
        StateDescriptor {
            id: StateId::WaitReboot,
            name: "WaitReboot",
            on_enter: Some(wait_reboot_enter),
            on_exit: None,
            on_update: wait_reboot_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  NOT_CONNECTED — idle, waiting for a reason and a retry slot
// ═══════════════════════════════════════════════════════════════════════════

fn not_connected_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.commands.publish_connection = Some(false);

    let limit = ctx.config.connect_retry_limit;
    if limit != 0 && ctx.connect_tried >= limit {
        error!(
            "{}: cannot connect after {} attempts, reboot in {} ms",
            ctx.name, ctx.connect_tried, ctx.config.reboot_delay_ms
        );
        return Some(StateId::WaitReboot);
    }

    if !ctx.should_connect() {
        return None;
    }

    let interval_elapsed = match ctx.last_connect_attempt_ms {
        None => true,
        Some(last) => ctx.now_ms.saturating_sub(last) >= ctx.config.connect_retry_interval_ms as u64,
    };
    if interval_elapsed {
        ctx.commands.enqueue_connect = true;
        return Some(StateId::WaitConnect);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAIT_CONNECT — queued behind peers for the shared radio
// ═══════════════════════════════════════════════════════════════════════════

fn wait_connect_update(ctx: &mut FsmContext) -> Option<StateId> {
    // A peer that never releases must not starve us forever. Fall back and
    // retry; the radio was never driven, so this is not a reboot case.
    if ctx.connect_window_expired() {
        warn!("{}: gave up waiting for connect slot", ctx.name);
        ctx.commands.release_arbiter = true;
        return Some(StateId::NotConnected);
    }

    if ctx.arbiter_granted {
        if ctx.server_connected {
            ctx.commands.disconnect_server = true;
            return Some(StateId::WaitServerDisconnect);
        }
        ctx.commands.start_connect = true;
        return Some(StateId::Connecting);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAIT_SERVER_DISCONNECT — evicting a competing server-role link
// ═══════════════════════════════════════════════════════════════════════════

fn wait_server_disconnect_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.server_connected {
        ctx.commands.start_connect = true;
        return Some(StateId::Connecting);
    }
    if ctx.ms_in_state() > ctx.config.connect_timeout_margin_ms as u64 {
        warn!("{}: server link did not drop, retrying later", ctx.name);
        ctx.commands.release_arbiter = true;
        return Some(StateId::NotConnected);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING — async connect in flight on the worker context
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(ok) = ctx.connect_result.take() {
        ctx.commands.release_arbiter = true;
        if ok {
            return Some(StateId::Authenticating);
        }
        warn!("{}: connect failed", ctx.name);
        return Some(StateId::NotConnected);
    }

    if ctx.connect_window_expired() {
        error!(
            "{}: connect attempt not finished within expected time, reboot in {} ms",
            ctx.name, ctx.config.reboot_delay_ms
        );
        ctx.commands.release_arbiter = true;
        return Some(StateId::WaitReboot);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  AUTHENTICATING — transport up, session handshake running
// ═══════════════════════════════════════════════════════════════════════════

fn authenticating_update(ctx: &mut FsmContext) -> Option<StateId> {
    use crate::app::ports::SessionState;

    let regressed = ctx.session_state == SessionState::Idle;
    if regressed || ctx.ms_in_state() > ctx.config.authenticate_timeout_ms as u64 {
        ctx.commands.disconnect = true;
        return Some(StateId::NotConnected);
    }

    if ctx.session_state == SessionState::Active {
        ctx.connect_tried = 0;
        ctx.last_connect_attempt_ms = None;
        ctx.commands.publish_connection = Some(true);
        info!("{}: authenticated by SESAME", ctx.name);
        return Some(StateId::Running);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING — session active, operations allowed
// ═══════════════════════════════════════════════════════════════════════════

fn running_update(ctx: &mut FsmContext) -> Option<StateId> {
    use crate::app::ports::SessionState;

    if !ctx.should_connect() {
        ctx.commands.disconnect = true;
        return Some(StateId::NotConnected);
    }
    if ctx.session_state != SessionState::Active {
        ctx.commands.disconnect = true;
        return Some(StateId::NotConnected);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAIT_REBOOT — terminal, absorbs everything
// ═══════════════════════════════════════════════════════════════════════════

fn wait_reboot_enter(ctx: &mut FsmContext) {
    // The queue slot may still be held if we came from Connecting.
    ctx.commands.release_arbiter = true;
}

fn wait_reboot_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.reboot_requested && ctx.ms_in_state() > ctx.config.reboot_delay_ms as u64 {
        ctx.reboot_requested = true;
        ctx.commands.reboot = true;
    }
    None
}
