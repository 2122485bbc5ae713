//! Per-lock application service.
//!
//! `LockService` wires one lock instance together: the connection FSM, the
//! lock-state feature, the deferred-task runner and the shared connect
//! arbiter. The host's poll loop calls [`tick`](LockService::tick) with the
//! current timestamp and the adapters; session-client callbacks land in the
//! `on_*` entry points, which only record data and defer re-evaluation, so
//! every piece of per-instance state is mutated from the poll loop alone.

use std::sync::Arc;

use log::{error, info, warn};

use crate::arbiter::{ConnectArbiter, LockId};
use crate::config::LockConfig;
use crate::fsm::context::FsmContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::lock::history::GateDecision;
use crate::lock::{LockFeature, LockState};
use crate::scheduler::DeferredRunner;
use crate::{Error, Result, SetupError};

use super::commands::LockCommand;
use super::events::AppEvent;
use super::ports::{
    EventSink, HistoryRecord, SesameStatus, SessionPort, SessionState, StateSink, TelemetrySink,
    TriggerClassifier,
};

/// Work items deferred from callbacks to the next poll-loop tick.
#[derive(Debug, Clone)]
enum Task {
    /// Re-run the reflector over the cached telemetry snapshot.
    ReflectStatus,
    /// A history record arrived and is waiting in `incoming_history`.
    HistoryArrived,
    /// Re-issue a failed history read (backoff elapsed).
    RetryHistory,
    /// The async connect finished with this outcome.
    ConnectResult(bool),
}

/// One managed lock instance.
pub struct LockService {
    fsm: Fsm,
    ctx: FsmContext,
    feature: LockFeature,
    runner: DeferredRunner<Task>,
    arbiter: Arc<ConnectArbiter>,
    default_history_tag: &'static str,
    incoming_history: Option<HistoryRecord>,
    last_connection_published: Option<bool>,
    /// Setup failed or a reboot was requested; operations are refused.
    failed: bool,
}

impl LockService {
    /// Build a service for one instance. Rejects invalid configurations and
    /// models that cannot carry a lock entity at all.
    pub fn new(
        id: LockId,
        name: &'static str,
        config: LockConfig,
        arbiter: Arc<ConnectArbiter>,
        uses_history: bool,
        default_history_tag: &'static str,
    ) -> Result<Self> {
        config.validate()?;
        if !config.model.capabilities().lockable {
            return Err(Error::Setup(SetupError::NotLockable));
        }
        let feature = LockFeature::new(name, &config, uses_history);
        Ok(Self {
            fsm: Fsm::new(build_state_table(), StateId::NotConnected),
            ctx: FsmContext::new(id, name, config),
            feature,
            runner: DeferredRunner::new(),
            arbiter,
            default_history_tag,
            incoming_history: None,
            last_connection_published: None,
            failed: false,
        })
    }

    /// One-time startup: prepare the session client, publish the initial
    /// entity states and start the FSM. A `begin` failure is fatal for the
    /// instance but never for its peers.
    pub fn setup(
        &mut self,
        now_ms: u64,
        session: &mut impl SessionPort,
        out: &mut (impl StateSink + TelemetrySink + EventSink),
    ) -> Result<()> {
        if let Err(e) = session.begin() {
            error!("{}: session setup failed: {e}", self.ctx.name);
            self.failed = true;
            return Err(Error::Setup(e));
        }
        self.feature.publish_initial_state(out);
        out.publish_connected(false);
        self.last_connection_published = Some(false);
        self.ctx.now_ms = now_ms;
        self.fsm.start(&mut self.ctx);
        out.emit(&AppEvent::Started(self.fsm.current_state()));
        Ok(())
    }

    // ───────────────────────────────────────────────────────────
    // Callback entry points (record + defer, nothing else)
    // ───────────────────────────────────────────────────────────

    /// Session-client state callback.
    pub fn on_session_state(&mut self, state: SessionState) {
        self.ctx.session_state = state;
    }

    /// Telemetry callback: cache the snapshot, reflect on the next tick.
    pub fn on_status(&mut self, status: SesameStatus) {
        self.ctx.sesame_status = Some(status);
        self.runner.defer(Task::ReflectStatus);
    }

    /// History callback. Only the newest record is kept if several arrive
    /// within one poll interval.
    pub fn on_history(&mut self, record: HistoryRecord) {
        self.incoming_history = Some(record);
        self.runner.defer(Task::HistoryArrived);
    }

    /// Connect-completion callback from the worker context.
    pub fn on_connect_result(&mut self, ok: bool) {
        self.runner.defer(Task::ConnectResult(ok));
    }

    // ───────────────────────────────────────────────────────────
    // Operations
    // ───────────────────────────────────────────────────────────

    /// Dispatch an externally issued command.
    pub fn handle_command(&mut self, command: LockCommand, session: &mut impl SessionPort) {
        match command {
            LockCommand::Lock => self.lock(session, self.default_history_tag),
            LockCommand::Unlock => self.unlock(session, self.default_history_tag),
            LockCommand::Open => self.open(session, self.default_history_tag),
            LockCommand::RequestStatus => self.request_status(session),
        }
    }

    /// Drive to the locked position, attributed to `tag`.
    ///
    /// In on-demand mode a request issued while disconnected is queued and
    /// is what triggers the connection; queued requests replay with the
    /// default tag. In always-connect mode the session is expected to be
    /// up, so the operation is refused instead of queued.
    pub fn lock(&mut self, session: &mut impl SessionPort, tag: &str) {
        if !self.operable() {
            return;
        }
        if self.session_active() {
            session.lock(tag);
        } else if self.queue_allowed("lock") {
            self.ctx.pending_ops.lock = true;
        }
    }

    /// Drive to the unlocked position, attributed to `tag`.
    pub fn unlock(&mut self, session: &mut impl SessionPort, tag: &str) {
        if !self.operable() {
            return;
        }
        if self.session_active() {
            session.unlock(tag);
        } else if self.queue_allowed("unlock") {
            self.ctx.pending_ops.unlock = true;
        }
    }

    /// Momentary open: `click` on bot models, `unlock` otherwise.
    pub fn open(&mut self, session: &mut impl SessionPort, tag: &str) {
        if !self.operable() {
            return;
        }
        if self.session_active() {
            if self.feature.open_uses_click() {
                session.click(tag);
            } else {
                session.unlock(tag);
            }
        } else if self.queue_allowed("open") {
            self.ctx.pending_ops.open = true;
        }
    }

    /// Ask the device for a fresh status report.
    pub fn request_status(&mut self, session: &mut impl SessionPort) {
        if !self.operable() {
            return;
        }
        if self.session_active() {
            session.request_status();
        } else {
            self.ctx.pending_ops.update_status = true;
        }
    }

    // ───────────────────────────────────────────────────────────
    // Poll loop
    // ───────────────────────────────────────────────────────────

    /// Advance the instance by one poll interval.
    pub fn tick(
        &mut self,
        now_ms: u64,
        session: &mut impl SessionPort,
        out: &mut (impl StateSink + TelemetrySink + EventSink),
        classifier: &impl TriggerClassifier,
    ) {
        self.ctx.now_ms = now_ms;

        self.drain_tasks(now_ms, session, out, classifier);

        self.feature
            .test_unknown_state(self.ctx.sesame_status.is_some(), now_ms, out);

        // Sample the shared collaborators once per tick; handlers only see
        // the snapshot.
        self.ctx.arbiter_granted = self.arbiter.can_proceed(self.ctx.id);
        self.ctx.server_connected = session.server_connected();

        let before = self.fsm.current_state();
        self.fsm.tick(&mut self.ctx);
        let after = self.fsm.current_state();
        if before != after {
            out.emit(&AppEvent::ConnectionStateChanged {
                from: before,
                to: after,
            });
        }

        self.apply_commands(now_ms, session, out);

        if after == StateId::Running {
            self.feature.test_timeouts(now_ms, session, out);
            self.service_pending_ops(session);
        }
    }

    /// Current connection lifecycle state.
    pub fn connection_state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Currently derived lock state.
    pub fn lock_state(&self) -> LockState {
        self.feature.lock_state()
    }

    /// The instance refuses operations (setup failure or pending reboot).
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    // ───────────────────────────────────────────────────────────
    // Internals
    // ───────────────────────────────────────────────────────────

    fn operable(&self) -> bool {
        if self.failed {
            warn!("{}: not operable, operation ignored", self.ctx.name);
            return false;
        }
        true
    }

    /// In always-connect mode the session should already be up; refuse
    /// rather than silently queue. Status refreshes are always queueable.
    fn queue_allowed(&self, op: &str) -> bool {
        if self.ctx.config.always_connect {
            warn!("{}: not connected, {op} ignored", self.ctx.name);
            return false;
        }
        true
    }

    fn session_active(&self) -> bool {
        self.fsm.current_state() == StateId::Running
            && self.ctx.session_state == SessionState::Active
    }

    fn drain_tasks(
        &mut self,
        now_ms: u64,
        session: &mut impl SessionPort,
        out: &mut (impl StateSink + TelemetrySink + EventSink),
        classifier: &impl TriggerClassifier,
    ) {
        while let Some(task) = self.runner.pop_due(now_ms) {
            match task {
                Task::ReflectStatus => {
                    let status = self.ctx.sesame_status;
                    self.feature
                        .reflect_status(status.as_ref(), now_ms, session, out);
                    if let Some(s) = status {
                        out.publish_battery_pct(s.battery_pct);
                        out.publish_battery_voltage(s.battery_voltage);
                    }
                }
                Task::HistoryArrived => {
                    let Some(record) = self.incoming_history.take() else {
                        continue;
                    };
                    match self.feature.on_history(&record, classifier) {
                        GateDecision::Publish => self.feature.publish_history_state(out),
                        GateDecision::Retry => {
                            let backoff = self.ctx.config.history_retry_backoff_ms;
                            self.runner
                                .defer_ms(now_ms, backoff as u64, Task::RetryHistory);
                        }
                        GateDecision::Ignore => {}
                    }
                }
                Task::RetryHistory => self.feature.retry_history(now_ms, session, out),
                Task::ConnectResult(ok) => self.ctx.connect_result = Some(ok),
            }
        }
    }

    fn apply_commands(
        &mut self,
        now_ms: u64,
        session: &mut impl SessionPort,
        out: &mut (impl StateSink + TelemetrySink + EventSink),
    ) {
        let commands = self.ctx.commands;
        self.ctx.commands.clear();

        if commands.enqueue_connect {
            self.ctx.connect_tried = self.ctx.connect_tried.saturating_add(1);
            self.arbiter.enqueue(self.ctx.id);
        }
        if commands.release_arbiter {
            self.arbiter.release(self.ctx.id);
        }
        if commands.disconnect_server {
            info!("{}: dropping server-role link", self.ctx.name);
            session.disconnect_server();
        }
        if commands.start_connect {
            info!(
                "{}: connecting (attempt {})",
                self.ctx.name, self.ctx.connect_tried
            );
            // A result left over from an abandoned attempt must not satisfy
            // this one.
            self.ctx.connect_result = None;
            self.ctx.last_connect_attempt_ms = Some(now_ms);
            session.connect_async();
        }
        if commands.disconnect {
            info!("{}: disconnected", self.ctx.name);
            session.disconnect();
            self.ctx.sesame_status = None;
        }
        if let Some(connected) = commands.publish_connection {
            if self.last_connection_published != Some(connected) {
                out.publish_connected(connected);
                self.last_connection_published = Some(connected);
            }
        }
        if commands.reboot {
            error!("{}: rebooting device", self.ctx.name);
            self.failed = true;
            out.emit(&AppEvent::RebootRequested);
        }
    }

    /// Replay queued operations once the session is active.
    fn service_pending_ops(&mut self, session: &mut impl SessionPort) {
        if !self.ctx.pending_ops.any() || self.ctx.session_state != SessionState::Active {
            return;
        }
        let ops = self.ctx.pending_ops;
        self.ctx.pending_ops.clear();
        let tag = self.default_history_tag;
        if ops.update_status {
            session.request_status();
        }
        if ops.lock {
            session.lock(tag);
        }
        if ops.unlock {
            session.unlock(tag);
        }
        if ops.open {
            if self.feature.open_uses_click() {
                session.click(tag);
            } else {
                session.unlock(tag);
            }
        }
    }
}
