//! End-to-end scenarios driving [`LockService`] against recording doubles.
//!
//! Each test plays a poll-loop timeline by hand: callbacks land between
//! ticks exactly as the host framework would deliver them, and assertions
//! check what reached the session port and the sinks.

mod mock_session;

use std::sync::Arc;

use mock_session::{MockOut, MockSession, TestClassifier};
use sesamelink::app::commands::LockCommand;
use sesamelink::app::events::AppEvent;
use sesamelink::app::ports::{HistoryRecord, HistoryResult, MotorStatus, SesameStatus, SessionState};
use sesamelink::app::service::LockService;
use sesamelink::arbiter::{ConnectArbiter, LockId};
use sesamelink::config::LockConfig;
use sesamelink::fsm::StateId;
use sesamelink::lock::LockState;
use sesamelink::model::LockModel;

fn status(in_lock: bool, in_unlock: bool) -> SesameStatus {
    SesameStatus {
        in_lock,
        in_unlock,
        is_critical: None,
        motor_status: MotorStatus::Idle,
        battery_pct: 87.0,
        battery_voltage: 5.9,
    }
}

fn record(result: HistoryResult, type_code: u8, tag: &str) -> HistoryRecord {
    let mut t = heapless::String::new();
    t.push_str(tag).unwrap();
    HistoryRecord {
        result,
        type_code,
        tag: t,
    }
}

/// One lock instance plus its doubles, pre-`setup()`.
struct Harness {
    svc: LockService,
    session: MockSession,
    out: MockOut,
    arbiter: Arc<ConnectArbiter>,
}

impl Harness {
    fn new(config: LockConfig, uses_history: bool) -> Self {
        let arbiter = Arc::new(ConnectArbiter::new());
        Self::with_arbiter(LockId(0), config, uses_history, arbiter)
    }

    fn with_arbiter(
        id: LockId,
        config: LockConfig,
        uses_history: bool,
        arbiter: Arc<ConnectArbiter>,
    ) -> Self {
        let mut svc =
            LockService::new(id, "lock", config, Arc::clone(&arbiter), uses_history, "home")
                .expect("service construction");
        let mut session = MockSession::new();
        let mut out = MockOut::default();
        svc.setup(0, &mut session, &mut out).expect("setup");
        Self {
            svc,
            session,
            out,
            arbiter,
        }
    }

    fn tick(&mut self, now_ms: u64) {
        self.svc
            .tick(now_ms, &mut self.session, &mut self.out, &TestClassifier);
    }

    /// Play the happy-path connect sequence, ending in `Running` at `base + 300`.
    fn bring_up(&mut self, base_ms: u64) {
        self.tick(base_ms); // NotConnected -> WaitConnect, enqueued
        self.tick(base_ms + 100); // grant -> Connecting, connect issued
        self.svc.on_connect_result(true);
        self.tick(base_ms + 200); // -> Authenticating
        self.svc.on_session_state(SessionState::Active);
        self.tick(base_ms + 300); // -> Running
        assert_eq!(self.svc.connection_state(), StateId::Running);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Connection lifecycle
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn happy_path_connects_and_authenticates() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    assert_eq!(h.out.connected, vec![false]);

    h.tick(0);
    assert_eq!(h.svc.connection_state(), StateId::WaitConnect);
    h.tick(100);
    assert_eq!(h.svc.connection_state(), StateId::Connecting);
    assert_eq!(h.session.connects, 1);

    h.svc.on_connect_result(true);
    h.tick(200);
    assert_eq!(h.svc.connection_state(), StateId::Authenticating);
    // The queue slot is handed over as soon as the transport settles.
    assert_eq!(h.arbiter.waiting(), 0);

    h.svc.on_session_state(SessionState::Active);
    h.tick(300);
    assert_eq!(h.svc.connection_state(), StateId::Running);
    assert_eq!(h.out.connected, vec![false, true]);
}

#[test]
fn connect_failure_waits_out_the_retry_interval() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    h.tick(0);
    h.tick(100); // Connecting, attempt at t=100
    h.svc.on_connect_result(false);
    h.tick(200);
    assert_eq!(h.svc.connection_state(), StateId::NotConnected);
    assert_eq!(h.arbiter.waiting(), 0);

    // Too early: the retry interval since the last attempt has not elapsed.
    h.tick(1_000);
    assert_eq!(h.svc.connection_state(), StateId::NotConnected);

    h.tick(3_200);
    assert_eq!(h.svc.connection_state(), StateId::WaitConnect);
    h.tick(3_300);
    assert_eq!(h.session.connects, 2);
}

#[test]
fn retry_limit_escalates_to_reboot() {
    let config = LockConfig {
        connect_retry_limit: 3,
        ..LockConfig::for_model(LockModel::Sesame5)
    };
    let mut h = Harness::new(config, false);

    let mut now = 0;
    for _ in 0..3 {
        h.tick(now); // -> WaitConnect
        h.tick(now + 100); // -> Connecting
        h.svc.on_connect_result(false);
        h.tick(now + 200); // -> NotConnected
        now += 10_000;
    }
    h.tick(now);
    assert_eq!(h.svc.connection_state(), StateId::WaitReboot);

    // The reboot fires once, after the configured delay.
    h.tick(now + 4_000);
    assert!(!h.out.events.contains(&AppEvent::RebootRequested));
    h.tick(now + 5_100);
    assert!(h.out.events.contains(&AppEvent::RebootRequested));
    assert!(h.svc.is_failed());
    h.tick(now + 6_000);
    let reboots = h
        .out
        .events
        .iter()
        .filter(|e| **e == AppEvent::RebootRequested)
        .count();
    assert_eq!(reboots, 1);
}

#[test]
fn stuck_connect_escalates_to_reboot() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    h.tick(0);
    h.tick(100); // Connecting at t=100, no result ever arrives
    h.tick(5_000);
    assert_eq!(h.svc.connection_state(), StateId::Connecting);
    // connect_timeout (10s) + margin (3s) after entering Connecting
    h.tick(13_200);
    assert_eq!(h.svc.connection_state(), StateId::WaitReboot);
    assert_eq!(h.arbiter.waiting(), 0);
}

#[test]
fn server_link_is_evicted_before_connecting() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    h.session.server_up = true;
    h.tick(0);
    h.tick(100);
    assert_eq!(h.svc.connection_state(), StateId::WaitServerDisconnect);
    assert_eq!(h.session.server_disconnects, 1);
    assert_eq!(h.session.connects, 0);

    h.session.server_up = false;
    h.tick(200);
    assert_eq!(h.svc.connection_state(), StateId::Connecting);
    assert_eq!(h.session.connects, 1);
}

#[test]
fn queued_peer_gives_up_when_head_never_releases() {
    let arbiter = Arc::new(ConnectArbiter::new());
    // A foreign instance parks itself at the head and never releases.
    assert!(arbiter.enqueue(LockId(9)));

    let mut h = Harness::with_arbiter(
        LockId(0),
        LockConfig::for_model(LockModel::Sesame5),
        false,
        Arc::clone(&arbiter),
    );
    h.tick(0);
    assert_eq!(h.svc.connection_state(), StateId::WaitConnect);
    assert_eq!(arbiter.waiting(), 2);

    h.tick(12_000);
    assert_eq!(h.svc.connection_state(), StateId::WaitConnect);
    h.tick(13_100);
    assert_eq!(h.svc.connection_state(), StateId::NotConnected);
    // The slot was removed from a non-head position, never the radio driven.
    assert_eq!(arbiter.waiting(), 1);
    assert_eq!(h.session.connects, 0);
}

#[test]
fn two_instances_serialize_on_the_arbiter() {
    let arbiter = Arc::new(ConnectArbiter::new());
    let mut a = Harness::with_arbiter(
        LockId(0),
        LockConfig::for_model(LockModel::Sesame5),
        false,
        Arc::clone(&arbiter),
    );
    let mut b = Harness::with_arbiter(
        LockId(1),
        LockConfig::for_model(LockModel::Sesame5),
        false,
        Arc::clone(&arbiter),
    );

    a.tick(0);
    b.tick(0);
    a.tick(100);
    b.tick(100);
    assert_eq!(a.svc.connection_state(), StateId::Connecting);
    assert_eq!(b.svc.connection_state(), StateId::WaitConnect);
    assert_eq!(b.session.connects, 0);

    // A's transport settles; the slot passes to B.
    a.svc.on_connect_result(true);
    a.tick(200);
    b.tick(300);
    assert_eq!(b.svc.connection_state(), StateId::Connecting);
    assert_eq!(b.session.connects, 1);
}

#[test]
fn session_drop_in_running_reconnects() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    h.bring_up(0);

    h.svc.on_session_state(SessionState::Idle);
    h.tick(400);
    assert_eq!(h.svc.connection_state(), StateId::NotConnected);
    assert_eq!(h.session.disconnects, 1);
    // The indicator drops on the next idle evaluation.
    h.tick(500);
    assert_eq!(h.out.connected, vec![false, true, false]);
}

#[test]
fn authentication_timeout_tears_down() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    h.tick(0);
    h.tick(100);
    h.svc.on_connect_result(true);
    h.svc.on_session_state(SessionState::Authenticating);
    h.tick(200); // Authenticating entered at t=200
    h.tick(5_100);
    assert_eq!(h.svc.connection_state(), StateId::Authenticating);
    h.tick(5_300);
    assert_eq!(h.svc.connection_state(), StateId::NotConnected);
    assert_eq!(h.session.disconnects, 1);
}

// ═══════════════════════════════════════════════════════════════════════════
//  On-demand mode and operations
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn on_demand_connects_only_for_an_operation() {
    let config = LockConfig {
        always_connect: false,
        ..LockConfig::for_model(LockModel::Sesame5)
    };
    let mut h = Harness::new(config, false);
    h.tick(0);
    h.tick(1_000);
    assert_eq!(h.svc.connection_state(), StateId::NotConnected);
    assert_eq!(h.session.connects, 0);

    h.svc.handle_command(LockCommand::Lock, &mut h.session);
    h.bring_up(2_000);
    // The queued operation replays with the default tag once active.
    h.tick(2_400);
    assert_eq!(h.session.lock_calls, vec!["home".to_owned()]);

    // Nothing pending any more: the session is released.
    h.tick(2_500);
    assert_eq!(h.svc.connection_state(), StateId::NotConnected);
    assert_eq!(h.session.disconnects, 1);
}

#[test]
fn operations_pass_through_while_active() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    h.bring_up(0);
    h.svc.lock(&mut h.session, "front door");
    h.svc.unlock(&mut h.session, "app");
    assert_eq!(h.session.lock_calls, vec!["front door".to_owned()]);
    assert_eq!(h.session.unlock_calls, vec!["app".to_owned()]);
}

#[test]
fn open_clicks_on_bots_and_unlocks_elsewhere() {
    let mut bot = Harness::new(LockConfig::for_model(LockModel::SesameBot), false);
    bot.bring_up(0);
    bot.svc.open(&mut bot.session, "button");
    assert_eq!(bot.session.click_calls, vec!["button".to_owned()]);
    assert!(bot.session.unlock_calls.is_empty());

    let mut lock = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    lock.bring_up(0);
    lock.svc.open(&mut lock.session, "button");
    assert_eq!(lock.session.unlock_calls, vec!["button".to_owned()]);
    assert!(lock.session.click_calls.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
//  Lock state publication
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn status_publishes_state_and_battery_without_history() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    h.bring_up(0);
    h.svc.on_status(status(false, true));
    h.tick(400);
    assert_eq!(h.out.states.last(), Some(&LockState::Unlocked));
    assert_eq!(h.session.history_requests, 0);
    assert_eq!(h.out.battery_pct, vec![87.0]);
    assert_eq!(h.out.battery_volts, vec![5.9]);
}

#[test]
fn history_gate_holds_publish_until_the_record_arrives() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), true);
    h.bring_up(0);
    let published_before = h.out.states.len();

    h.svc.on_status(status(true, false));
    h.tick(400);
    assert_eq!(h.out.states.len(), published_before);
    assert_eq!(h.session.history_requests, 1);

    h.svc
        .on_history(record(HistoryResult::Success, 1, "alice"));
    h.tick(500);
    assert_eq!(h.out.states.last(), Some(&LockState::Locked));
    assert_eq!(h.out.tags.last(), Some(&"alice".to_owned()));
    assert_eq!(h.out.types.last(), Some(&1.0));
}

#[test]
fn history_not_found_publishes_empty_immediately() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), true);
    h.bring_up(0);
    h.svc.on_status(status(true, false));
    h.tick(400);
    h.svc.on_history(record(HistoryResult::NotFound, 0, ""));
    h.tick(500);
    assert_eq!(h.out.states.last(), Some(&LockState::Locked));
    assert_eq!(h.out.tags.last(), Some(&String::new()));
    assert!(h.out.types.last().is_some_and(|t| t.is_nan()));
    // Definitive answer: no retry issued.
    h.tick(1_500);
    assert_eq!(h.session.history_requests, 1);
}

#[test]
fn refused_history_request_publishes_immediately() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), true);
    h.bring_up(0);
    h.session.history_accepted = false;
    h.svc.on_status(status(true, false));
    h.tick(400);
    assert_eq!(h.out.states.last(), Some(&LockState::Locked));
    assert_eq!(h.out.tags.last(), None);
}

#[test]
fn transient_history_failure_retries_after_backoff() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), true);
    h.bring_up(0);
    h.svc.on_status(status(true, false));
    h.tick(400);
    assert_eq!(h.session.history_requests, 1);

    h.svc.on_history(record(HistoryResult::Other, 0, ""));
    h.tick(500);
    // Backoff (300 ms) not elapsed yet.
    h.tick(700);
    assert_eq!(h.session.history_requests, 1);
    h.tick(900);
    assert_eq!(h.session.history_requests, 2);
}

#[test]
fn history_timeout_publishes_without_attribution() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), true);
    h.bring_up(0);
    h.svc.on_status(status(true, false));
    h.tick(400); // history requested at t=400
    h.tick(3_000);
    assert!(h.out.states.iter().all(|s| *s != LockState::Locked));
    h.tick(3_600);
    assert_eq!(h.out.states.last(), Some(&LockState::Locked));
    assert_eq!(h.out.tags.last(), Some(&String::new()));
}

#[test]
fn ambiguous_flags_debounce_into_jammed() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    h.bring_up(0);
    h.svc.on_status(status(false, true));
    h.tick(400);
    assert_eq!(h.out.states.last(), Some(&LockState::Unlocked));

    h.svc.on_status(status(true, true));
    h.tick(500);
    h.tick(2_000);
    assert_eq!(h.out.states.last(), Some(&LockState::Unlocked));
    h.tick(3_600);
    assert_eq!(h.out.states.last(), Some(&LockState::Jammed));
}

#[test]
fn critical_flag_jams_without_debounce() {
    let mut h = Harness::new(LockConfig::for_model(LockModel::Sesame5), false);
    h.bring_up(0);
    let mut s = status(true, true);
    s.is_critical = Some(true);
    h.svc.on_status(s);
    h.tick(400);
    assert_eq!(h.out.states.last(), Some(&LockState::Jammed));
}

#[test]
fn stale_telemetry_forces_fallback_publish() {
    let config = LockConfig {
        unknown_state_alternative: LockState::Locked,
        ..LockConfig::for_model(LockModel::Sesame5)
    };
    let mut h = Harness::new(config, false);
    h.bring_up(0);
    h.svc.on_status(status(false, true));
    h.tick(400);
    assert_eq!(h.out.states.last(), Some(&LockState::Unlocked));

    // The session drops: telemetry is cleared, the watchdog arms on the
    // next tick that sees it absent.
    h.svc.on_session_state(SessionState::Idle);
    h.tick(500);
    assert_eq!(h.svc.connection_state(), StateId::NotConnected);
    h.tick(600);

    h.tick(20_000);
    assert_eq!(h.out.states.last(), Some(&LockState::Unlocked));
    h.tick(21_000);
    assert_eq!(h.out.states.last(), Some(&LockState::Locked));
    assert_eq!(h.svc.lock_state(), LockState::Unknown);
    assert_eq!(h.out.tags.last(), Some(&String::new()));
}

#[test]
fn setup_failure_marks_the_instance_failed() {
    let mut svc = LockService::new(
        LockId(0),
        "lock",
        LockConfig::for_model(LockModel::Sesame5),
        Arc::new(ConnectArbiter::new()),
        false,
        "home",
    )
    .expect("construction");
    let mut session = MockSession::new();
    session.begin_result = Err(sesamelink::SetupError::InvalidKeys);
    let mut out = MockOut::default();
    assert!(svc.setup(0, &mut session, &mut out).is_err());
    assert!(svc.is_failed());
    // Nothing was published for a dead instance.
    assert!(out.states.is_empty());
    assert!(out.connected.is_empty());
}

#[test]
fn failed_instance_refuses_everything() {
    let config = LockConfig {
        connect_retry_limit: 1,
        ..LockConfig::for_model(LockModel::Sesame5)
    };
    let mut h = Harness::new(config, false);
    h.tick(0);
    h.tick(100);
    h.svc.on_connect_result(false);
    h.tick(200);
    h.tick(300);
    assert_eq!(h.svc.connection_state(), StateId::WaitReboot);
    h.tick(5_400);
    assert!(h.svc.is_failed());

    let locks_before = h.session.lock_calls.len();
    h.svc.handle_command(LockCommand::Lock, &mut h.session);
    assert_eq!(h.session.lock_calls.len(), locks_before);
}
