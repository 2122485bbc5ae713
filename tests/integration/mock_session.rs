//! Recording test doubles for the session port and the outbound sinks.

use sesamelink::app::events::AppEvent;
use sesamelink::app::ports::{
    EventSink, SessionPort, StateSink, TelemetrySink, TriggerClass, TriggerClassifier,
};
use sesamelink::lock::LockState;
use sesamelink::SetupError;

/// Scriptable session client that records every call.
pub struct MockSession {
    pub begin_result: Result<(), SetupError>,
    pub server_up: bool,
    pub history_accepted: bool,
    pub connects: u32,
    pub disconnects: u32,
    pub server_disconnects: u32,
    pub history_requests: u32,
    pub status_requests: u32,
    pub lock_calls: Vec<String>,
    pub unlock_calls: Vec<String>,
    pub click_calls: Vec<String>,
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            begin_result: Ok(()),
            server_up: false,
            history_accepted: true,
            connects: 0,
            disconnects: 0,
            server_disconnects: 0,
            history_requests: 0,
            status_requests: 0,
            lock_calls: Vec::new(),
            unlock_calls: Vec::new(),
            click_calls: Vec::new(),
        }
    }
}

impl SessionPort for MockSession {
    fn begin(&mut self) -> Result<(), SetupError> {
        self.begin_result
    }

    fn connect_async(&mut self) {
        self.connects += 1;
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }

    fn server_connected(&self) -> bool {
        self.server_up
    }

    fn disconnect_server(&mut self) {
        self.server_disconnects += 1;
    }

    fn lock(&mut self, tag: &str) {
        self.lock_calls.push(tag.to_owned());
    }

    fn unlock(&mut self, tag: &str) {
        self.unlock_calls.push(tag.to_owned());
    }

    fn click(&mut self, tag: &str) {
        self.click_calls.push(tag.to_owned());
    }

    fn request_history(&mut self) -> bool {
        self.history_requests += 1;
        self.history_accepted
    }

    fn request_status(&mut self) {
        self.status_requests += 1;
    }
}

/// Combined recording sink for states, telemetry and events.
#[derive(Default)]
pub struct MockOut {
    pub states: Vec<LockState>,
    pub tags: Vec<String>,
    pub types: Vec<f32>,
    pub battery_pct: Vec<f32>,
    pub battery_volts: Vec<f32>,
    pub connected: Vec<bool>,
    pub events: Vec<AppEvent>,
}

impl StateSink for MockOut {
    fn publish_lock_state(&mut self, state: LockState) {
        self.states.push(state);
    }

    fn publish_history_tag(&mut self, tag: &str) {
        self.tags.push(tag.to_owned());
    }

    fn publish_history_type(&mut self, type_code: f32) {
        self.types.push(type_code);
    }
}

impl TelemetrySink for MockOut {
    fn publish_battery_pct(&mut self, pct: f32) {
        self.battery_pct.push(pct);
    }

    fn publish_battery_voltage(&mut self, volts: f32) {
        self.battery_volts.push(volts);
    }

    fn publish_connected(&mut self, connected: bool) {
        self.connected.push(connected);
    }
}

impl EventSink for MockOut {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(*event);
    }
}

/// Fixed trigger-code table used across the scenarios.
pub struct TestClassifier;

impl TriggerClassifier for TestClassifier {
    fn classify(&self, type_code: u8) -> TriggerClass {
        match type_code {
            1 => TriggerClass::LockEvent,
            2 => TriggerClass::UnlockEvent,
            3 => TriggerClass::DriveOriginated,
            _ => TriggerClass::Other,
        }
    }
}
