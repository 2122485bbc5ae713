//! SesameLink — SESAME smart-lock BLE lifecycle manager.
//!
//! Owns one physical lock's connection lifecycle (connect → authenticate →
//! run, with reboot-on-stuck escalation), the arbitration of a single shared
//! BLE radio between multiple lock instances, and the derived lock / jam /
//! history state machine layered on top of asynchronous status reports.
//!
//! The encrypted session protocol and the BLE transport are external
//! collaborators consumed through the port traits in [`app::ports`]; platform
//! adapters (ESP-IDF BLE bindings, reboot hook) live outside this crate.
//! Everything here runs on the host for testing.

#![deny(unused_must_use)]

pub mod app;
pub mod arbiter;
pub mod config;
pub mod fsm;
pub mod lock;
pub mod model;
pub mod scheduler;

mod error;

pub use error::{Error, Result, SetupError};
