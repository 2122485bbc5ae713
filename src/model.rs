//! Device model vocabulary and capability descriptors.
//!
//! The SESAME product line spans plain locks, momentary "bot" actuators and
//! sensor-only devices. Behavioural differences are expressed through one
//! capability table keyed by model, so the state machine never branches on a
//! concrete model name.

use serde::{Deserialize, Serialize};

/// Supported SESAME device models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockModel {
    Sesame3,
    Sesame4,
    Sesame5,
    Sesame5Pro,
    SesameBot,
    SesameBot2,
    SesameBike,
    SesameBike2,
    SesameTouch,
    SesameTouchPro,
    OpenSensor,
}

/// How history records are correlated with state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistorySemantics {
    /// Accept any record that did not originate from the drive mechanism.
    Simple,
    /// Require the record's trigger class to match the target lock state.
    Correlated,
}

/// Static capability descriptor for one model.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Momentary "click" actuation (bots) vs. plain lock/unlock.
    pub supports_click: bool,
    /// Reports an explicit hardware `is_critical` fault flag.
    pub supports_critical_flag: bool,
    /// Can hold a lock entity at all (sensors and touch pads cannot).
    pub lockable: bool,
    /// History correlation mode for this model family.
    pub history_semantics: HistorySemantics,
}

impl LockModel {
    /// Look up the capability descriptor for this model.
    pub const fn capabilities(self) -> Capabilities {
        match self {
            Self::Sesame3 | Self::Sesame4 => Capabilities {
                supports_click: false,
                supports_critical_flag: false,
                lockable: true,
                history_semantics: HistorySemantics::Correlated,
            },
            Self::Sesame5 | Self::Sesame5Pro | Self::SesameBike2 => Capabilities {
                supports_click: false,
                supports_critical_flag: true,
                lockable: true,
                history_semantics: HistorySemantics::Correlated,
            },
            Self::SesameBot | Self::SesameBot2 => Capabilities {
                supports_click: true,
                supports_critical_flag: false,
                lockable: true,
                history_semantics: HistorySemantics::Simple,
            },
            Self::SesameBike => Capabilities {
                supports_click: false,
                supports_critical_flag: false,
                lockable: true,
                history_semantics: HistorySemantics::Simple,
            },
            Self::SesameTouch | Self::SesameTouchPro | Self::OpenSensor => Capabilities {
                supports_click: false,
                supports_critical_flag: false,
                lockable: false,
                history_semantics: HistorySemantics::Simple,
            },
        }
    }

    /// Short display name used in log lines.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sesame3 => "SESAME 3",
            Self::Sesame4 => "SESAME 4",
            Self::Sesame5 => "SESAME 5",
            Self::Sesame5Pro => "SESAME 5 PRO",
            Self::SesameBot => "SESAME bot",
            Self::SesameBot2 => "SESAME bot 2",
            Self::SesameBike => "SESAME bike",
            Self::SesameBike2 => "SESAME bike 2",
            Self::SesameTouch => "SESAME Touch",
            Self::SesameTouchPro => "SESAME Touch PRO",
            Self::OpenSensor => "Open Sensor",
        }
    }
}
