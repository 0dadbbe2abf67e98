//! Status stream for hosts
//!
//! Every lifecycle change, recorded lap and dropped lap is reported here so
//! a UI can show what the logger is doing without polling it.

use std::path::PathBuf;

use serde::Serialize;

use crate::types::{DiscardReason, SessionState, VehicleIdentity};

/// Something the logger did or could not do
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoggerEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    SessionStarted {
        session_id: String,
        track: String,
        car: String,
        player: String,
    },
    SessionEnded {
        session_id: String,
    },
    /// The local driver crossed the line; the record is being written
    LapCompleted {
        lap: u32,
        lap_time: Option<f64>,
        samples: usize,
        partial: bool,
    },
    /// A local lap record was persisted
    LapRecorded {
        lap: u32,
        path: PathBuf,
    },
    /// A lap was closed without being recorded
    LapDiscarded {
        lap: u32,
        samples: usize,
        reason: DiscardReason,
    },
    /// A lap could not be persisted and was given up on
    LapDropped {
        lap: u32,
        reason: String,
    },
    /// A source sample was rejected
    SampleSkipped {
        reason: String,
    },
    /// A competitor set a new best lap
    OpponentBest {
        identity: VehicleIdentity,
        lap: u32,
        lap_time: f64,
        previous: Option<f64>,
    },
    /// A competitor's best lap record was persisted
    OpponentRecorded {
        identity: VehicleIdentity,
        path: PathBuf,
    },
    EnrichmentFailed {
        reason: String,
    },
    /// Reads keep failing
    SourceError {
        reason: String,
        consecutive: u32,
    },
    /// Storage rejected a write after every retry
    StorageFault {
        reason: String,
    },
}

impl LoggerEvent {
    /// Whether a host should surface this event as a problem
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            LoggerEvent::LapDropped { .. }
                | LoggerEvent::EnrichmentFailed { .. }
                | LoggerEvent::SourceError { .. }
                | LoggerEvent::StorageFault { .. }
        )
    }
}
