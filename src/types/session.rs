//! Session lifecycle state and source-reported session metadata

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the local driver's logging session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No source
    Idle,
    /// Source available, no session metadata seen yet
    Detected,
    /// Buffering laps
    Logging,
    /// Logging suspended by request; the open lap is kept
    Paused,
    /// Source failed; waiting for it to go away or recover
    Error,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Detected => "detected",
            SessionState::Logging => "logging",
            SessionState::Paused => "paused",
            SessionState::Error => "error",
        }
    }

    /// States in which a session id exists
    pub fn has_session(self) -> bool {
        matches!(self, SessionState::Logging | SessionState::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive session metadata reported by the source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSessionInfo {
    pub player: String,
    pub track: String,
    pub car: String,
    /// Practice, Qualifying, Race...
    pub session_type: String,
    /// Track length (m)
    pub track_length: Option<f64>,
    /// Vehicle entry name used to look up enrichment data
    pub vehicle_name: Option<String>,
    pub weather: Option<String>,
    /// Track temperature (C)
    pub track_temp: Option<f64>,
    /// Ambient temperature (C)
    pub ambient_temp: Option<f64>,
    pub tyre_compound: Option<String>,
}

impl SourceSessionInfo {
    /// Metadata is usable once the source names a track.
    pub fn is_valid(&self) -> bool {
        !self.track.trim().is_empty()
    }

    /// Whether `other` describes the same session (same track, session
    /// type, driver and car).
    pub fn same_session(&self, other: &SourceSessionInfo) -> bool {
        self.track == other.track
            && self.session_type == other.session_type
            && self.player == other.player
            && self.car == other.car
    }
}
