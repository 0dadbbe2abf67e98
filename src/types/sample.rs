//! Raw and normalized telemetry samples
//!
//! Every numeric channel is an `Option`: `None` means the source did not
//! report the value, which is distinct from a real zero reading.

use serde::{Deserialize, Serialize};

/// World position in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl Position {
    /// Position with all three axes known.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x: Some(x), y: Some(y), z: Some(z) }
    }
}

/// Scale the source uses for pedal and steering inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputScale {
    /// Pedals 0..1, steering -1..1
    #[default]
    Fraction,
    /// Pedals 0..100, steering -100..100
    Percent,
    /// Decide per value: magnitudes up to [`InputScale::AUTO_FRACTION_CEILING`]
    /// are read as fractions, anything larger as percentages.
    Auto,
}

impl InputScale {
    /// Largest magnitude `Auto` still treats as a fraction.
    pub const AUTO_FRACTION_CEILING: f64 = 1.5;

    /// Resolve `Auto` for a concrete value.
    pub fn resolve(self, value: f64) -> InputScale {
        match self {
            InputScale::Auto if value.abs() <= Self::AUTO_FRACTION_CEILING => InputScale::Fraction,
            InputScale::Auto => InputScale::Percent,
            other => other,
        }
    }
}

/// Snapshot of one vehicle's instantaneous state as produced by a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSample {
    /// Lap counter as labelled by the source
    pub lap_number: Option<u32>,
    /// Distance into the current lap (m)
    pub lap_distance: Option<f64>,
    /// Time since the current lap started (s)
    pub lap_time: Option<f64>,
    /// Zero-based sector index
    pub sector: Option<u32>,
    /// Speed (km/h)
    pub speed: Option<f64>,
    /// Engine speed (rpm)
    pub engine_rpm: Option<f64>,
    /// Throttle in source-native scale
    pub throttle: Option<f64>,
    /// Brake in source-native scale
    pub brake: Option<f64>,
    /// Steering in source-native scale
    pub steering: Option<f64>,
    /// Gear, -1 reverse, 0 neutral
    pub gear: Option<i32>,
    pub position: Position,
    /// Track length (m), used to estimate the sector when the source omits it
    pub track_length: Option<f64>,
}

/// A sample after unit and scale normalization.
///
/// Inputs are percentages, distances meters, times seconds. Integer channels
/// stay integers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSample {
    pub lap_number: Option<u32>,
    pub lap_distance: Option<f64>,
    pub lap_time: Option<f64>,
    pub sector: Option<u32>,
    pub speed: Option<f64>,
    pub engine_rpm: Option<f64>,
    /// 0..100
    pub throttle: Option<f64>,
    /// 0..100
    pub brake: Option<f64>,
    /// -100..100
    pub steering: Option<f64>,
    pub gear: Option<i32>,
    pub position: Position,
}
