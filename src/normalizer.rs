//! Raw snapshot to canonical sample conversion
//!
//! [`SampleNormalizer::normalize`] is total: non-finite or missing values
//! become `None`, never zero. [`SampleNormalizer::validate`] is the separate
//! gate that decides whether a sample is usable at all.

use crate::types::{InputScale, NormalizedSample, Position, RawSample};
use crate::{LoggerError, Result};

/// Number of timing sectors assumed when estimating from track length
pub const SECTOR_COUNT: u32 = 3;

/// Converts raw source snapshots into canonical samples
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleNormalizer {
    input_scale: InputScale,
}

impl SampleNormalizer {
    pub fn new(input_scale: InputScale) -> Self {
        Self { input_scale }
    }

    pub fn input_scale(&self) -> InputScale {
        self.input_scale
    }

    /// Normalize a raw snapshot.
    pub fn normalize(&self, raw: &RawSample) -> NormalizedSample {
        let lap_distance = finite(raw.lap_distance);

        NormalizedSample {
            lap_number: raw.lap_number,
            lap_distance,
            lap_time: finite(raw.lap_time),
            sector: raw.sector.or_else(|| estimate_sector(lap_distance, finite(raw.track_length))),
            speed: finite(raw.speed),
            engine_rpm: finite(raw.engine_rpm),
            throttle: finite(raw.throttle).map(|v| pedal_percent(v, self.input_scale)),
            brake: finite(raw.brake).map(|v| pedal_percent(v, self.input_scale)),
            steering: finite(raw.steering).map(|v| steering_percent(v, self.input_scale)),
            gear: raw.gear,
            position: Position {
                x: finite(raw.position.x),
                y: finite(raw.position.y),
                z: finite(raw.position.z),
            },
        }
    }

    /// Reject samples that must not reach any lap buffer.
    ///
    /// A sample needs a lap number, and any channel it does report must be a
    /// finite number.
    pub fn validate(raw: &RawSample) -> Result<()> {
        if raw.lap_number.is_none() {
            return Err(LoggerError::malformed_sample("lap_number", "missing"));
        }

        let channels = [
            ("lap_distance", raw.lap_distance),
            ("lap_time", raw.lap_time),
            ("speed", raw.speed),
            ("engine_rpm", raw.engine_rpm),
            ("throttle", raw.throttle),
            ("brake", raw.brake),
            ("steering", raw.steering),
            ("position_x", raw.position.x),
            ("position_y", raw.position.y),
            ("position_z", raw.position.z),
        ];

        for (name, value) in channels {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(LoggerError::malformed_sample(name, format!("non-finite value {v}")));
                }
            }
        }

        if let Some(t) = raw.lap_time {
            if t < 0.0 {
                return Err(LoggerError::malformed_sample("lap_time", format!("negative value {t}")));
            }
        }

        Ok(())
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn pedal_percent(value: f64, scale: InputScale) -> f64 {
    let percent = match scale.resolve(value) {
        InputScale::Percent => value,
        _ => value * 100.0,
    };
    percent.clamp(0.0, 100.0)
}

fn steering_percent(value: f64, scale: InputScale) -> f64 {
    let percent = match scale.resolve(value) {
        InputScale::Percent => value,
        _ => value * 100.0,
    };
    percent.clamp(-100.0, 100.0)
}

fn estimate_sector(lap_distance: Option<f64>, track_length: Option<f64>) -> Option<u32> {
    let (distance, length) = (lap_distance?, track_length?);
    if length <= 0.0 {
        return None;
    }
    let fraction = (distance / length).max(0.0);
    // Saturating float-to-int cast; the min() keeps the last sector inclusive.
    Some(((fraction * SECTOR_COUNT as f64) as u32).min(SECTOR_COUNT - 1))
}
