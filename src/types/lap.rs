//! Lap buffers and completed laps

use std::fmt;

use serde::{Deserialize, Serialize};

use super::NormalizedSample;

/// Ordered, append-only samples for one lap attempt by one vehicle.
///
/// Only the owning tracker can append. Once a buffer is handed out it can be
/// read or consumed, never extended.
#[derive(Debug, Clone, PartialEq)]
pub struct LapBuffer<T = NormalizedSample> {
    lap_number: u32,
    samples: Vec<T>,
}

impl<T> LapBuffer<T> {
    pub(crate) fn new(lap_number: u32) -> Self {
        Self { lap_number, samples: Vec::new() }
    }

    pub(crate) fn push(&mut self, sample: T) {
        self.samples.push(sample);
    }

    /// Lap counter value shared by every sample in the buffer
    pub fn lap_number(&self) -> u32 {
        self.lap_number
    }

    /// Samples in arrival order
    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<T> {
        self.samples
    }
}

impl LapBuffer<NormalizedSample> {
    /// Build a closed buffer from already collected samples.
    pub fn from_samples(lap_number: u32, samples: Vec<NormalizedSample>) -> Self {
        Self { lap_number, samples }
    }
}

/// A closed lap plus its lap time.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedLap {
    buffer: LapBuffer,
    lap_time: Option<f64>,
}

impl CompletedLap {
    /// Close a buffer. The lap time is the largest elapsed lap time any
    /// sample reported, which tolerates out-of-order delivery.
    pub fn from_buffer(buffer: LapBuffer) -> Self {
        let lap_time = buffer
            .samples()
            .iter()
            .filter_map(|s| s.lap_time)
            .filter(|t| t.is_finite())
            .reduce(f64::max);
        Self { buffer, lap_time }
    }

    pub fn lap_number(&self) -> u32 {
        self.buffer.lap_number()
    }

    pub fn lap_time(&self) -> Option<f64> {
        self.lap_time
    }

    pub fn buffer(&self) -> &LapBuffer {
        &self.buffer
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_buffer(self) -> LapBuffer {
        self.buffer
    }
}

/// Why a lap never reached the formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// The lap counter went backwards
    CounterReset,
    /// The source disappeared or failed mid-lap
    SourceLost,
    /// Track, car, driver or session type changed mid-lap
    SessionChanged,
    /// The logger stopped
    Shutdown,
    /// The lap ended while logging was paused, so its samples are incomplete
    Interrupted,
    /// A competitor lap without a usable lap time
    NoLapTime,
}

impl DiscardReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscardReason::CounterReset => "lap counter reset",
            DiscardReason::SourceLost => "source lost",
            DiscardReason::SessionChanged => "session changed",
            DiscardReason::Shutdown => "shutdown",
            DiscardReason::Interrupted => "interrupted by pause",
            DiscardReason::NoLapTime => "no lap time",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
