//! Test doubles and sample builders shared by unit tests and benches

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::broadcast;

use crate::enrichment::{Enrichment, EnrichmentData};
use crate::events::LoggerEvent;
use crate::sink::{RecordDescriptor, RecordSink};
use crate::source::{TelemetrySource, VehicleSnapshot};
use crate::types::{ControlClass, NormalizedSample, RawSample, SourceSessionInfo, VehicleIdentity};
use crate::{LoggerError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// 2025-01-01T00:00:00Z
pub fn test_utc() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default()
}

/// Normalized sample with only lap number and distance set
pub fn sample(lap: u32, distance: f64) -> NormalizedSample {
    NormalizedSample { lap_number: Some(lap), lap_distance: Some(distance), ..Default::default() }
}

/// Raw sample with lap number, distance, lap time and plausible channels
pub fn raw_sample(lap: u32, distance: f64, lap_time: f64) -> RawSample {
    RawSample {
        lap_number: Some(lap),
        lap_distance: Some(distance),
        lap_time: Some(lap_time),
        speed: Some(200.0),
        engine_rpm: Some(7000.0),
        throttle: Some(1.0),
        brake: Some(0.0),
        steering: Some(0.0),
        gear: Some(5),
        ..Default::default()
    }
}

pub fn session_info(track: &str) -> SourceSessionInfo {
    SourceSessionInfo {
        player: "Test Driver".to_string(),
        track: track.to_string(),
        car: "Test Car".to_string(),
        session_type: "Practice".to_string(),
        track_length: Some(5000.0),
        ..Default::default()
    }
}

pub fn vehicle(driver: &str, control: ControlClass, sample: RawSample) -> VehicleSnapshot {
    VehicleSnapshot::new(VehicleIdentity::new(driver, control), "Test Car", sample)
}

/// Everything currently queued on a broadcast receiver
pub fn drain(events: &mut broadcast::Receiver<LoggerEvent>) -> Vec<LoggerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// What a [`ScriptedSource`] does on one tick
#[derive(Debug, Clone)]
pub enum Frame {
    Unavailable,
    ReadError,
    Sample { sample: RawSample, info: SourceSessionInfo, vehicles: Vec<VehicleSnapshot> },
}

impl Frame {
    pub fn sample(sample: RawSample, info: SourceSessionInfo) -> Self {
        Frame::Sample { sample, info, vehicles: Vec::new() }
    }

    pub fn with_vehicles(self, list: Vec<VehicleSnapshot>) -> Self {
        match self {
            Frame::Sample { sample, info, .. } => Frame::Sample { sample, info, vehicles: list },
            other => other,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    frames: VecDeque<Frame>,
    info: SourceSessionInfo,
    vehicles: Vec<VehicleSnapshot>,
    vehicles_fail: bool,
}

/// Source that replays queued frames, one per tick. An empty queue reads
/// as an unavailable source. Clones share the queue.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        lock(&self.script).frames.push_back(frame);
    }

    /// Make the vehicle list fail to read until switched back.
    pub fn fail_vehicles(&self, fail: bool) {
        lock(&self.script).vehicles_fail = fail;
    }

    pub fn pending(&self) -> usize {
        lock(&self.script).frames.len()
    }
}

#[async_trait::async_trait]
impl TelemetrySource for ScriptedSource {
    async fn is_available(&mut self) -> bool {
        let mut script = lock(&self.script);
        match script.frames.front() {
            None => false,
            Some(Frame::Unavailable) => {
                script.frames.pop_front();
                false
            }
            Some(_) => true,
        }
    }

    async fn read(&mut self) -> Result<Option<RawSample>> {
        let mut script = lock(&self.script);
        match script.frames.pop_front() {
            Some(Frame::Sample { sample, info, vehicles }) => {
                script.info = info;
                script.vehicles = vehicles;
                Ok(Some(sample))
            }
            Some(Frame::ReadError) => Err(LoggerError::source_read_failed("scripted read error")),
            Some(Frame::Unavailable) | None => Ok(None),
        }
    }

    async fn session_info(&mut self) -> Result<SourceSessionInfo> {
        Ok(lock(&self.script).info.clone())
    }

    async fn vehicles(&mut self) -> Result<Vec<VehicleSnapshot>> {
        let script = lock(&self.script);
        if script.vehicles_fail {
            return Err(LoggerError::source_read_failed("scripted vehicle list error"));
        }
        Ok(script.vehicles.clone())
    }
}

#[derive(Debug, Default)]
struct SinkState {
    records: Vec<(RecordDescriptor, String)>,
    fail_next: usize,
}

/// In-memory sink. Clones share the stored records.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    /// Make the next `n` writes fail with a retryable error.
    pub fn fail_next(&self, n: usize) {
        lock(&self.state).fail_next = n;
    }

    pub fn records(&self) -> Vec<(RecordDescriptor, String)> {
        lock(&self.state).records.clone()
    }
}

#[async_trait::async_trait]
impl RecordSink for MemorySink {
    async fn write(&mut self, descriptor: &RecordDescriptor, contents: &str) -> Result<PathBuf> {
        let mut state = lock(&self.state);
        let path = PathBuf::from(format!("memory/{}", state.records.len()));
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(LoggerError::write_error(path, std::io::Error::other("injected failure")));
        }
        state.records.push((descriptor.clone(), contents.to_string()));
        Ok(path)
    }
}

#[derive(Debug, Default)]
struct EnrichmentState {
    tracks: Vec<String>,
    fail: bool,
}

/// Enrichment that remembers every lookup
#[derive(Debug, Clone, Default)]
pub struct CountingEnrichment {
    state: Arc<Mutex<EnrichmentState>>,
}

impl CountingEnrichment {
    pub fn fail(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }

    pub fn calls(&self) -> usize {
        lock(&self.state).tracks.len()
    }

    pub fn tracks(&self) -> Vec<String> {
        lock(&self.state).tracks.clone()
    }
}

#[async_trait::async_trait]
impl Enrichment for CountingEnrichment {
    async fn fetch(&mut self, track: &str) -> Result<EnrichmentData> {
        let mut state = lock(&self.state);
        state.tracks.push(track.to_string());
        if state.fail {
            return Err(LoggerError::enrichment_unavailable("scripted failure"));
        }
        Ok(EnrichmentData { track_map: vec![[0.0, 0.0], [10.0, 5.0]], ..Default::default() })
    }
}
