//! Simulated source for development without the simulator
//!
//! A car laps a circular circuit at constant pace. Every value is a pure
//! function of the time elapsed on the injected [`Clock`], so a test that
//! steps a [`ManualClock`](crate::clock::ManualClock) gets the same laps on
//! every run.

use std::f64::consts::TAU;
use std::time::Instant;

use crate::Result;
use crate::clock::Clock;
use crate::source::{TelemetrySource, VehicleSnapshot};
use crate::types::{ControlClass, Position, RawSample, SourceSessionInfo, VehicleIdentity};

pub const DEFAULT_TRACK: &str = "Bahrain International Circuit";
pub const DEFAULT_TRACK_LENGTH: f64 = 5386.80;
pub const DEFAULT_PLAYER: &str = "Dev User";
pub const DEFAULT_CAR: &str = "Toyota GR010";
/// Average pace of the local car (m/s)
pub const DEFAULT_PACE: f64 = 70.0;

const CENTER_X: f64 = -269.26;
const CENTER_Z: f64 = -218.97;
const ELEVATION: f64 = 7.30;
const RADIUS: f64 = 1000.0;

/// A simulated competitor
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedCompetitor {
    pub driver: String,
    pub car: String,
    pub control: ControlClass,
    /// Pace (m/s)
    pub pace: f64,
    /// Distance ahead of the start line when the source starts (m)
    pub head_start: f64,
}

impl SimulatedCompetitor {
    pub fn new(driver: impl Into<String>, control: ControlClass, pace: f64) -> Self {
        Self { driver: driver.into(), car: DEFAULT_CAR.to_string(), control, pace, head_start: 0.0 }
    }

    pub fn with_head_start(mut self, meters: f64) -> Self {
        self.head_start = meters;
        self
    }
}

/// Deterministic lapping car, optionally with competitors.
#[derive(Debug, Clone)]
pub struct SimulatedSource<C> {
    clock: C,
    started: Instant,
    info: SourceSessionInfo,
    pace: f64,
    competitors: Vec<SimulatedCompetitor>,
}

impl<C: Clock> SimulatedSource<C> {
    pub fn new(clock: C) -> Self {
        let started = clock.now();
        let info = SourceSessionInfo {
            player: DEFAULT_PLAYER.to_string(),
            track: DEFAULT_TRACK.to_string(),
            car: DEFAULT_CAR.to_string(),
            session_type: "Practice".to_string(),
            track_length: Some(DEFAULT_TRACK_LENGTH),
            vehicle_name: Some(DEFAULT_CAR.to_string()),
            weather: Some("Clear".to_string()),
            track_temp: Some(41.80),
            ambient_temp: Some(24.02),
            tyre_compound: None,
        };
        Self { clock, started, info, pace: DEFAULT_PACE, competitors: Vec::new() }
    }

    /// Lap a different circuit.
    pub fn with_track(mut self, name: impl Into<String>, length: f64) -> Self {
        self.info.track = name.into();
        self.info.track_length = Some(length);
        self
    }

    pub fn with_pace(mut self, pace: f64) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_competitor(mut self, competitor: SimulatedCompetitor) -> Self {
        self.competitors.push(competitor);
        self
    }

    pub fn track_length(&self) -> f64 {
        self.info.track_length.unwrap_or(DEFAULT_TRACK_LENGTH)
    }

    /// Lap time of the local car (s)
    pub fn lap_duration(&self) -> f64 {
        self.track_length() / self.pace
    }

    fn elapsed(&self) -> f64 {
        self.clock.now().saturating_duration_since(self.started).as_secs_f64()
    }

    fn sample_at(&self, distance: f64, pace: f64) -> RawSample {
        let length = self.track_length();
        let completed = (distance / length).floor();
        let lap_distance = distance - completed * length;
        let lap_time = lap_distance / pace;

        let variation = (lap_distance / 1000.0).sin() * 20.0;
        let speed = 256.0 + variation;
        let angle = lap_distance / length * TAU;

        RawSample {
            lap_number: Some(completed as u32 + 1),
            lap_distance: Some(lap_distance),
            lap_time: Some(lap_time),
            sector: None,
            speed: Some(speed),
            engine_rpm: Some(7267.0 + variation * 10.0),
            throttle: Some(if speed > 200.0 { 1.0 } else { 0.55 }),
            brake: Some(if speed < 180.0 { 0.08 } else { 0.0 }),
            steering: Some(lap_time.sin() * 0.35),
            gear: Some(6),
            position: Position::new(CENTER_X + RADIUS * angle.cos(), ELEVATION, CENTER_Z + RADIUS * angle.sin()),
            track_length: Some(length),
        }
    }
}

#[async_trait::async_trait]
impl<C: Clock> TelemetrySource for SimulatedSource<C> {
    async fn is_available(&mut self) -> bool {
        true
    }

    async fn read(&mut self) -> Result<Option<RawSample>> {
        Ok(Some(self.sample_at(self.elapsed() * self.pace, self.pace)))
    }

    async fn session_info(&mut self) -> Result<SourceSessionInfo> {
        Ok(self.info.clone())
    }

    async fn vehicles(&mut self) -> Result<Vec<VehicleSnapshot>> {
        let elapsed = self.elapsed();
        let local = VehicleSnapshot::new(
            VehicleIdentity::new(&self.info.player, ControlClass::Local),
            &self.info.car,
            self.sample_at(elapsed * self.pace, self.pace),
        );

        let competitors = self.competitors.iter().map(|c| {
            VehicleSnapshot::new(
                VehicleIdentity::new(&c.driver, c.control),
                &c.car,
                self.sample_at(c.head_start + elapsed * c.pace, c.pace),
            )
        });

        Ok(std::iter::once(local).chain(competitors).collect())
    }
}
