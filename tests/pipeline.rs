//! End-to-end tests of the poll loop against a temporary output directory.
//!
//! The loop runs on its own task, paced by a `ManualTicker`; each test
//! scripts what the source reports on every tick.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{TimeZone, Utc};
use laplog::{
    ControlClass, DiscardReason, Driver, DriverHandle, Enrichment, EnrichmentData, FileSink, LapPolicy, LoggerConfig,
    LoggerError, LoggerEvent, ManualClock, ManualTicker, Pipeline, RawSample, SessionState, SourceSessionInfo,
    TelemetrySource, TickHandle, VehicleIdentity, VehicleSnapshot,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

enum Tick {
    Gone,
    Sample(RawSample, SourceSessionInfo, Vec<VehicleSnapshot>),
}

#[derive(Clone, Default)]
struct Script {
    ticks: Arc<Mutex<VecDeque<Tick>>>,
    current: Arc<Mutex<Option<(SourceSessionInfo, Vec<VehicleSnapshot>)>>>,
}

impl Script {
    fn push(&self, tick: Tick) {
        self.ticks.lock().unwrap().push_back(tick);
    }

    fn lap(&self, track: &str, lap: u32, time: f64) {
        for (distance, t) in [(10.0, 1.0), (2500.0, time / 2.0), (4990.0, time)] {
            self.push(Tick::Sample(sample(lap, distance, t), info(track), Vec::new()));
        }
    }
}

#[async_trait::async_trait]
impl TelemetrySource for Script {
    async fn is_available(&mut self) -> bool {
        let mut ticks = self.ticks.lock().unwrap();
        match ticks.front() {
            Some(Tick::Sample(..)) => true,
            Some(Tick::Gone) => {
                ticks.pop_front();
                false
            }
            None => false,
        }
    }

    async fn read(&mut self) -> laplog::Result<Option<RawSample>> {
        match self.ticks.lock().unwrap().pop_front() {
            Some(Tick::Sample(raw, info, vehicles)) => {
                *self.current.lock().unwrap() = Some((info, vehicles));
                Ok(Some(raw))
            }
            _ => Ok(None),
        }
    }

    async fn session_info(&mut self) -> laplog::Result<SourceSessionInfo> {
        let current = self.current.lock().unwrap();
        current.as_ref().map(|(info, _)| info.clone()).ok_or_else(|| LoggerError::source_unavailable("no session"))
    }

    async fn vehicles(&mut self) -> laplog::Result<Vec<VehicleSnapshot>> {
        Ok(self.current.lock().unwrap().as_ref().map(|(_, v)| v.clone()).unwrap_or_default())
    }
}

#[derive(Clone, Default)]
struct Lookups(Arc<Mutex<Vec<String>>>);

#[async_trait::async_trait]
impl Enrichment for Lookups {
    async fn fetch(&mut self, track: &str) -> laplog::Result<EnrichmentData> {
        self.0.lock().unwrap().push(track.to_string());
        Ok(EnrichmentData::default())
    }
}

fn sample(lap: u32, distance: f64, time: f64) -> RawSample {
    RawSample {
        lap_number: Some(lap),
        lap_distance: Some(distance),
        lap_time: Some(time),
        speed: Some(220.0),
        throttle: Some(0.75),
        brake: Some(0.6126),
        gear: Some(4),
        ..Default::default()
    }
}

fn info(track: &str) -> SourceSessionInfo {
    SourceSessionInfo {
        player: "Test Driver".into(),
        track: track.into(),
        car: "Test Car".into(),
        session_type: "Practice".into(),
        track_length: Some(5000.0),
        ..Default::default()
    }
}

struct Harness {
    handle: DriverHandle,
    ticks: TickHandle,
    script: Script,
    lookups: Lookups,
    events: broadcast::Receiver<LoggerEvent>,
    sink: FileSink,
    _dir: TempDir,
}

impl Harness {
    fn start(config: LoggerConfig) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let output_dir = dir.path().join("laps");
        Self::start_in(dir, LoggerConfig { output_dir, ..config })
    }

    fn start_in(dir: TempDir, config: LoggerConfig) -> Result<Self> {
        let script = Script::default();
        let lookups = Lookups::default();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());

        let pipeline = Pipeline::new(&config, script.clone(), lookups.clone(), config.file_sink(), clock);
        let events = pipeline.subscribe();
        let (ticker, ticks) = ManualTicker::new();
        let handle = Driver::spawn(pipeline, ticker);

        Ok(Self { handle, ticks, script, lookups, events, sink: config.file_sink(), _dir: dir })
    }

    /// Tick until the script is exhausted.
    async fn run(&self) {
        while !self.script.ticks.lock().unwrap().is_empty() {
            assert!(self.ticks.tick().await);
        }
    }

    fn events(&mut self) -> Vec<LoggerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

#[tokio::test]
async fn completed_laps_become_record_files() -> Result<()> {
    let mut harness = Harness::start(LoggerConfig::default())?;
    for lap in 1..=3 {
        harness.script.lap("Test Track", lap, 90.0 + lap as f64);
    }
    harness.script.push(Tick::Sample(sample(4, 0.0, 0.0), info("Test Track"), Vec::new()));
    harness.run().await;

    let records = harness.sink.list_records().await?;
    assert_eq!(records.len(), 3);
    assert!(records[0].starts_with("2025-01-01_00-00_Test_Track_Test_Car_Test_Driver_lap1_t91s_"));

    let contents = tokio::fs::read_to_string(harness.sink.output_dir().join(&records[0])).await?;
    let (preamble, table) = contents.split_once("\n\n").unwrap_or_default();
    assert!(preamble.starts_with("Format,LMUTelemetry v2\nVersion,1\nPlayer,Test Driver\nTrackName,Test Track\n"));
    assert!(preamble.contains("LapTime [s],91.000\n"));
    assert!(preamble.contains("\nLapNumber,1"));
    let rows: Vec<_> = table.lines().collect();
    assert!(rows[0].starts_with("LapDistance [m],LapTime [s],Sector [int]"));
    assert_eq!(rows.len(), 4);
    // Brake arrives as a fraction and is recorded as a percentage.
    assert!(rows[1].contains(",61.26,"));

    let session_id = harness.events().into_iter().find_map(|e| match e {
        LoggerEvent::SessionStarted { session_id, .. } => Some(session_id),
        _ => None,
    });
    assert_eq!(harness.sink.session_records(&session_id.unwrap_or_default()).await?.len(), 3);

    harness.handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn competitor_best_is_overwritten_only_by_faster_laps() -> Result<()> {
    let harness = Harness::start(LoggerConfig::default())?;
    let rival = |lap, distance, time| {
        vec![VehicleSnapshot::new(
            VehicleIdentity::new("X", ControlClass::RemoteHuman),
            "Rival Car",
            sample(lap, distance, time),
        )]
    };

    for (lap, time) in [(1, 129.0), (2, 127.0), (3, 130.0), (4, 1.0)] {
        for (distance, t) in [(10.0, 1.0), (4990.0, time)] {
            harness.script.push(Tick::Sample(sample(1, distance, t), info("Test Track"), rival(lap, distance, t)));
        }
    }
    harness.run().await;

    let records = harness.sink.list_opponent_records().await?;
    assert_eq!(records.len(), 1);
    assert!(records[0].starts_with("Test_Track_Rival_Car_X_remote_best_"));

    let contents = tokio::fs::read_to_string(harness.sink.opponent_dir().join(&records[0])).await?;
    assert!(contents.contains("Player,X\n"));
    assert!(contents.contains("LapTime [s],127.000\n"));
    assert!(contents.contains("Control,remote\n"));

    harness.handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn enrichment_is_fetched_once_per_session() -> Result<()> {
    let harness = Harness::start(LoggerConfig::default())?;
    for lap in 1..=5 {
        harness.script.lap("Track A", lap, 100.0);
    }
    for lap in 1..=5 {
        harness.script.lap("Track B", lap, 100.0);
    }
    harness.run().await;

    assert_eq!(*harness.lookups.0.lock().unwrap(), vec!["Track A".to_string(), "Track B".to_string()]);
    // Four complete laps per session; the fifth lap of Track A was cut short
    // by the session change.
    assert_eq!(harness.sink.list_records().await?.len(), 8);

    harness.handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn paused_logger_records_nothing() -> Result<()> {
    let mut harness = Harness::start(LoggerConfig::default())?;
    harness.script.push(Tick::Sample(sample(1, 0.0, 0.0), info("Test Track"), Vec::new()));
    harness.run().await;

    harness.handle.pause().await?;
    assert_eq!(harness.handle.state(), SessionState::Paused);
    harness.script.lap("Test Track", 2, 95.0);
    harness.script.lap("Test Track", 3, 95.0);
    harness.run().await;
    assert!(harness.sink.list_records().await?.is_empty());

    // Lap 1 ended while paused, so it is incomplete and never recorded.
    harness.handle.resume().await?;
    harness.script.lap("Test Track", 4, 95.0);
    harness.script.push(Tick::Sample(sample(5, 0.0, 0.0), info("Test Track"), Vec::new()));
    harness.run().await;

    let records = harness.sink.list_records().await?;
    assert_eq!(records.len(), 1);
    assert!(records[0].contains("_lap4_"));
    let events = harness.events();
    assert!(events.iter().any(|e| matches!(
        e,
        LoggerEvent::LapDiscarded { lap: 1, reason: DiscardReason::Interrupted, .. }
    )));
    assert!(events.iter().all(|e| !e.is_warning()));

    harness.handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn lost_source_discards_the_open_lap() -> Result<()> {
    let config = LoggerConfig { source_grace_period_ms: 0, ..Default::default() };
    let mut harness = Harness::start(config)?;
    harness.script.push(Tick::Sample(sample(1, 0.0, 0.0), info("Test Track"), Vec::new()));
    harness.script.push(Tick::Sample(sample(1, 100.0, 1.5), info("Test Track"), Vec::new()));
    harness.script.push(Tick::Gone);
    harness.run().await;

    assert_eq!(harness.handle.state(), SessionState::Idle);
    assert!(harness.sink.list_records().await?.is_empty());

    let transitions: Vec<_> = harness
        .events()
        .into_iter()
        .filter_map(|e| match e {
            LoggerEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![SessionState::Detected, SessionState::Logging, SessionState::Error, SessionState::Idle]
    );

    harness.handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_flush_keeps_the_partial_lap() -> Result<()> {
    let config = LoggerConfig { shutdown_policy: LapPolicy::Flush, ..Default::default() };
    let mut harness = Harness::start(config)?;
    harness.script.push(Tick::Sample(sample(1, 0.0, 0.0), info("Test Track"), Vec::new()));
    harness.script.push(Tick::Sample(sample(1, 100.0, 1.5), info("Test Track"), Vec::new()));
    harness.run().await;

    let mut events = harness.events;
    harness.handle.stop().await;

    assert_eq!(harness.sink.list_records().await?.len(), 1);
    let mut partial = false;
    while let Ok(event) = events.try_recv() {
        partial |= matches!(event, LoggerEvent::LapCompleted { partial: true, .. });
    }
    assert!(partial);
    Ok(())
}

#[tokio::test]
async fn unwritable_output_drops_laps_without_stopping() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let blocked = dir.path().join("not-a-dir");
    std::fs::write(&blocked, "")?;

    let config = LoggerConfig { output_dir: blocked, write_retries: 1, write_retry_backoff_ms: 1, ..Default::default() };
    let mut harness = Harness::start_in(dir, config)?;

    harness.script.lap("Test Track", 1, 91.0);
    harness.script.lap("Test Track", 2, 92.0);
    harness.script.push(Tick::Sample(sample(3, 0.0, 0.0), info("Test Track"), Vec::new()));
    harness.run().await;

    assert_eq!(harness.handle.state(), SessionState::Logging);
    let events = harness.events();
    let dropped = events.iter().filter(|e| matches!(e, LoggerEvent::LapDropped { .. })).count();
    assert_eq!(dropped, 2);
    assert!(events.iter().any(|e| matches!(e, LoggerEvent::StorageFault { .. })));

    harness.handle.stop().await;
    Ok(())
}
