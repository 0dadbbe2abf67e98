//! One poll tick, end to end
//!
//! [`Pipeline::tick`] reads the source once, normalizes, feeds the session
//! manager and the opponent tracker, and persists whatever laps closed. All
//! mutable state lives in the pipeline and is only touched from `tick`, so
//! no locking is needed anywhere.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::clock::Clock;
use crate::config::LoggerConfig;
use crate::enrichment::Enrichment;
use crate::events::LoggerEvent;
use crate::format::{MetadataBlock, RecordFormatter};
use crate::normalizer::SampleNormalizer;
use crate::opponents::{OpponentEvent, OpponentTracker};
use crate::session::{LapPolicy, SessionEvent, SessionManager};
use crate::sink::{RecordDescriptor, RecordKind, RecordSink};
use crate::source::TelemetrySource;
use crate::types::{ControlClass, SessionState};
use crate::{LoggerError, Result};

/// Capacity of the status event channel
pub const EVENT_CAPACITY: usize = 256;

/// The acquisition-to-record pipeline.
pub struct Pipeline<S, E, K, C> {
    source: S,
    enrichment: E,
    sink: K,
    clock: C,
    normalizer: SampleNormalizer,
    formatter: RecordFormatter,
    session: SessionManager,
    opponents: Option<OpponentTracker>,
    events: broadcast::Sender<LoggerEvent>,
    shutdown_policy: LapPolicy,
    max_read_errors: u32,
    read_errors: u32,
    write_retries: u32,
    write_backoff: Duration,
}

impl<S, E, K, C> Pipeline<S, E, K, C>
where
    S: TelemetrySource,
    E: Enrichment,
    K: RecordSink,
    C: Clock,
{
    pub fn new(config: &LoggerConfig, source: S, enrichment: E, sink: K, clock: C) -> Self {
        let normalizer = SampleNormalizer::new(config.input_scale);
        let opponents = config
            .track_opponents
            .then(|| OpponentTracker::new(normalizer, config.opponent_classes.iter().copied()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            source,
            enrichment,
            sink,
            clock,
            normalizer,
            formatter: RecordFormatter::default(),
            session: SessionManager::new(config.failure_policy, config.grace_period()),
            opponents,
            events,
            shutdown_policy: config.shutdown_policy,
            max_read_errors: config.max_read_errors,
            read_errors: 0,
            write_retries: config.write_retries,
            write_backoff: config.write_retry_backoff(),
        }
    }

    /// Subscribe to the status stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LoggerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<LoggerEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn opponents(&self) -> Option<&OpponentTracker> {
        self.opponents.as_ref()
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run one poll tick.
    pub async fn tick(&mut self) {
        let now = self.clock.now();

        if !self.source.is_available().await {
            let events = self.session.source_unavailable(now);
            self.handle_session_events(events).await;
            return;
        }
        let events = self.session.source_available(now);
        self.handle_session_events(events).await;

        let raw = match self.source.read().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                trace!("no sample this tick");
                return;
            }
            Err(e) => return self.read_failed(e).await,
        };
        let info = match self.source.session_info().await {
            Ok(info) => info,
            Err(e) => return self.read_failed(e).await,
        };
        self.read_errors = 0;

        match SampleNormalizer::validate(&raw) {
            Ok(()) => {
                let sample = self.normalizer.normalize(&raw);
                let events = self.session.observe(sample, &info, self.clock.utc());
                self.handle_session_events(events).await;
            }
            Err(e) => {
                debug!(error = %e, "local sample skipped");
                self.emit(LoggerEvent::SampleSkipped { reason: e.to_string() });
            }
        }

        if self.session.state() == SessionState::Logging {
            self.observe_opponents().await;
        } else if let Some(opponents) = self.opponents.as_mut() {
            opponents.drop_open_laps();
        }
    }

    /// Suspend logging. The local open lap is kept; competitors' open laps
    /// are dropped on the next tick.
    pub async fn pause(&mut self) -> Result<()> {
        let events = self.session.pause()?;
        info!("logging paused");
        self.handle_session_events(events).await;
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<()> {
        let events = self.session.resume()?;
        info!("logging resumed");
        self.handle_session_events(events).await;
        Ok(())
    }

    /// Close the session, applying the shutdown policy to the open lap.
    pub async fn shutdown(&mut self) {
        info!(policy = ?self.shutdown_policy, "shutting down");
        let events = self.session.shutdown(self.shutdown_policy);
        self.handle_session_events(events).await;
    }

    async fn read_failed(&mut self, error: LoggerError) {
        self.read_errors += 1;
        warn!(consecutive = self.read_errors, max = self.max_read_errors, %error, "source read failed");
        self.emit(LoggerEvent::SourceError { reason: error.to_string(), consecutive: self.read_errors });

        if self.read_errors > self.max_read_errors {
            error!("too many consecutive read failures");
            let events = self.session.source_failed(self.clock.now(), &error);
            self.handle_session_events(events).await;
        }
    }

    async fn observe_opponents(&mut self) {
        if self.opponents.is_none() {
            return;
        }
        let vehicles = self.source.vehicles().await;
        let Some(tracker) = self.opponents.as_mut() else {
            return;
        };
        let vehicles = match vehicles {
            Ok(vehicles) => vehicles,
            Err(e) => {
                debug!(error = %e, "vehicle list unavailable");
                tracker.drop_open_laps();
                return;
            }
        };

        for event in tracker.observe_all(&vehicles) {
            match event {
                OpponentEvent::NewBest { identity, lap, lap_time, previous } => {
                    self.emit(LoggerEvent::OpponentBest { identity: identity.clone(), lap, lap_time, previous });
                    self.record_opponent(&identity).await;
                }
                OpponentEvent::SlowerLapIgnored { identity, lap, lap_time, best } => {
                    trace!(%identity, lap, lap_time, best, "slower competitor lap");
                }
                OpponentEvent::LapDiscarded { identity, lap, samples, reason } => {
                    debug!(%identity, lap, samples, %reason, "competitor lap discarded");
                }
                OpponentEvent::SampleSkipped { identity, reason } => {
                    trace!(%identity, reason, "competitor sample skipped");
                }
                OpponentEvent::VehicleLeft { identity, discarded } => {
                    debug!(%identity, discarded, "competitor left");
                }
            }
        }
    }

    async fn record_opponent(&mut self, identity: &crate::types::VehicleIdentity) {
        let (Some(context), Some(record)) =
            (self.session.context(), self.opponents.as_ref().and_then(|o| o.record(identity)))
        else {
            return;
        };

        let metadata = context.opponent_metadata(identity, record.car(), record.lap());
        let descriptor = RecordDescriptor {
            kind: RecordKind::OpponentBest,
            session_id: context.session_id().to_string(),
            started: context.started(),
            track: context.info().track.clone(),
            car: record.car().to_string(),
            driver: identity.driver().to_string(),
            control: identity.control(),
            lap: record.lap().lap_number(),
            lap_time: Some(record.lap_time()),
        };
        let Some(contents) = self.formatter.format(record.lap().buffer(), &metadata) else {
            return;
        };

        match self.write(&descriptor, &contents).await {
            Ok(path) => {
                debug!(%identity, path = %path.display(), "competitor best recorded");
                self.emit(LoggerEvent::OpponentRecorded { identity: identity.clone(), path });
            }
            Err(e) => self.write_failed(descriptor.lap, e),
        }
    }

    async fn handle_session_events(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::StateChanged { from, to } => {
                    self.emit(LoggerEvent::StateChanged { from, to });
                }
                SessionEvent::SessionStarted { session_id, info } => {
                    if let Some(opponents) = self.opponents.as_mut() {
                        opponents.reset();
                        opponents.set_local_driver(Some(info.player.clone()));
                    }
                    self.emit(LoggerEvent::SessionStarted {
                        session_id,
                        track: info.track.clone(),
                        car: info.car.clone(),
                        player: info.player.clone(),
                    });

                    match self.enrichment.fetch(&info.track).await {
                        Ok(data) => self.session.attach_enrichment(data),
                        Err(e) => {
                            warn!(track = %info.track, error = %e, "enrichment unavailable");
                            self.emit(LoggerEvent::EnrichmentFailed { reason: e.to_string() });
                        }
                    }
                }
                SessionEvent::SessionEnded { session_id } => {
                    if let Some(opponents) = self.opponents.as_mut() {
                        opponents.reset();
                    }
                    self.emit(LoggerEvent::SessionEnded { session_id });
                }
                SessionEvent::LapCompleted { lap, metadata, session_id, partial } => {
                    self.emit(LoggerEvent::LapCompleted {
                        lap: lap.lap_number(),
                        lap_time: lap.lap_time(),
                        samples: lap.sample_count(),
                        partial,
                    });
                    let Some(contents) = self.formatter.format(lap.buffer(), &metadata) else {
                        continue;
                    };
                    let descriptor = local_descriptor(&metadata, session_id, lap.lap_number());

                    match self.write(&descriptor, &contents).await {
                        Ok(path) => {
                            info!(lap = descriptor.lap, path = %path.display(), "lap recorded");
                            self.emit(LoggerEvent::LapRecorded { lap: descriptor.lap, path });
                        }
                        Err(e) => self.write_failed(descriptor.lap, e),
                    }
                }
                SessionEvent::LapDiscarded { lap, samples, reason } => {
                    self.emit(LoggerEvent::LapDiscarded { lap, samples, reason });
                }
            }
        }
    }

    /// Write with bounded retries and exponential backoff.
    async fn write(&mut self, descriptor: &RecordDescriptor, contents: &str) -> Result<PathBuf> {
        let mut attempt = 0u32;
        loop {
            match self.sink.write(descriptor, contents).await {
                Ok(path) => return Ok(path),
                Err(e) if e.is_retryable() && attempt < self.write_retries => {
                    attempt += 1;
                    let backoff = self.write_backoff * (1u32 << (attempt - 1).min(5));
                    warn!(attempt, retries = self.write_retries, ?backoff, error = %e, "record write failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write_failed(&self, lap: u32, error: LoggerError) {
        error!(lap, %error, "record dropped");
        self.emit(LoggerEvent::LapDropped { lap, reason: error.to_string() });
        self.emit(LoggerEvent::StorageFault { reason: error.to_string() });
    }

    fn emit(&self, event: LoggerEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

fn local_descriptor(metadata: &MetadataBlock, session_id: String, lap: u32) -> RecordDescriptor {
    let required = metadata.required();
    RecordDescriptor {
        kind: RecordKind::Lap,
        session_id,
        started: required.session_utc,
        track: required.track.clone(),
        car: required.car.clone(),
        driver: required.player.clone(),
        control: ControlClass::Local,
        lap,
        lap_time: required.lap_time,
    }
}
