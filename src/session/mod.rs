//! Local driver session lifecycle
//!
//! ```text
//!            available           valid sample
//!   Idle ───────────────▶ Detected ────────────▶ Logging ◀──▶ Paused
//!    ▲                                              │            │
//!    │ gone for the grace period     source lost / read failure  │
//!    └──────────────────────────── Error ◀────────────────────────┘
//! ```
//!
//! The manager is synchronous and never reads a clock itself; the poll loop
//! passes in the time of each call. Every call returns the
//! [`SessionEvent`]s it caused, in order.

mod context;

pub use context::SessionContext;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::format::MetadataBlock;
use crate::lap_tracker::{LapTracker, Observation};
use crate::types::{CompletedLap, DiscardReason, NormalizedSample, SessionState, SourceSessionInfo};
use crate::{LoggerError, Result};

/// Pattern of generated session ids
pub const SESSION_ID_FORMAT: &str = "%Y%m%d%H%M%S%6f";

/// What happens to an unfinished lap when logging stops abruptly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapPolicy {
    /// Drop the partial lap
    #[default]
    Discard,
    /// Hand the partial lap on as if it had completed
    Flush,
}

/// Outcome of a session manager call
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: SessionState, to: SessionState },
    /// A new session began. The only point where enrichment is fetched.
    SessionStarted { session_id: String, info: SourceSessionInfo },
    SessionEnded { session_id: String },
    /// A lap is ready for the formatter, with the metadata of the session it
    /// was driven in. `partial` laps were cut short and handed on by
    /// [`LapPolicy::Flush`].
    LapCompleted { lap: CompletedLap, metadata: MetadataBlock, session_id: String, partial: bool },
    LapDiscarded { lap: u32, samples: usize, reason: DiscardReason },
}

/// State machine for the local driver.
#[derive(Debug)]
pub struct SessionManager {
    state: SessionState,
    failure_policy: LapPolicy,
    grace_period: Duration,
    tracker: LapTracker,
    context: Option<SessionContext>,
    /// Lap that was open when logging resumed, until the next sample
    resumed_on: Option<u32>,
    unavailable_since: Option<Instant>,
    error_since: Option<Instant>,
    last_session_id: Option<String>,
    id_collisions: u32,
}

impl SessionManager {
    pub fn new(failure_policy: LapPolicy, grace_period: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            failure_policy,
            grace_period,
            tracker: LapTracker::new(),
            context: None,
            resumed_on: None,
            unavailable_since: None,
            error_since: None,
            last_session_id: None,
            id_collisions: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The running session, if any
    pub fn context(&self) -> Option<&SessionContext> {
        self.context.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.context.as_ref().map(SessionContext::session_id)
    }

    /// Lap number of the open lap
    pub fn current_lap(&self) -> Option<u32> {
        self.tracker.current_lap()
    }

    /// Samples buffered for the open lap
    pub fn buffered(&self) -> usize {
        self.tracker.buffered()
    }

    /// Cache enrichment data on the running session.
    pub fn attach_enrichment(&mut self, data: crate::enrichment::EnrichmentData) {
        if let Some(context) = self.context.as_mut() {
            context.set_enrichment(data);
        }
    }

    /// The source answered this tick.
    pub fn source_available(&mut self, now: Instant) -> Vec<SessionEvent> {
        self.unavailable_since = None;
        let mut events = Vec::new();

        match self.state {
            SessionState::Idle => self.transition(SessionState::Detected, &mut events),
            SessionState::Error => {
                let recovered = self.error_since.is_none_or(|t| now.duration_since(t) >= self.grace_period);
                if recovered {
                    info!("source recovered");
                    self.go_idle(&mut events);
                    self.transition(SessionState::Detected, &mut events);
                }
            }
            _ => {}
        }

        events
    }

    /// The source did not answer this tick.
    pub fn source_unavailable(&mut self, now: Instant) -> Vec<SessionEvent> {
        let since = *self.unavailable_since.get_or_insert(now);
        let mut events = Vec::new();

        if self.state.has_session() {
            warn!(state = %self.state, "source lost");
            self.enter_error(now, &mut events);
        }

        if self.state != SessionState::Idle && now.duration_since(since) >= self.grace_period {
            debug!(grace_ms = self.grace_period.as_millis() as u64, "source gone");
            self.go_idle(&mut events);
        }

        events
    }

    /// The source failed in a way the loop will not retry.
    pub fn source_failed(&mut self, now: Instant, error: &LoggerError) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.state != SessionState::Error {
            warn!(state = %self.state, %error, "unrecoverable source failure");
            self.enter_error(now, &mut events);
        }
        events
    }

    /// Feed a validated, normalized sample for the local driver.
    pub fn observe(
        &mut self,
        sample: NormalizedSample,
        info: &SourceSessionInfo,
        utc: DateTime<Utc>,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        match self.state {
            SessionState::Detected if info.is_valid() => self.start_session(info, utc, &mut events),
            SessionState::Logging => {
                let changed = self.context.as_ref().is_some_and(|c| !c.info().same_session(info));
                if changed && info.is_valid() {
                    info!(track = %info.track, car = %info.car, "session changed");
                    self.close_open_lap(LapPolicy::Discard, DiscardReason::SessionChanged, &mut events);
                    self.end_session(&mut events);
                    self.start_session(info, utc, &mut events);
                }
            }
            _ => {}
        }

        if self.state != SessionState::Logging {
            return events;
        }

        let Some(lap) = sample.lap_number else {
            return events;
        };

        // Samples were dropped while paused. If the lap ended in the
        // meantime, its buffer is missing its tail and its lap time is short.
        if let Some(paused_on) = self.resumed_on.take().filter(|p| lap > *p) {
            let samples = self.tracker.reset();
            info!(lap = paused_on, samples, "lap ended while paused, discarding");
            events.push(SessionEvent::LapDiscarded { lap: paused_on, samples, reason: DiscardReason::Interrupted });
        }

        match self.tracker.observe(lap, sample) {
            Observation::Appended => {}
            Observation::Completed(buffer) => {
                let lap = CompletedLap::from_buffer(buffer);
                info!(lap = lap.lap_number(), lap_time = ?lap.lap_time(), samples = lap.sample_count(), "lap completed");
                events.push(self.completed(lap, false));
            }
            Observation::Restarted { previous_lap, lap, discarded } => {
                warn!(previous_lap, lap, discarded, "lap counter went backwards");
                events.push(SessionEvent::LapDiscarded {
                    lap: previous_lap,
                    samples: discarded,
                    reason: DiscardReason::CounterReset,
                });
            }
        }

        events
    }

    pub fn pause(&mut self) -> Result<Vec<SessionEvent>> {
        if self.state != SessionState::Logging {
            return Err(LoggerError::invalid_transition(self.state, "pause"));
        }
        let mut events = Vec::new();
        self.transition(SessionState::Paused, &mut events);
        Ok(events)
    }

    pub fn resume(&mut self) -> Result<Vec<SessionEvent>> {
        if self.state != SessionState::Paused {
            return Err(LoggerError::invalid_transition(self.state, "resume"));
        }
        let mut events = Vec::new();
        self.resumed_on = self.tracker.current_lap().filter(|_| self.tracker.buffered() > 0);
        self.transition(SessionState::Logging, &mut events);
        Ok(events)
    }

    /// Stop logging. The open lap is flushed or discarded per `policy`.
    pub fn shutdown(&mut self, policy: LapPolicy) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.close_open_lap(policy, DiscardReason::Shutdown, &mut events);
        self.go_idle(&mut events);
        events
    }

    fn start_session(&mut self, info: &SourceSessionInfo, utc: DateTime<Utc>, events: &mut Vec<SessionEvent>) {
        let session_id = self.next_session_id(utc);
        info!(session_id = %session_id, track = %info.track, car = %info.car, player = %info.player, "session started");

        self.tracker.reset();
        self.resumed_on = None;
        self.context = Some(SessionContext::new(session_id.clone(), utc, info.clone()));
        self.transition(SessionState::Logging, events);
        events.push(SessionEvent::SessionStarted { session_id, info: info.clone() });
    }

    fn end_session(&mut self, events: &mut Vec<SessionEvent>) {
        self.tracker.reset();
        self.resumed_on = None;
        if let Some(context) = self.context.take() {
            info!(session_id = %context.session_id(), "session ended");
            events.push(SessionEvent::SessionEnded { session_id: context.session_id().to_string() });
        }
    }

    fn enter_error(&mut self, now: Instant, events: &mut Vec<SessionEvent>) {
        self.close_open_lap(self.failure_policy, DiscardReason::SourceLost, events);
        self.error_since = Some(now);
        self.transition(SessionState::Error, events);
    }

    fn go_idle(&mut self, events: &mut Vec<SessionEvent>) {
        self.end_session(events);
        self.error_since = None;
        self.transition(SessionState::Idle, events);
    }

    fn close_open_lap(&mut self, policy: LapPolicy, reason: DiscardReason, events: &mut Vec<SessionEvent>) {
        let Some(buffer) = self.tracker.take_open_lap() else {
            return;
        };

        match policy {
            LapPolicy::Flush => {
                let lap = CompletedLap::from_buffer(buffer);
                info!(lap = lap.lap_number(), samples = lap.sample_count(), %reason, "flushing partial lap");
                events.push(self.completed(lap, true));
            }
            LapPolicy::Discard => {
                let lap = buffer.lap_number();
                info!(lap, samples = buffer.len(), %reason, "discarding partial lap");
                events.push(SessionEvent::LapDiscarded { lap, samples: buffer.len(), reason });
            }
        }
    }

    fn completed(&self, lap: CompletedLap, partial: bool) -> SessionEvent {
        match self.context.as_ref() {
            Some(context) => SessionEvent::LapCompleted {
                metadata: context.lap_metadata(&lap),
                session_id: context.session_id().to_string(),
                lap,
                partial,
            },
            // Laps are only buffered inside a session.
            None => SessionEvent::LapDiscarded {
                lap: lap.lap_number(),
                samples: lap.sample_count(),
                reason: DiscardReason::SessionChanged,
            },
        }
    }

    fn transition(&mut self, to: SessionState, events: &mut Vec<SessionEvent>) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(%from, %to, "session state changed");
        self.state = to;
        events.push(SessionEvent::StateChanged { from, to });
    }

    fn next_session_id(&mut self, utc: DateTime<Utc>) -> String {
        let base = utc.format(SESSION_ID_FORMAT).to_string();
        let id = match self.last_session_id.as_deref() {
            Some(last) if last.starts_with(&base) => {
                self.id_collisions += 1;
                format!("{base}-{}", self.id_collisions + 1)
            }
            _ => {
                self.id_collisions = 0;
                base
            }
        };
        self.last_session_id = Some(id.clone());
        id
    }
}
