//! Competitor lap tracking and best-lap retention
//!
//! Every visible competitor gets its own [`LapTracker`], created on first
//! sighting and dropped as soon as the vehicle is missing from a tick. Only
//! the fastest completed lap per [`VehicleIdentity`] is ever kept, so memory
//! stays bounded no matter how long the session runs.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, trace};

use crate::lap_tracker::{LapTracker, Observation};
use crate::normalizer::SampleNormalizer;
use crate::source::VehicleSnapshot;
use crate::types::{CompletedLap, ControlClass, DiscardReason, LapBuffer, VehicleIdentity};

/// The best lap seen for one competitor
#[derive(Debug, Clone, PartialEq)]
pub struct OpponentRecord {
    identity: VehicleIdentity,
    car: String,
    lap: CompletedLap,
    lap_time: f64,
}

impl OpponentRecord {
    pub fn identity(&self) -> &VehicleIdentity {
        &self.identity
    }

    pub fn car(&self) -> &str {
        &self.car
    }

    pub fn lap(&self) -> &CompletedLap {
        &self.lap
    }

    pub fn lap_time(&self) -> f64 {
        self.lap_time
    }
}

/// Outcome of one competitor observation
#[derive(Debug, Clone, PartialEq)]
pub enum OpponentEvent {
    /// A faster lap replaced the record (or created the first one)
    NewBest { identity: VehicleIdentity, lap: u32, lap_time: f64, previous: Option<f64> },
    /// A completed lap was no faster than the record and was dropped
    SlowerLapIgnored { identity: VehicleIdentity, lap: u32, lap_time: f64, best: f64 },
    LapDiscarded { identity: VehicleIdentity, lap: u32, samples: usize, reason: DiscardReason },
    SampleSkipped { identity: VehicleIdentity, reason: String },
    /// The vehicle was missing from a tick; its open lap was dropped
    VehicleLeft { identity: VehicleIdentity, discarded: usize },
}

#[derive(Debug)]
struct Competitor {
    car: String,
    tracker: LapTracker,
}

/// Tracks every competitor of the running session.
#[derive(Debug)]
pub struct OpponentTracker {
    normalizer: SampleNormalizer,
    classes: HashSet<ControlClass>,
    local_driver: Option<String>,
    competitors: HashMap<VehicleIdentity, Competitor>,
    records: HashMap<VehicleIdentity, OpponentRecord>,
}

impl OpponentTracker {
    /// Track competitors of the given control classes. [`ControlClass::Local`]
    /// is never tracked, even if listed.
    pub fn new(normalizer: SampleNormalizer, classes: impl IntoIterator<Item = ControlClass>) -> Self {
        Self {
            normalizer,
            classes: classes.into_iter().filter(|c| *c != ControlClass::Local).collect(),
            local_driver: None,
            competitors: HashMap::new(),
            records: HashMap::new(),
        }
    }

    /// Name of the local driver. Entries with this name are never treated as
    /// competitors, whatever control class the source gives them.
    pub fn set_local_driver(&mut self, name: Option<String>) {
        self.local_driver = name.filter(|n| !n.is_empty());
    }

    pub fn is_tracked_class(&self, class: ControlClass) -> bool {
        self.classes.contains(&class)
    }

    /// Feed one tick's vehicle list.
    pub fn observe_all(&mut self, vehicles: &[VehicleSnapshot]) -> Vec<OpponentEvent> {
        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for vehicle in vehicles {
            let identity = &vehicle.identity;
            if !self.accepts(identity) {
                continue;
            }
            // One sample per identity per tick; the first entry wins.
            if !seen.insert(identity.clone()) {
                trace!(%identity, "duplicate vehicle entry");
                continue;
            }

            if let Err(e) = SampleNormalizer::validate(&vehicle.sample) {
                trace!(%identity, error = %e, "competitor sample skipped");
                events.push(OpponentEvent::SampleSkipped { identity: identity.clone(), reason: e.to_string() });
                continue;
            }
            let sample = self.normalizer.normalize(&vehicle.sample);
            let Some(lap) = sample.lap_number else {
                continue;
            };

            let competitor = self.competitors.entry(identity.clone()).or_insert_with(|| {
                debug!(%identity, car = %vehicle.car, "tracking competitor");
                Competitor { car: vehicle.car.clone(), tracker: LapTracker::new() }
            });
            if competitor.car != vehicle.car {
                competitor.car = vehicle.car.clone();
            }

            match competitor.tracker.observe(lap, sample) {
                Observation::Appended => {}
                Observation::Completed(buffer) => {
                    let car = competitor.car.clone();
                    events.push(self.consider(identity, car, buffer));
                }
                Observation::Restarted { previous_lap, discarded, .. } => {
                    events.push(OpponentEvent::LapDiscarded {
                        identity: identity.clone(),
                        lap: previous_lap,
                        samples: discarded,
                        reason: DiscardReason::CounterReset,
                    });
                }
            }
        }

        let gone: Vec<VehicleIdentity> =
            self.competitors.keys().filter(|id| !seen.contains(*id)).cloned().collect();
        for identity in gone {
            if let Some(competitor) = self.competitors.remove(&identity) {
                let discarded = competitor.tracker.buffered();
                debug!(%identity, discarded, "competitor left");
                events.push(OpponentEvent::VehicleLeft { identity, discarded });
            }
        }

        events
    }

    /// Apply the retention policy to a completed lap.
    fn consider(&mut self, identity: &VehicleIdentity, car: String, buffer: LapBuffer) -> OpponentEvent {
        let lap = CompletedLap::from_buffer(buffer);
        let lap_number = lap.lap_number();

        let Some(lap_time) = lap.lap_time().filter(|t| *t > 0.0) else {
            return OpponentEvent::LapDiscarded {
                identity: identity.clone(),
                lap: lap_number,
                samples: lap.sample_count(),
                reason: DiscardReason::NoLapTime,
            };
        };

        let previous = self.records.get(identity).map(OpponentRecord::lap_time);
        match previous {
            Some(best) if lap_time >= best => {
                trace!(%identity, lap = lap_number, lap_time, best, "slower lap ignored");
                OpponentEvent::SlowerLapIgnored { identity: identity.clone(), lap: lap_number, lap_time, best }
            }
            _ => {
                info!(%identity, lap = lap_number, lap_time, ?previous, "new competitor best");
                self.records
                    .insert(identity.clone(), OpponentRecord { identity: identity.clone(), car, lap, lap_time });
                OpponentEvent::NewBest { identity: identity.clone(), lap: lap_number, lap_time, previous }
            }
        }
    }

    fn accepts(&self, identity: &VehicleIdentity) -> bool {
        !identity.is_local()
            && self.local_driver.as_deref() != Some(identity.driver())
            && self.classes.contains(&identity.control())
    }

    pub fn record(&self, identity: &VehicleIdentity) -> Option<&OpponentRecord> {
        self.records.get(identity)
    }

    pub fn records(&self) -> impl Iterator<Item = &OpponentRecord> {
        self.records.values()
    }

    /// Competitors with an open lap tracker
    pub fn tracked(&self) -> usize {
        self.competitors.len()
    }

    /// Drop every competitor's open lap, keeping the records.
    ///
    /// Called whenever a tick goes by without observing the competitors, so
    /// a lap that ended unseen is never completed from its truncated buffer.
    /// Returns how many samples were discarded.
    pub fn drop_open_laps(&mut self) -> usize {
        let discarded: usize = self.competitors.drain().map(|(_, c)| c.tracker.buffered()).sum();
        if discarded > 0 {
            debug!(discarded, "competitor open laps dropped");
        }
        discarded
    }

    /// Forget every competitor and record.
    pub fn reset(&mut self) {
        self.competitors.clear();
        self.records.clear();
    }
}
