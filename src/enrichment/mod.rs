//! Session-scoped auxiliary metadata
//!
//! Enrichment is fetched at most once per session, when the session starts.
//! A failed fetch only means the optional metadata keys are left out.

mod rest;

pub use rest::{DEFAULT_BASE_URL, RestEnrichment};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Vehicle classes shown to users, in preference order
pub const READABLE_CLASSES: [&str; 6] = ["Hypercar", "LMP2", "LMP3", "GTE", "GT3", "LMGT3"];

/// Metadata for one vehicle entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleDetails {
    /// Entry name, as the source reports it
    pub name: String,
    pub car_model: Option<String>,
    pub car_class: Option<String>,
    pub manufacturer: Option<String>,
    pub team: Option<String>,
}

/// Everything an enrichment fetch returned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentData {
    pub vehicles: Vec<VehicleDetails>,
    /// Track outline as `[x, z]` points
    pub track_map: Vec<[f64; 2]>,
    /// Pit lane as `[x, z]` points
    pub pit_lane: Vec<[f64; 2]>,
}

impl EnrichmentData {
    /// Look up a vehicle by entry name. An exact match wins; otherwise an
    /// entry that extends the name with a space-separated suffix (a version
    /// tag, for instance) matches.
    pub fn vehicle(&self, name: &str) -> Option<&VehicleDetails> {
        if name.is_empty() {
            return None;
        }
        self.vehicles.iter().find(|v| v.name == name).or_else(|| {
            let prefix = format!("{name} ");
            self.vehicles.iter().find(|v| v.name.starts_with(&prefix))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty() && self.track_map.is_empty() && self.pit_lane.is_empty()
    }
}

/// Look up session metadata keyed by track.
#[async_trait::async_trait]
pub trait Enrichment: Send + 'static {
    async fn fetch(&mut self, track: &str) -> Result<EnrichmentData>;
}

/// Enrichment that never has anything to add
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

#[async_trait::async_trait]
impl Enrichment for NoEnrichment {
    async fn fetch(&mut self, _track: &str) -> Result<EnrichmentData> {
        Ok(EnrichmentData::default())
    }
}

#[async_trait::async_trait]
impl Enrichment for Box<dyn Enrichment> {
    async fn fetch(&mut self, track: &str) -> Result<EnrichmentData> {
        (**self).fetch(track).await
    }
}

/// Car model from a comma-separated path such as
/// `"WEC 2023, Hypercar, Cadillac V-Series.R"`: the last component when the
/// path has at least three, the whole path otherwise.
pub fn car_model_from_path(path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    let parts: Vec<&str> = path.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [.., last] if parts.len() >= 3 => Some((*last).to_string()),
        _ => Some(path.to_string()),
    }
}

/// Human-readable class from a vehicle's class list
pub fn readable_class(classes: &[String]) -> Option<String> {
    classes
        .iter()
        .find(|c| READABLE_CLASSES.contains(&c.as_str()))
        .or_else(|| classes.get(1))
        .or_else(|| classes.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(name: &str, model: &str) -> VehicleDetails {
        VehicleDetails { name: name.to_string(), car_model: Some(model.to_string()), ..Default::default() }
    }

    #[test]
    fn car_model_is_last_path_component() {
        assert_eq!(
            car_model_from_path("WEC 2023, Hypercar, Cadillac V-Series.R").as_deref(),
            Some("Cadillac V-Series.R")
        );
        assert_eq!(car_model_from_path("Hypercar, Toyota").as_deref(), Some("Hypercar, Toyota"));
        assert_eq!(car_model_from_path(""), None);
    }

    #[test]
    fn readable_class_preference() {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(readable_class(&owned(&["Cadillac_V_lmdh", "Hypercar", "WEC2023"])).as_deref(), Some("Hypercar"));
        assert_eq!(readable_class(&owned(&["x_tech", "Custom", "Y"])).as_deref(), Some("Custom"));
        assert_eq!(readable_class(&owned(&["Solo"])).as_deref(), Some("Solo"));
        assert_eq!(readable_class(&[]), None);
    }

    #[test]
    fn vehicle_lookup_prefers_exact_then_suffixed_name() {
        let data = EnrichmentData {
            vehicles: vec![
                details("Team #7:LM 1.42", "Suffixed"),
                details("Team #8:LM", "Exact"),
                details("Team #8:LM 1.41", "Other"),
            ],
            ..Default::default()
        };

        assert_eq!(data.vehicle("Team #8:LM").and_then(|v| v.car_model.as_deref()), Some("Exact"));
        assert_eq!(data.vehicle("Team #7:LM").and_then(|v| v.car_model.as_deref()), Some("Suffixed"));
        assert_eq!(data.vehicle("Team #7"), None);
        assert_eq!(data.vehicle(""), None);
    }
}
