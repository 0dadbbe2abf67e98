//! Enrichment from the simulator's local REST endpoint

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{Enrichment, EnrichmentData, VehicleDetails, car_model_from_path, readable_class};
use crate::{LoggerError, Result};

/// Where the simulator serves its REST API
pub const DEFAULT_BASE_URL: &str = "http://localhost:6397";

const VEHICLES_PATH: &str = "/rest/sessions/getAllVehicles";
const TRACKMAP_PATH: &str = "/rest/watch/trackmap";

const WAYPOINT_TRACK: i64 = 0;
const WAYPOINT_PIT_LANE: i64 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestVehicle {
    #[serde(default)]
    vehicle: String,
    #[serde(default)]
    full_path_tree: String,
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    manufacturer: String,
    #[serde(default)]
    team: String,
}

#[derive(Debug, Deserialize)]
struct Waypoint {
    x: f64,
    z: f64,
    #[serde(rename = "type")]
    kind: i64,
}

/// Fetches vehicle details and the track map over HTTP.
///
/// Either endpoint may fail on its own; the fetch only fails when both do.
pub struct RestEnrichment {
    client: reqwest::Client,
    base_url: String,
}

impl RestEnrichment {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LoggerError::enrichment_unavailable_with_source(format!("GET {url}"), Box::new(e)))?;

        if !response.status().is_success() {
            return Err(LoggerError::enrichment_unavailable(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LoggerError::enrichment_unavailable_with_source(format!("decoding {url}"), Box::new(e)))
    }
}

impl Default for RestEnrichment {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait::async_trait]
impl Enrichment for RestEnrichment {
    async fn fetch(&mut self, track: &str) -> Result<EnrichmentData> {
        let vehicles = self.get_json::<Vec<RestVehicle>>(VEHICLES_PATH).await;
        let waypoints = self.get_json::<Vec<Waypoint>>(TRACKMAP_PATH).await;

        let mut data = EnrichmentData::default();
        match (vehicles, waypoints) {
            (Err(vehicles_err), Err(map_err)) => {
                debug!(track, error = %map_err, "track map unavailable");
                return Err(vehicles_err);
            }
            (vehicles, waypoints) => {
                match vehicles {
                    Ok(v) => data.vehicles = vehicle_details(v),
                    Err(e) => warn!(track, error = %e, "vehicle details unavailable"),
                }
                match waypoints {
                    Ok(w) => {
                        (data.track_map, data.pit_lane) = split_waypoints(&w);
                    }
                    Err(e) => warn!(track, error = %e, "track map unavailable"),
                }
            }
        }

        debug!(
            track,
            vehicles = data.vehicles.len(),
            track_points = data.track_map.len(),
            pit_points = data.pit_lane.len(),
            "enrichment fetched"
        );
        Ok(data)
    }
}

fn vehicle_details(vehicles: Vec<RestVehicle>) -> Vec<VehicleDetails> {
    vehicles
        .into_iter()
        .filter(|v| !v.vehicle.is_empty())
        .map(|v| VehicleDetails {
            car_model: car_model_from_path(&v.full_path_tree),
            car_class: readable_class(&v.classes),
            manufacturer: Some(v.manufacturer).filter(|s| !s.is_empty()),
            team: Some(v.team).filter(|s| !s.is_empty()),
            name: v.vehicle,
        })
        .collect()
}

/// Track outline and pit lane points. Other waypoint types (pit bays) are
/// ignored.
fn split_waypoints(waypoints: &[Waypoint]) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
    let of_kind = |kind: i64| -> Vec<[f64; 2]> {
        waypoints.iter().filter(|w| w.kind == kind).map(|w| [w.x, w.z]).collect()
    };
    (of_kind(WAYPOINT_TRACK), of_kind(WAYPOINT_PIT_LANE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vehicle_listing() {
        let json = r#"[
            {
                "vehicle": "Action Express Racing #311:LM 1.41",
                "fullPathTree": "WEC 2023, Hypercar, Cadillac V-Series.R",
                "classes": ["Cadillac_V_lmdh", "Hypercar", "WEC2023"],
                "manufacturer": "Cadillac",
                "team": "Action Express Racing"
            },
            { "vehicle": "", "fullPathTree": "ignored" },
            { "vehicle": "Bare #1" }
        ]"#;

        let parsed: Vec<RestVehicle> = serde_json::from_str(json).unwrap_or_default();
        let details = vehicle_details(parsed);

        assert_eq!(details.len(), 2);
        assert_eq!(details[0].car_model.as_deref(), Some("Cadillac V-Series.R"));
        assert_eq!(details[0].car_class.as_deref(), Some("Hypercar"));
        assert_eq!(details[0].manufacturer.as_deref(), Some("Cadillac"));
        assert_eq!(details[0].team.as_deref(), Some("Action Express Racing"));
        assert_eq!(details[1].name, "Bare #1");
        assert_eq!(details[1].car_model, None);
        assert_eq!(details[1].team, None);
    }

    #[test]
    fn waypoints_split_by_type() {
        let json = r#"[
            {"x": 1.0, "y": 0.0, "z": 2.0, "type": 0},
            {"x": 3.0, "y": 0.0, "z": 4.0, "type": 1},
            {"x": 5.0, "y": 0.0, "z": 6.0, "type": 2},
            {"x": 7.0, "y": 0.0, "z": 8.0, "type": 0}
        ]"#;

        let parsed: Vec<Waypoint> = serde_json::from_str(json).unwrap_or_default();
        let (track, pit) = split_waypoints(&parsed);

        assert_eq!(track, vec![[1.0, 2.0], [7.0, 8.0]]);
        assert_eq!(pit, vec![[3.0, 4.0]]);
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(RestEnrichment::new("http://127.0.0.1:6397/").base_url(), "http://127.0.0.1:6397");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_enrichment_unavailable() {
        // Port 9 (discard) is not expected to serve HTTP.
        let mut enrichment = RestEnrichment::new("http://127.0.0.1:9");
        let result = enrichment.fetch("Test Track").await;
        assert!(matches!(result, Err(LoggerError::EnrichmentUnavailable { .. })));
    }
}
