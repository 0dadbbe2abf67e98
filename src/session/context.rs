//! Per-session descriptive data and metadata assembly

use chrono::{DateTime, Utc};

use crate::enrichment::EnrichmentData;
use crate::format::{MetadataBlock, OptionalKey, RequiredMetadata, render_points, sector_boundaries};
use crate::normalizer::SECTOR_COUNT;
use crate::types::{CompletedLap, SourceSessionInfo, VehicleIdentity};

/// Everything known about the running session.
///
/// Created when logging starts and dropped when the session ends, so nothing
/// cached here can leak into the next session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    session_id: String,
    started: DateTime<Utc>,
    info: SourceSessionInfo,
    enrichment: Option<EnrichmentData>,
}

impl SessionContext {
    pub(crate) fn new(session_id: String, started: DateTime<Utc>, info: SourceSessionInfo) -> Self {
        Self { session_id, started, info, enrichment: None }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wall-clock time the session started
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn info(&self) -> &SourceSessionInfo {
        &self.info
    }

    pub fn enrichment(&self) -> Option<&EnrichmentData> {
        self.enrichment.as_ref()
    }

    pub(crate) fn set_enrichment(&mut self, data: EnrichmentData) {
        self.enrichment = Some(data);
    }

    /// Metadata for a lap of the local driver
    pub fn lap_metadata(&self, lap: &CompletedLap) -> MetadataBlock {
        let info = &self.info;
        let vehicle = info
            .vehicle_name
            .as_deref()
            .and_then(|name| self.enrichment.as_ref()?.vehicle(name));

        let mut block = MetadataBlock::new(self.required(&info.player, &info.car, lap.lap_time()))
            .with_some(OptionalKey::Event, non_empty(&info.session_type))
            .with_some(OptionalKey::Weather, info.weather.clone())
            .with_some(OptionalKey::TrackTemp, info.track_temp.map(|t| format!("{t:.1}")))
            .with_some(OptionalKey::AmbientTemp, info.ambient_temp.map(|t| format!("{t:.1}")))
            .with_some(OptionalKey::TyreCompound, info.tyre_compound.clone())
            .with_some(OptionalKey::CarClass, vehicle.and_then(|v| v.car_class.clone()))
            .with_some(OptionalKey::CarModel, vehicle.and_then(|v| v.car_model.clone()))
            .with_some(OptionalKey::Manufacturer, vehicle.and_then(|v| v.manufacturer.clone()))
            .with_some(OptionalKey::Team, vehicle.and_then(|v| v.team.clone()))
            .with(OptionalKey::LapNumber, lap.lap_number().to_string());

        self.append_track(&mut block);
        block
    }

    /// Metadata for the retained best lap of a competitor
    pub fn opponent_metadata(&self, identity: &VehicleIdentity, car: &str, lap: &CompletedLap) -> MetadataBlock {
        let vehicle = self.enrichment.as_ref().and_then(|e| e.vehicle(car));

        let mut block = MetadataBlock::new(self.required(identity.driver(), car, lap.lap_time()))
            .with_some(OptionalKey::Event, non_empty(&self.info.session_type))
            .with_some(OptionalKey::CarClass, vehicle.and_then(|v| v.car_class.clone()))
            .with_some(OptionalKey::CarModel, vehicle.and_then(|v| v.car_model.clone()))
            .with_some(OptionalKey::Manufacturer, vehicle.and_then(|v| v.manufacturer.clone()))
            .with_some(OptionalKey::Team, vehicle.and_then(|v| v.team.clone()))
            .with(OptionalKey::LapNumber, lap.lap_number().to_string())
            .with(OptionalKey::Control, identity.control().as_str());

        self.append_track(&mut block);
        block
    }

    fn required(&self, player: &str, car: &str, lap_time: Option<f64>) -> RequiredMetadata {
        RequiredMetadata {
            player: player.to_string(),
            track: self.info.track.clone(),
            car: car.to_string(),
            session_utc: self.started,
            lap_time,
            track_length: self.info.track_length,
        }
    }

    fn append_track(&self, block: &mut MetadataBlock) {
        if let Some(length) = self.info.track_length.filter(|l| *l > 0.0) {
            block.insert(OptionalKey::NumSectors, SECTOR_COUNT.to_string());
            for (key, value) in sector_boundaries(length, SECTOR_COUNT as usize) {
                block.insert(key, value);
            }
        }

        if let Some(data) = &self.enrichment {
            if !data.track_map.is_empty() {
                block.insert(OptionalKey::TrackMap, render_points(&data.track_map));
            }
            if !data.pit_lane.is_empty() {
                block.insert(OptionalKey::PitLaneMap, render_points(&data.pit_lane));
            }
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::VehicleDetails;
    use crate::test_utils::{session_info, test_utc};
    use crate::types::{ControlClass, LapBuffer, NormalizedSample};

    fn lap(number: u32, time: f64) -> CompletedLap {
        CompletedLap::from_buffer(LapBuffer::from_samples(
            number,
            vec![NormalizedSample { lap_number: Some(number), lap_time: Some(time), ..Default::default() }],
        ))
    }

    fn keys(block: &MetadataBlock) -> Vec<&'static str> {
        block.entries().into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn local_lap_metadata_without_enrichment() {
        let context = SessionContext::new("20250101000000000000".into(), test_utc(), session_info("Test Track"));
        let block = context.lap_metadata(&lap(3, 95.5));

        assert_eq!(block.required().lap_time, Some(95.5));
        assert_eq!(block.get(OptionalKey::LapNumber), Some("3"));
        assert_eq!(block.get(OptionalKey::NumSectors), Some("3"));
        assert_eq!(block.get(OptionalKey::Sector3End), Some("5000.00"));
        assert_eq!(block.get(OptionalKey::CarClass), None);
        assert_eq!(block.get(OptionalKey::TrackMap), None);
        assert_eq!(block.get(OptionalKey::Event), Some("Practice"));
    }

    #[test]
    fn enrichment_adds_vehicle_and_map_keys() {
        let mut info = session_info("Test Track");
        info.vehicle_name = Some("Team #8:LM".to_string());
        let mut context = SessionContext::new("id".into(), test_utc(), info);
        context.set_enrichment(EnrichmentData {
            vehicles: vec![VehicleDetails {
                name: "Team #8:LM 1.41".to_string(),
                car_model: Some("Model".to_string()),
                car_class: Some("Hypercar".to_string()),
                manufacturer: None,
                team: Some("Team".to_string()),
            }],
            track_map: vec![[1.0, 2.0], [3.0, 4.0]],
            pit_lane: Vec::new(),
        });

        let block = context.lap_metadata(&lap(1, 90.0));
        assert_eq!(block.get(OptionalKey::CarClass), Some("Hypercar"));
        assert_eq!(block.get(OptionalKey::CarModel), Some("Model"));
        assert_eq!(block.get(OptionalKey::Manufacturer), None);
        assert_eq!(block.get(OptionalKey::TrackMap), Some("1.00/2.00;3.00/4.00"));
        assert_eq!(block.get(OptionalKey::PitLaneMap), None);

        let keys = keys(&block);
        let class_at = keys.iter().position(|k| *k == "CarClass");
        let map_at = keys.iter().position(|k| *k == "TrackMap");
        assert!(class_at < map_at);
    }

    #[test]
    fn opponent_metadata_names_the_competitor() {
        let context = SessionContext::new("id".into(), test_utc(), session_info("Test Track"));
        let identity = VehicleIdentity::new("Rival", ControlClass::RemoteHuman);
        let block = context.opponent_metadata(&identity, "Rival Car", &lap(4, 101.25));

        assert_eq!(block.required().player, "Rival");
        assert_eq!(block.required().car, "Rival Car");
        assert_eq!(block.required().track, "Test Track");
        assert_eq!(block.get(OptionalKey::Control), Some("remote"));
        assert_eq!(block.get(OptionalKey::LapNumber), Some("4"));
    }
}
