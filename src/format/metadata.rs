//! Ordered key/value preamble of a lap record
//!
//! Required keys are fields of [`RequiredMetadata`] and always render first,
//! in a fixed order. Optional keys come from the [`OptionalKey`] allow-list
//! and render afterwards in insertion order.

use chrono::{DateTime, Utc};

use super::schema::SchemaVersion;

/// Pattern of the `SessionUTC` value
pub const SESSION_UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Required keys in canonical order
pub const REQUIRED_KEYS: [&str; 8] = [
    "Format",
    "Version",
    "Player",
    "TrackName",
    "CarName",
    "SessionUTC",
    "LapTime [s]",
    "TrackLen [m]",
];

/// Keys that may follow the required block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionalKey {
    Event,
    Weather,
    TrackTemp,
    AmbientTemp,
    TyreCompound,
    CarClass,
    CarModel,
    Manufacturer,
    Team,
    LapNumber,
    Control,
    NumSectors,
    Sector1End,
    Sector2End,
    Sector3End,
    TrackMap,
    PitLaneMap,
}

impl OptionalKey {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionalKey::Event => "Event",
            OptionalKey::Weather => "Weather",
            OptionalKey::TrackTemp => "TrackTemp [C]",
            OptionalKey::AmbientTemp => "AmbientTemp [C]",
            OptionalKey::TyreCompound => "TyreCompound",
            OptionalKey::CarClass => "CarClass",
            OptionalKey::CarModel => "CarModel",
            OptionalKey::Manufacturer => "Manufacturer",
            OptionalKey::Team => "Team",
            OptionalKey::LapNumber => "LapNumber",
            OptionalKey::Control => "Control",
            OptionalKey::NumSectors => "NumSectors",
            OptionalKey::Sector1End => "Sector1End [m]",
            OptionalKey::Sector2End => "Sector2End [m]",
            OptionalKey::Sector3End => "Sector3End [m]",
            OptionalKey::TrackMap => "TrackMap",
            OptionalKey::PitLaneMap => "PitLaneMap",
        }
    }

    /// Key holding the end distance of a zero-based sector
    pub fn sector_end(index: usize) -> Option<OptionalKey> {
        match index {
            0 => Some(OptionalKey::Sector1End),
            1 => Some(OptionalKey::Sector2End),
            2 => Some(OptionalKey::Sector3End),
            _ => None,
        }
    }
}

/// Values for the required keys that vary per record
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredMetadata {
    pub player: String,
    pub track: String,
    pub car: String,
    pub session_utc: DateTime<Utc>,
    /// Best lap time of the record (s)
    pub lap_time: Option<f64>,
    /// Track length (m)
    pub track_length: Option<f64>,
}

/// Metadata block of one record
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataBlock {
    version: SchemaVersion,
    required: RequiredMetadata,
    optional: Vec<(OptionalKey, String)>,
}

impl MetadataBlock {
    pub fn new(required: RequiredMetadata) -> Self {
        Self { version: SchemaVersion::default(), required, optional: Vec::new() }
    }

    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn required(&self) -> &RequiredMetadata {
        &self.required
    }

    /// Set an optional key. A key that is already present keeps its
    /// position and takes the new value.
    pub fn insert(&mut self, key: OptionalKey, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.optional.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.optional.push((key, value)),
        }
        self
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, key: OptionalKey, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set an optional key only when a value is present
    pub fn with_some<V: Into<String>>(self, key: OptionalKey, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn get(&self, key: OptionalKey) -> Option<&str> {
        self.optional.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    /// All entries in render order
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        self.entries_for(self.version)
    }

    pub(crate) fn entries_for(&self, version: SchemaVersion) -> Vec<(&'static str, String)> {
        let r = &self.required;
        let required_values = [
            version.format_tag().to_string(),
            version.number().to_string(),
            r.player.clone(),
            r.track.clone(),
            r.car.clone(),
            r.session_utc.format(SESSION_UTC_FORMAT).to_string(),
            r.lap_time.map(|t| format!("{t:.3}")).unwrap_or_default(),
            r.track_length.map(|l| format!("{l:.2}")).unwrap_or_default(),
        ];

        REQUIRED_KEYS
            .into_iter()
            .zip(required_values)
            .chain(self.optional.iter().map(|(k, v)| (k.as_str(), v.clone())))
            .map(|(k, v)| (k, single_line(&v)))
            .collect()
    }
}

/// Sector end distances for a track split into `sectors` equal parts
pub fn sector_boundaries(track_length: f64, sectors: usize) -> Vec<(OptionalKey, String)> {
    (0..sectors)
        .filter_map(|i| {
            let end = track_length * (i + 1) as f64 / sectors as f64;
            OptionalKey::sector_end(i).map(|key| (key, format!("{end:.2}")))
        })
        .collect()
}

/// Render map points as `x/z` pairs joined by `;`
pub fn render_points(points: &[[f64; 2]]) -> String {
    points.iter().map(|[x, z]| format!("{x:.2}/{z:.2}")).collect::<Vec<_>>().join(";")
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn required() -> RequiredMetadata {
        RequiredMetadata {
            player: "Test Driver".to_string(),
            track: "Test Track".to_string(),
            car: "Test Car".to_string(),
            session_utc: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            lap_time: Some(95.1234),
            track_length: Some(5000.0),
        }
    }

    #[test]
    fn required_keys_render_in_canonical_order() {
        let block = MetadataBlock::new(required());
        let entries = block.entries();

        assert_eq!(
            entries,
            vec![
                ("Format", "LMUTelemetry v2".to_string()),
                ("Version", "1".to_string()),
                ("Player", "Test Driver".to_string()),
                ("TrackName", "Test Track".to_string()),
                ("CarName", "Test Car".to_string()),
                ("SessionUTC", "2025-01-01T00:00:00Z".to_string()),
                ("LapTime [s]", "95.123".to_string()),
                ("TrackLen [m]", "5000.00".to_string()),
            ]
        );
    }

    #[test]
    fn optional_keys_follow_in_insertion_order() {
        let block = MetadataBlock::new(required())
            .with(OptionalKey::Weather, "Clear")
            .with(OptionalKey::Event, "Practice")
            .with_some(OptionalKey::TyreCompound, None::<String>)
            .with(OptionalKey::Weather, "Rain");

        let keys: Vec<_> = block.entries().into_iter().skip(REQUIRED_KEYS.len()).collect();
        assert_eq!(
            keys,
            vec![("Weather", "Rain".to_string()), ("Event", "Practice".to_string())]
        );
        assert_eq!(block.entries().len(), REQUIRED_KEYS.len() + 2);
    }

    #[test]
    fn unknown_required_values_render_empty() {
        let block = MetadataBlock::new(RequiredMetadata {
            lap_time: None,
            track_length: None,
            ..required()
        });
        let entries = block.entries();
        assert_eq!(entries[6], ("LapTime [s]", String::new()));
        assert_eq!(entries[7], ("TrackLen [m]", String::new()));
    }

    #[test]
    fn values_never_span_lines() {
        let block = MetadataBlock::new(RequiredMetadata {
            player: "Two\nLines".to_string(),
            ..required()
        });
        assert_eq!(block.entries()[2].1, "Two Lines");
    }

    #[test]
    fn sector_boundaries_split_track_evenly() {
        assert_eq!(
            sector_boundaries(5400.0, 3),
            vec![
                (OptionalKey::Sector1End, "1800.00".to_string()),
                (OptionalKey::Sector2End, "3600.00".to_string()),
                (OptionalKey::Sector3End, "5400.00".to_string()),
            ]
        );
    }

    #[test]
    fn points_render_compactly() {
        assert_eq!(render_points(&[[-112.67, -100.92], [1.0, 2.5]]), "-112.67/-100.92;1.00/2.50");
        assert_eq!(render_points(&[]), "");
    }
}
