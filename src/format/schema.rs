//! Column layout of each record schema version

use serde::{Deserialize, Serialize};

use crate::types::NormalizedSample;

/// Value of the `Format` metadata key
pub const FORMAT_TAG: &str = "LMUTelemetry v2";

/// Record schema version. The column header is fixed per version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVersion {
    #[default]
    V1,
}

impl SchemaVersion {
    /// Value of the `Version` metadata key
    pub fn number(self) -> &'static str {
        match self {
            SchemaVersion::V1 => "1",
        }
    }

    pub fn format_tag(self) -> &'static str {
        FORMAT_TAG
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            SchemaVersion::V1 => V1_COLUMNS,
        }
    }

    /// Column header line, without line terminator
    pub fn header(self) -> String {
        self.columns().iter().map(|c| c.name).collect::<Vec<_>>().join(",")
    }
}

/// Sample channel a column reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    LapDistance,
    LapTime,
    Sector,
    Speed,
    EngineRevs,
    Throttle,
    Brake,
    Steer,
    Gear,
    X,
    Y,
    Z,
}

/// How a column renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Distance and time: three decimals
    Fine,
    /// Other floating channels: two decimals
    Standard,
    /// No decimal point
    Integer,
}

impl Precision {
    pub fn decimals(self) -> usize {
        match self {
            Precision::Fine => 3,
            Precision::Standard => 2,
            Precision::Integer => 0,
        }
    }
}

/// One column of the tabular section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Header text including the unit annotation
    pub name: &'static str,
    pub channel: Channel,
    pub precision: Precision,
}

/// A channel value read from a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Float(Option<f64>),
    Int(Option<i64>),
}

impl Channel {
    pub fn read(self, sample: &NormalizedSample) -> Cell {
        match self {
            Channel::LapDistance => Cell::Float(sample.lap_distance),
            Channel::LapTime => Cell::Float(sample.lap_time),
            Channel::Sector => Cell::Int(sample.sector.map(i64::from)),
            Channel::Speed => Cell::Float(sample.speed),
            Channel::EngineRevs => Cell::Float(sample.engine_rpm),
            Channel::Throttle => Cell::Float(sample.throttle),
            Channel::Brake => Cell::Float(sample.brake),
            Channel::Steer => Cell::Float(sample.steering),
            Channel::Gear => Cell::Int(sample.gear.map(i64::from)),
            Channel::X => Cell::Float(sample.position.x),
            Channel::Y => Cell::Float(sample.position.y),
            Channel::Z => Cell::Float(sample.position.z),
        }
    }
}

const fn column(name: &'static str, channel: Channel, precision: Precision) -> Column {
    Column { name, channel, precision }
}

const V1_COLUMNS: &[Column] = &[
    column("LapDistance [m]", Channel::LapDistance, Precision::Fine),
    column("LapTime [s]", Channel::LapTime, Precision::Fine),
    column("Sector [int]", Channel::Sector, Precision::Integer),
    column("Speed [km/h]", Channel::Speed, Precision::Standard),
    column("EngineRevs [rpm]", Channel::EngineRevs, Precision::Standard),
    column("ThrottlePercentage [%]", Channel::Throttle, Precision::Standard),
    column("BrakePercentage [%]", Channel::Brake, Precision::Standard),
    column("Steer [%]", Channel::Steer, Precision::Standard),
    column("Gear [int]", Channel::Gear, Precision::Integer),
    column("X [m]", Channel::X, Precision::Standard),
    column("Y [m]", Channel::Y, Precision::Standard),
    column("Z [m]", Channel::Z, Precision::Standard),
];
