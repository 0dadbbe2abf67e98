//! Telemetry source capability

use crate::Result;
use crate::types::{RawSample, SourceSessionInfo, VehicleIdentity};

/// One entry of the source's vehicle list
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub identity: VehicleIdentity,
    /// Car or entry name as reported by the source
    pub car: String,
    pub sample: RawSample,
}

impl VehicleSnapshot {
    pub fn new(identity: VehicleIdentity, car: impl Into<String>, sample: RawSample) -> Self {
        Self { identity, car: car.into(), sample }
    }
}

/// A polled telemetry source.
///
/// Sources abstract over the simulator's shared memory, simulated data and
/// test doubles. The poll loop calls them once per tick and never retries
/// within a tick:
///
/// 1. [`is_available`](Self::is_available) decides whether anything else is
///    called this tick
/// 2. [`read`](Self::read) returns the local driver's snapshot
/// 3. [`session_info`](Self::session_info) describes the current session
/// 4. [`vehicles`](Self::vehicles) lists every visible vehicle, the local
///    one included
#[async_trait::async_trait]
pub trait TelemetrySource: Send + 'static {
    /// Whether the source can currently be read
    async fn is_available(&mut self) -> bool;

    /// Read the local driver's snapshot
    ///
    /// Returns:
    /// - `Ok(Some(sample))` - a fresh snapshot
    /// - `Ok(None)` - nothing readable this tick
    /// - `Err(e)` - the read failed
    async fn read(&mut self) -> Result<Option<RawSample>>;

    /// Descriptive metadata of the current session
    async fn session_info(&mut self) -> Result<SourceSessionInfo>;

    /// Every vehicle currently visible
    async fn vehicles(&mut self) -> Result<Vec<VehicleSnapshot>>;
}
