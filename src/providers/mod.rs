//! Built-in telemetry sources

pub mod simulated;

pub use simulated::{SimulatedCompetitor, SimulatedSource};
