//! Core data types for the acquisition pipeline.
//!
//! - [`RawSample`] is what a source reports for one vehicle at one instant
//! - [`NormalizedSample`] is the canonical, unit-consistent form
//! - [`LapBuffer`] and [`CompletedLap`] hold the samples of one lap attempt,
//!   [`DiscardReason`] says why one was dropped
//! - [`VehicleIdentity`] keys competitors within a session
//! - [`SessionState`] and [`SourceSessionInfo`] describe the session lifecycle

mod identity;
mod lap;
mod sample;
mod session;

pub use identity::{ControlClass, VehicleIdentity};
pub use lap::{CompletedLap, DiscardReason, LapBuffer};
pub use sample::{InputScale, NormalizedSample, Position, RawSample};
pub use session::{SessionState, SourceSessionInfo};
