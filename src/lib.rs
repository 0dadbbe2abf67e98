//! Lap-by-lap telemetry logger for racing simulators.
//!
//! laplog polls a telemetry source, segments the local driver's samples into
//! laps, keeps the fastest lap of every tracked competitor, and writes each
//! completed lap as a versioned CSV record with a metadata preamble.
//!
//! # Features
//!
//! - **Lap segmentation**: lap boundaries inferred from the source's lap counter
//! - **Session lifecycle**: Idle, Detected, Logging, Paused and Error, with a
//!   grace period for a source that drops out
//! - **Competitor bests**: one retained lap per competitor, replaced only by a
//!   faster one
//! - **Stable records**: fixed column layout per schema version, atomic writes
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use laplog::{LapLogger, LoggerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     laplog::init_tracing("info");
//!     let config = LoggerConfig::load("laplog.yaml")?;
//!     let logger = LapLogger::simulated(&config)?;
//!
//!     let mut events = logger.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Hosts with their own source implement [`TelemetrySource`] and call
//! [`LapLogger::start`].

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Acquisition pipeline
pub mod clock;
pub mod lap_tracker;
pub mod normalizer;
pub mod opponents;
pub mod session;

// Records and their destination
pub mod format;
pub mod sink;

// Integration surfaces
pub mod config;
pub mod driver;
pub mod enrichment;
pub mod events;
pub mod pipeline;
pub mod providers;
pub mod source;

// Core exports
pub use error::*;
pub use types::*;

pub use clock::{Clock, IntervalTicker, ManualClock, ManualTicker, SystemClock, TickHandle, Ticker};
pub use config::LoggerConfig;
pub use driver::{Driver, DriverHandle};
pub use enrichment::{Enrichment, EnrichmentData, NoEnrichment, RestEnrichment};
pub use events::LoggerEvent;
pub use format::{MetadataBlock, RecordFormatter, SchemaVersion};
pub use lap_tracker::{LapTracker, Observation};
pub use normalizer::SampleNormalizer;
pub use opponents::{OpponentRecord, OpponentTracker};
pub use pipeline::Pipeline;
pub use providers::{SimulatedCompetitor, SimulatedSource};
pub use session::{LapPolicy, SessionManager};
pub use sink::{FileSink, RecordDescriptor, RecordKind, RecordSink};
pub use source::{TelemetrySource, VehicleSnapshot};

/// Install the default `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Does nothing if a
/// global subscriber is already set.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Entry point wiring a source to the configured sink, enrichment and
/// real-time clock.
///
/// # Example
///
/// ```rust,no_run
/// use laplog::{LapLogger, LoggerConfig, SimulatedSource, SystemClock};
///
/// # #[tokio::main]
/// # async fn main() -> laplog::Result<()> {
/// let config = LoggerConfig::default();
/// let logger = LapLogger::start(&config, SimulatedSource::new(SystemClock))?;
/// tokio::time::sleep(std::time::Duration::from_secs(300)).await;
/// logger.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct LapLogger;

impl LapLogger {
    /// Start logging `source` on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Config`] if the configuration does not
    /// validate.
    pub fn start<S: TelemetrySource>(config: &LoggerConfig, source: S) -> Result<DriverHandle> {
        config.validate()?;
        tracing::info!(
            output_dir = %config.output_dir.display(),
            poll_ms = config.poll_interval_ms,
            opponents = config.track_opponents,
            "starting lap logger"
        );

        let pipeline = Pipeline::new(config, source, config.enrichment(), config.file_sink(), SystemClock);
        Ok(Driver::spawn(pipeline, IntervalTicker::new(config.poll_interval())))
    }

    /// Start logging the built-in simulated car.
    pub fn simulated(config: &LoggerConfig) -> Result<DriverHandle> {
        Self::start(config, SimulatedSource::new(SystemClock))
    }
}
