//! Logger configuration
//!
//! Every key is optional; a missing key takes its default. Example:
//!
//! ```yaml
//! output_dir: ./telemetry_output
//! poll_interval_ms: 10
//! track_opponents: true
//! opponent_classes: [remote_human]
//! shutdown_policy: flush
//! input_scale: auto
//! enrichment_url: http://localhost:6397
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::enrichment::{Enrichment, NoEnrichment, RestEnrichment};
use crate::session::LapPolicy;
use crate::sink::{DEFAULT_LAP_TEMPLATE, DEFAULT_OPPONENT_TEMPLATE, FileSink};
use crate::types::{ControlClass, InputScale};
use crate::{LoggerError, Result};

/// Runtime configuration of the logger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerConfig {
    /// Directory local lap records are written to
    pub output_dir: PathBuf,
    /// Name template for local laps
    pub filename_format: String,
    /// Name template for competitor bests
    pub opponent_filename_format: String,
    /// Time between poll ticks
    pub poll_interval_ms: u64,
    /// How long the source must stay away before the session ends
    pub source_grace_period_ms: u64,
    /// Consecutive failed reads tolerated before the session errors out
    pub max_read_errors: u32,
    /// Extra attempts after a failed record write
    pub write_retries: u32,
    /// Delay before the first write retry; doubles on each further attempt
    pub write_retry_backoff_ms: u64,
    pub track_opponents: bool,
    /// Control classes of competitors to track
    pub opponent_classes: Vec<ControlClass>,
    /// Fate of the open lap when the logger stops
    pub shutdown_policy: LapPolicy,
    /// Fate of the open lap when the source fails or disappears
    pub failure_policy: LapPolicy,
    /// Scale the source reports pedals and steering in
    pub input_scale: InputScale,
    /// Base URL of the simulator's REST endpoint; no enrichment when unset
    pub enrichment_url: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./telemetry_output"),
            filename_format: DEFAULT_LAP_TEMPLATE.to_string(),
            opponent_filename_format: DEFAULT_OPPONENT_TEMPLATE.to_string(),
            poll_interval_ms: 10,
            source_grace_period_ms: 5_000,
            max_read_errors: 10,
            write_retries: 3,
            write_retry_backoff_ms: 50,
            track_opponents: true,
            opponent_classes: vec![ControlClass::RemoteHuman],
            shutdown_policy: LapPolicy::Discard,
            failure_policy: LapPolicy::Discard,
            input_scale: InputScale::Fraction,
            enrichment_url: None,
        }
    }
}

impl LoggerConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| LoggerError::config_error("YAML deserialization", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&yaml).with_context(|| format!("loading config file {}", path.display()))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| LoggerError::config_error("YAML serialization", e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(LoggerError::config_error("poll_interval_ms", "must be greater than zero"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(LoggerError::config_error("output_dir", "must not be empty"));
        }
        for (key, template) in [
            ("filename_format", &self.filename_format),
            ("opponent_filename_format", &self.opponent_filename_format),
        ] {
            if template.trim().is_empty() {
                return Err(LoggerError::config_error(key, "must not be empty"));
            }
        }
        if !self.opponent_filename_format.contains("{driver}") {
            return Err(LoggerError::config_error(
                "opponent_filename_format",
                "must contain {driver} so competitors do not overwrite each other",
            ));
        }
        if self.enrichment_url.as_deref().is_some_and(|url| !url.starts_with("http://") && !url.starts_with("https://")) {
            return Err(LoggerError::config_error("enrichment_url", "must be an http or https URL"));
        }
        if self.opponent_classes.contains(&ControlClass::Local) {
            return Err(LoggerError::config_error("opponent_classes", "local is never tracked as a competitor"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.source_grace_period_ms)
    }

    pub fn write_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.write_retry_backoff_ms)
    }

    /// The configured enrichment, or [`NoEnrichment`] when none is set.
    pub fn enrichment(&self) -> Box<dyn Enrichment> {
        match &self.enrichment_url {
            Some(url) => Box::new(RestEnrichment::new(url.clone())),
            None => Box::new(NoEnrichment),
        }
    }

    /// A [`FileSink`] writing where this configuration says.
    pub fn file_sink(&self) -> FileSink {
        FileSink::new(&self.output_dir)
            .with_templates(self.filename_format.clone(), self.opponent_filename_format.clone())
    }
}
