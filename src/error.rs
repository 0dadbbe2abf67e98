//! Error types for the acquisition pipeline.
//!
//! Every failure the core can hit is represented here. None of them stops the
//! polling loop: the loop logs them, reports them on the event stream and
//! carries on at the next tick.
//!
//! ## Error Categories
//!
//! - **Source Errors**: the telemetry source is unavailable, failed a read, or was lost mid-lap
//! - **Sample Errors**: a read succeeded but the sample is inconsistent
//! - **Enrichment Errors**: optional session metadata could not be fetched
//! - **Write Errors**: a record could not be persisted
//! - **Configuration Errors**: invalid or unreadable configuration
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use laplog::LoggerError;
//!
//! let error = LoggerError::source_unavailable("shared memory not mapped");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```
//!
//! ## Helper Constructors
//!
//! ```rust
//! use laplog::LoggerError;
//! use std::path::PathBuf;
//!
//! let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
//! let write_error = LoggerError::write_error(PathBuf::from("/laps/lap1.csv"), io_err);
//! let sample_error = LoggerError::malformed_sample("lap_distance", "value is NaN");
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::SessionState;

/// Result type alias for logger operations.
pub type Result<T, E = LoggerError> = std::result::Result<T, E>;

/// Main error type for logger operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LoggerError {
    #[error("Telemetry source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Telemetry source read failed: {reason}")]
    SourceRead {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Telemetry source lost: {reason}")]
    SourceLost { reason: String },

    #[error("Malformed sample field '{field}': {details}")]
    MalformedSample { field: String, details: String },

    #[error("Enrichment unavailable: {reason}")]
    EnrichmentUnavailable {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to write record: {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Cannot {action} while {state}")]
    InvalidTransition { state: SessionState, action: String },

    #[error("Logger is shutting down")]
    Shutdown,
}

impl LoggerError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoggerError::SourceUnavailable { .. } => true,
            LoggerError::SourceRead { .. } => true,
            LoggerError::SourceLost { .. } => true,
            LoggerError::Write { .. } => true,
            LoggerError::MalformedSample { .. } => false,
            LoggerError::EnrichmentUnavailable { .. } => false,
            LoggerError::Config { .. } => false,
            LoggerError::InvalidTransition { .. } => false,
            LoggerError::Shutdown => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LoggerError::SourceUnavailable { .. } => vec![
                "Ensure the simulator is running and on track",
                "Check that the shared memory plugin is enabled",
                "Wait for the next poll tick",
            ],
            LoggerError::SourceRead { .. } => vec![
                "Check the shared memory plugin version",
                "Restart the simulator if reads keep failing",
            ],
            LoggerError::SourceLost { .. } => vec![
                "Check whether the simulator exited or crashed",
                "Logging resumes automatically when the source returns",
            ],
            LoggerError::MalformedSample { .. } => vec![
                "Verify the source reports a lap number",
                "Check the source for non-finite channel values",
            ],
            LoggerError::EnrichmentUnavailable { .. } => vec![
                "Check that the simulator's local REST endpoint is enabled",
                "Records are still written without the optional metadata",
            ],
            LoggerError::Write { .. } => vec![
                "Check the output directory exists and is writable",
                "Ensure sufficient disk space",
                "Check file permissions",
            ],
            LoggerError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Compare the values against the documented defaults",
            ],
            LoggerError::InvalidTransition { .. } => vec![
                "Only pause while logging and resume while paused",
                "Query the current state before requesting a transition",
            ],
            LoggerError::Shutdown => vec!["Start a new logger instance"],
        }
    }

    /// Helper constructor for write errors with path context.
    pub fn write_error(path: PathBuf, source: std::io::Error) -> Self {
        LoggerError::Write { path, source }
    }

    /// Helper constructor for an unavailable source.
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        LoggerError::SourceUnavailable { reason: reason.into() }
    }

    /// Helper constructor for failed reads.
    pub fn source_read_failed(reason: impl Into<String>) -> Self {
        LoggerError::SourceRead { reason: reason.into(), source: None }
    }

    /// Helper constructor for failed reads with source.
    pub fn source_read_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LoggerError::SourceRead { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for malformed samples.
    pub fn malformed_sample(field: impl Into<String>, details: impl Into<String>) -> Self {
        LoggerError::MalformedSample { field: field.into(), details: details.into() }
    }

    /// Helper constructor for enrichment failures.
    pub fn enrichment_unavailable(reason: impl Into<String>) -> Self {
        LoggerError::EnrichmentUnavailable { reason: reason.into(), source: None }
    }

    /// Helper constructor for enrichment failures with source.
    pub fn enrichment_unavailable_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LoggerError::EnrichmentUnavailable { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        LoggerError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for rejected state transitions.
    pub fn invalid_transition(state: SessionState, action: impl Into<String>) -> Self {
        LoggerError::InvalidTransition { state, action: action.into() }
    }
}

impl From<std::io::Error> for LoggerError {
    fn from(err: std::io::Error) -> Self {
        LoggerError::Write { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            field in "\\w+",
            details in ".*"
          ) {
            let unavailable = LoggerError::source_unavailable(reason.clone());
            let lost = LoggerError::SourceLost { reason: reason.clone() };
            let malformed = LoggerError::malformed_sample(field.clone(), details.clone());
            let config = LoggerError::config_error(field.clone(), details.clone());

            prop_assert!(unavailable.to_string().contains(&reason));
            prop_assert!(lost.to_string().contains(&reason));

            let malformed_msg = malformed.to_string();
            prop_assert!(malformed_msg.contains(&field));
            prop_assert!(malformed_msg.contains(&details));

            let config_msg = config.to_string();
            prop_assert!(config_msg.contains(&field));
            prop_assert!(!config_msg.is_empty());
          }

          #[test]
          fn io_errors_convert_to_write_errors(reason in ".*") {
            let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, reason.clone());
            let converted: LoggerError = io_err.into();
            match converted {
              LoggerError::Write { source, .. } => {
                prop_assert_eq!(source.to_string(), reason);
              }
              _ => prop_assert!(false, "Expected Write error from io::Error conversion"),
            }
          }

          #[test]
          fn source_chain_is_preserved(base_message in ".*") {
            let inner: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));
            let error = LoggerError::source_read_failed_with_source("mapping vanished", inner);

            let source = std::error::Error::source(&error);
            prop_assert!(source.is_some());
            prop_assert!(source.map(|s| s.to_string().contains(&base_message)).unwrap_or(false));
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<LoggerError>();

        let error = LoggerError::source_unavailable("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_methods_work() {
        let unavailable = LoggerError::source_unavailable("test");
        let malformed = LoggerError::malformed_sample("lap_number", "missing");
        let write = LoggerError::write_error(
            PathBuf::from("/laps/a.csv"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        assert!(unavailable.is_retryable());
        assert!(write.is_retryable());
        assert!(!malformed.is_retryable());
        assert!(!LoggerError::enrichment_unavailable("offline").is_retryable());

        for error in [&unavailable, &malformed, &write] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn invalid_transition_names_state_and_action() {
        let error = LoggerError::invalid_transition(SessionState::Idle, "pause");
        assert_eq!(error.to_string(), "Cannot pause while idle");
    }
}
