//! Persisting formatted records
//!
//! Two naming modes:
//!
//! - local laps get a unique name per lap and never overwrite anything
//! - competitor bests get one stable name per competitor and session, so a
//!   faster lap replaces the file of the slower one

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::types::ControlClass;
use crate::{LoggerError, Result};

/// Default template for local laps
pub const DEFAULT_LAP_TEMPLATE: &str =
    "{date}_{time}_{track}_{car}_{driver}_lap{lap}_t{lap_time}s_{session_id}.csv";

/// Default template for competitor bests
pub const DEFAULT_OPPONENT_TEMPLATE: &str = "{track}_{car}_{driver}_{control}_best_{session_id}.csv";

/// Subdirectory competitor records are written to
pub const OPPONENT_DIR: &str = "opponents";

const RECORD_EXTENSION: &str = "csv";
const INVALID_CHARS: [char; 10] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*', ' '];

/// Which naming mode a record uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A lap of the local driver
    Lap,
    /// The retained best lap of a competitor
    OpponentBest,
}

/// Everything a sink needs to name a record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDescriptor {
    pub kind: RecordKind,
    pub session_id: String,
    /// Session start, used for the date and time placeholders
    pub started: DateTime<Utc>,
    pub track: String,
    pub car: String,
    pub driver: String,
    pub control: ControlClass,
    pub lap: u32,
    pub lap_time: Option<f64>,
}

impl RecordDescriptor {
    /// Fill a name template. Empty fields fall back to `unknown-*`
    /// placeholders; the result is sanitized for use as a file name.
    pub fn render(&self, template: &str) -> String {
        let or_unknown = |value: &str, what: &'static str| {
            if value.trim().is_empty() { format!("unknown-{what}") } else { value.to_string() }
        };
        let lap_time = self.lap_time.filter(|t| t.is_finite()).map(|t| t.round() as i64).unwrap_or(0);

        let name = template
            .replace("{date}", &self.started.format("%Y-%m-%d").to_string())
            .replace("{time}", &self.started.format("%H-%M").to_string())
            .replace("{track}", &or_unknown(&self.track, "track"))
            .replace("{car}", &or_unknown(&self.car, "car"))
            .replace("{driver}", &or_unknown(&self.driver, "driver"))
            .replace("{control}", self.control.as_str())
            .replace("{lap_time}", &lap_time.to_string())
            .replace("{lap}", &self.lap.to_string())
            .replace("{session_id}", &self.session_id);

        sanitize_file_name(&name)
    }
}

/// Replace characters that are invalid in file names, and spaces, with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars().map(|c| if INVALID_CHARS.contains(&c) || c.is_control() { '_' } else { c }).collect()
}

/// Destination for formatted records
#[async_trait::async_trait]
pub trait RecordSink: Send + 'static {
    /// Persist one record and return where it went.
    async fn write(&mut self, descriptor: &RecordDescriptor, contents: &str) -> Result<PathBuf>;
}

/// Writes records as files below an output directory.
///
/// Every write lands in a hidden temporary file first and is renamed into
/// place, so a reader never sees a partially written record.
#[derive(Debug, Clone)]
pub struct FileSink {
    output_dir: PathBuf,
    lap_template: String,
    opponent_template: String,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            lap_template: DEFAULT_LAP_TEMPLATE.to_string(),
            opponent_template: DEFAULT_OPPONENT_TEMPLATE.to_string(),
        }
    }

    pub fn with_templates(mut self, lap: impl Into<String>, opponent: impl Into<String>) -> Self {
        self.lap_template = lap.into();
        self.opponent_template = opponent.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn opponent_dir(&self) -> PathBuf {
        self.output_dir.join(OPPONENT_DIR)
    }

    /// Record file names in the output directory, sorted
    pub async fn list_records(&self) -> Result<Vec<String>> {
        list_records_in(&self.output_dir).await
    }

    /// Competitor record file names, sorted
    pub async fn list_opponent_records(&self) -> Result<Vec<String>> {
        list_records_in(&self.opponent_dir()).await
    }

    /// Local lap records of one session
    pub async fn session_records(&self, session_id: &str) -> Result<Vec<String>> {
        Ok(self.list_records().await?.into_iter().filter(|name| name.contains(session_id)).collect())
    }

    /// Delete one local record. Returns whether it existed.
    pub async fn delete_record(&self, name: &str) -> Result<bool> {
        let path = self.output_dir.join(sanitize_file_name(name));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LoggerError::write_error(path, e)),
        }
    }

    /// Delete every local record. Returns how many were removed.
    pub async fn clear_records(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.list_records().await? {
            if self.delete_record(&name).await? {
                removed += 1;
            }
        }
        debug!(removed, dir = %self.output_dir.display(), "records cleared");
        Ok(removed)
    }

    async fn unique_path(dir: &Path, name: &str) -> Result<PathBuf> {
        let candidate = dir.join(name);
        if !exists(&candidate).await? {
            return Ok(candidate);
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{ext}")),
            None => (name, String::new()),
        };
        let mut n = 2u32;
        loop {
            let candidate = dir.join(format!("{stem}_{n}{ext}"));
            if !exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}

#[async_trait::async_trait]
impl RecordSink for FileSink {
    async fn write(&mut self, descriptor: &RecordDescriptor, contents: &str) -> Result<PathBuf> {
        let (dir, path) = match descriptor.kind {
            RecordKind::Lap => {
                let name = descriptor.render(&self.lap_template);
                create_dir(&self.output_dir).await?;
                (self.output_dir.clone(), Self::unique_path(&self.output_dir, &name).await?)
            }
            RecordKind::OpponentBest => {
                let dir = self.opponent_dir();
                create_dir(&dir).await?;
                let path = dir.join(descriptor.render(&self.opponent_template));
                (dir, path)
            }
        };

        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let temp = dir.join(format!(".{file_name}.tmp"));

        if let Err(e) = tokio::fs::write(&temp, contents).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(LoggerError::write_error(temp, e));
        }
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(LoggerError::write_error(path, e));
        }

        trace!(path = %path.display(), bytes = contents.len(), "record written");
        Ok(path)
    }
}

async fn create_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| LoggerError::write_error(dir.to_path_buf(), e))
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path).await.map_err(|e| LoggerError::write_error(path.to_path_buf(), e))
}

async fn list_records_in(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LoggerError::write_error(dir.to_path_buf(), e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| LoggerError::write_error(dir.to_path_buf(), e))? {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && entry.path().extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
