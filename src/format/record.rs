//! Lap record rendering

use std::fmt::Write as _;

use super::metadata::MetadataBlock;
use super::schema::{Cell, Column, Precision, SchemaVersion};
use crate::types::{LapBuffer, NormalizedSample};

/// Renders a lap and its metadata into the versioned text record.
///
/// Output layout:
///
/// ```text
/// Format,LMUTelemetry v2
/// ...                       required keys, then optional keys
///                           blank line
/// LapDistance [m],...       column header of the schema version
/// 0.000,...                 one row per sample, ascending lap distance
/// ```
///
/// Every line ends with `\n`. The formatter is pure: the same buffer and
/// block always produce the same bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFormatter {
    version: SchemaVersion,
}

impl RecordFormatter {
    pub fn new(version: SchemaVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Render a record. Returns `None` for an empty lap so that no file is
    /// ever produced for it.
    pub fn format(&self, lap: &LapBuffer, metadata: &MetadataBlock) -> Option<String> {
        if lap.is_empty() {
            return None;
        }

        let columns = self.version.columns();
        let mut out = String::with_capacity(256 + lap.len() * columns.len() * 8);

        for (key, value) in metadata.entries_for(self.version) {
            let _ = writeln!(out, "{key},{value}");
        }
        out.push('\n');
        out.push_str(&self.version.header());
        out.push('\n');

        for sample in sorted_by_distance(lap.samples()) {
            render_row(&mut out, columns, sample);
        }

        Some(out)
    }
}

/// Stable ascending order by lap distance. Samples without a distance go
/// last in arrival order.
fn sorted_by_distance(samples: &[NormalizedSample]) -> Vec<&NormalizedSample> {
    let mut rows: Vec<&NormalizedSample> = samples.iter().collect();
    rows.sort_by(|a, b| match (a.lap_distance, b.lap_distance) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    rows
}

fn render_row(out: &mut String, columns: &[Column], sample: &NormalizedSample) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        render_cell(out, column.channel.read(sample), column.precision);
    }
    out.push('\n');
}

fn render_cell(out: &mut String, cell: Cell, precision: Precision) {
    match cell {
        Cell::Float(Some(v)) if v.is_finite() => {
            let text = format!("{:.*}", precision.decimals(), v);
            out.push_str(strip_negative_zero(&text));
        }
        Cell::Int(Some(v)) => {
            let _ = write!(out, "{v}");
        }
        _ => {}
    }
}

fn strip_negative_zero(text: &str) -> &str {
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest,
        _ => text,
    }
}
