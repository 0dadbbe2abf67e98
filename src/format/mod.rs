//! Versioned lap record format
//!
//! A record is a metadata block, a blank line, the column header of the
//! schema version and one row per sample. Viewers parse it byte for byte,
//! so everything here is deterministic.

mod metadata;
mod record;
mod schema;

pub use metadata::{
    MetadataBlock, OptionalKey, REQUIRED_KEYS, RequiredMetadata, SESSION_UTC_FORMAT, render_points,
    sector_boundaries,
};
pub use record::RecordFormatter;
pub use schema::{Cell, Channel, Column, FORMAT_TAG, Precision, SchemaVersion};
