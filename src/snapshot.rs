//! CSV snapshot reading
//!
//! The headset recorder keeps a flat CSV of `Channel,Band,Value` rows (other
//! columns such as `Timestamp` are ignored). A snapshot is read whole on every
//! request; any malformed row fails the entire read.

use crate::error::FluxError;
use crate::types::Observation;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Result of reading a snapshot location
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// No file at the configured location
    Missing,
    /// The file exists; rows may be empty
    Rows(Vec<Observation>),
}

/// Raw row as it appears in the file, before validation
#[derive(Debug, Deserialize)]
struct SnapshotRecord {
    #[serde(rename = "Channel", default)]
    channel: Option<String>,
    #[serde(rename = "Band", default)]
    band: Option<String>,
    #[serde(rename = "Value", default)]
    value: Option<String>,
}

/// Reader for headset CSV snapshots
pub struct SnapshotReader;

impl SnapshotReader {
    /// Read the snapshot at `path`, reporting a missing file as [`Snapshot::Missing`]
    pub fn read_path(path: &Path) -> Result<Snapshot, FluxError> {
        if !path.exists() {
            debug!(path = %path.display(), "snapshot file not found");
            return Ok(Snapshot::Missing);
        }

        let file = std::fs::File::open(path)?;
        let rows = Self::parse(file)?;
        debug!(path = %path.display(), rows = rows.len(), "snapshot read");
        Ok(Snapshot::Rows(rows))
    }

    /// Parse snapshot CSV from any reader
    pub fn parse<R: Read>(reader: R) -> Result<Vec<Observation>, FluxError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut observations = Vec::new();
        for (index, record) in csv_reader.deserialize::<SnapshotRecord>().enumerate() {
            // Row numbers count the header as row 1
            let row = index + 2;
            let record = record.map_err(|e| FluxError::MalformedRow {
                row,
                reason: e.to_string(),
            })?;

            let observation = Observation::parse(
                record.channel.as_deref(),
                record.band.as_deref(),
                record.value.as_deref(),
            )
            .map_err(|e| FluxError::MalformedRow {
                row,
                reason: e.to_string(),
            })?;

            observations.push(observation);
        }

        Ok(observations)
    }

    /// Parse snapshot CSV held in memory
    pub fn parse_str(csv_text: &str) -> Result<Vec<Observation>, FluxError> {
        Self::parse(csv_text.as_bytes())
    }
}
