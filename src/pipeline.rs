//! Pipeline orchestration
//!
//! This module provides the autofill API: snapshot → aggregation →
//! normalization → tagged response. The public entry point is fail-soft and
//! always answers with the same response shape.

use crate::aggregator::{Aggregate, ChannelAggregator};
use crate::config::FluxConfig;
use crate::error::FluxError;
use crate::normalizer::{BandNormalizer, NormalizedBands};
use crate::snapshot::{Snapshot, SnapshotReader};
use crate::types::{AutofillResponse, BandPowers, ChannelBandAverages, Observation, SnapshotSource};
use std::path::Path;
use tracing::{debug, info, warn};

/// Tagged outcome of the autofill pipeline before it is flattened into a response
#[derive(Debug, Clone, PartialEq)]
pub enum AutofillOutcome {
    /// Values were derived from headset data
    Ready {
        normalized: NormalizedBands,
        averages: ChannelBandAverages,
        record_count: usize,
    },
    /// No usable data; carries the reason
    Unavailable(SnapshotSource),
}

/// Read the snapshot at `snapshot_path` and produce the autofill response.
///
/// Never fails: a malformed snapshot is reported through `source: "error"`
/// with the baseline values so callers always see the same shape.
///
/// # Example
/// ```ignore
/// let response = autofill(Path::new("eeg_live_data.csv"), &FluxConfig::default());
/// assert!(response.alpha >= 30.0);
/// ```
pub fn autofill(snapshot_path: &Path, config: &FluxConfig) -> AutofillResponse {
    let processor = AutofillProcessor::new(config);
    processor.respond(processor.try_autofill(snapshot_path))
}

/// Stateless processor holding the normalizer configuration.
///
/// Use this when serving many requests with the same configuration; every
/// call re-reads the snapshot.
#[derive(Debug, Clone, Default)]
pub struct AutofillProcessor {
    normalizer: BandNormalizer,
}

impl AutofillProcessor {
    pub fn new(config: &FluxConfig) -> Self {
        Self {
            normalizer: BandNormalizer::new(config.normalizer.clone()),
        }
    }

    pub fn normalizer(&self) -> &BandNormalizer {
        &self.normalizer
    }

    /// Run the pipeline and surface failures to the caller
    pub fn try_autofill(&self, snapshot_path: &Path) -> Result<AutofillOutcome, FluxError> {
        // Stage 1: Read the whole snapshot
        let rows = match SnapshotReader::read_path(snapshot_path)? {
            Snapshot::Missing => {
                return Ok(AutofillOutcome::Unavailable(SnapshotSource::NoDataFile))
            }
            Snapshot::Rows(rows) => rows,
        };

        Ok(self.process_rows(&rows))
    }

    /// Aggregate and normalize rows that were already read
    pub fn process_rows(&self, rows: &[Observation]) -> AutofillOutcome {
        // Stage 2: Aggregate per (channel, band)
        let aggregate = ChannelAggregator::aggregate(rows);

        let Aggregate::Averages {
            averages,
            record_count,
        } = aggregate
        else {
            return AutofillOutcome::Unavailable(SnapshotSource::NoRecords);
        };

        // Stage 3: Normalize onto canonical bands
        let normalized = self.normalizer.normalize_detailed(&averages);
        debug!(
            avg_value = ?normalized.avg_value,
            flags = ?normalized.quality_flags,
            "normalized snapshot"
        );

        AutofillOutcome::Ready {
            normalized,
            averages,
            record_count,
        }
    }

    /// Flatten an outcome (or failure) into the wire response
    pub fn respond(&self, outcome: Result<AutofillOutcome, FluxError>) -> AutofillResponse {
        match outcome {
            Ok(AutofillOutcome::Ready {
                normalized,
                averages,
                record_count,
            }) => {
                info!(records = record_count, "autofill from headset snapshot");
                AutofillResponse {
                    available: true,
                    bands: normalized.powers,
                    source: SnapshotSource::EegHeadset,
                    records_count: record_count,
                    channel_averages: Some(averages),
                    error: None,
                }
            }
            Ok(AutofillOutcome::Unavailable(source)) => {
                info!(source = source.as_str(), "autofill data unavailable");
                self.fallback(source, None)
            }
            Err(e) => {
                warn!(error = %e, "autofill failed, returning baseline");
                self.fallback(SnapshotSource::Error, Some(e.to_string()))
            }
        }
    }

    fn fallback(&self, source: SnapshotSource, error: Option<String>) -> AutofillResponse {
        AutofillResponse {
            available: false,
            bands: self.baseline(),
            source,
            records_count: 0,
            channel_averages: None,
            error,
        }
    }

    fn baseline(&self) -> BandPowers {
        self.normalizer.config().baseline
    }
}
