//! Channel aggregation
//!
//! Groups snapshot observations by electrode, then by band label within the
//! electrode, and reduces each group to its unweighted arithmetic mean.

use crate::types::{ChannelBandAverages, Observation};
use std::collections::BTreeMap;

/// Raw values grouped channel -> band -> samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelBandGroups(BTreeMap<String, BTreeMap<String, Vec<f64>>>);

impl ChannelBandGroups {
    pub fn push(&mut self, observation: &Observation) {
        self.0
            .entry(observation.channel().to_string())
            .or_default()
            .entry(observation.band().to_string())
            .or_default()
            .push(observation.value());
    }

    pub fn samples(&self, channel: &str, band: &str) -> Option<&[f64]> {
        self.0
            .get(channel)
            .and_then(|bands| bands.get(band))
            .map(Vec::as_slice)
    }

    /// Reduce every group to its mean
    pub fn averages(&self) -> ChannelBandAverages {
        let mut averages = ChannelBandAverages::new();
        for (channel, bands) in &self.0 {
            for (band, values) in bands {
                if let Some(mean) = mean(values) {
                    averages.insert(channel.clone(), band.clone(), mean);
                }
            }
        }
        averages
    }
}

/// Outcome of aggregating one snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    /// The snapshot held no rows at all
    NoData,
    /// At least one row was averaged
    Averages {
        averages: ChannelBandAverages,
        record_count: usize,
    },
}

impl Aggregate {
    pub fn record_count(&self) -> usize {
        match self {
            Aggregate::NoData => 0,
            Aggregate::Averages { record_count, .. } => *record_count,
        }
    }
}

/// Aggregator for per-(channel, band) averages
pub struct ChannelAggregator;

impl ChannelAggregator {
    /// Group observations and average each (channel, band) pair
    pub fn aggregate(rows: &[Observation]) -> Aggregate {
        if rows.is_empty() {
            return Aggregate::NoData;
        }

        Aggregate::Averages {
            averages: Self::group(rows).averages(),
            record_count: rows.len(),
        }
    }

    /// Group observations without reducing them
    pub fn group(rows: &[Observation]) -> ChannelBandGroups {
        let mut groups = ChannelBandGroups::default();
        for row in rows {
            groups.push(row);
        }
        groups
    }
}

/// Arithmetic mean, `None` for an empty slice.
///
/// Finite inputs always give a finite mean; when the plain sum overflows the
/// values are scaled down before summing.
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let sum = values.iter().sum::<f64>();
    if sum.is_finite() {
        Some(sum / n)
    } else {
        Some(values.iter().map(|v| v / n).sum())
    }
}
