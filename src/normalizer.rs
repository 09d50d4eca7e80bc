//! Band normalization
//!
//! This module maps per-electrode averages onto the canonical five-band vector.
//! - Absent electrodes are replaced by their slot default
//! - All slot values are pooled into one scalar mean
//! - Each band is a clamped linear function of that mean

use crate::aggregator::{mean, Aggregate};
use crate::config::NormalizerConfig;
use crate::types::{Band, BandPowers, ChannelBandAverages};
use serde::Serialize;

/// Notes on how a vector was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "flag", content = "detail")]
pub enum QualityFlag {
    /// The electrode was absent and its slot default was used
    DefaultedElectrode(String),
    /// The band value hit a clamp bound
    Clamped(Band),
    /// No pooled values existed and the baseline vector was returned
    Baseline,
}

/// Normalized vector with provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedBands {
    pub powers: BandPowers,
    /// Pooled mean of all slot values, `None` when the baseline was used
    pub avg_value: Option<f64>,
    pub quality_flags: Vec<QualityFlag>,
}

/// Normalizer for converting channel averages to canonical bands
#[derive(Debug, Clone, Default)]
pub struct BandNormalizer {
    config: NormalizerConfig,
}

impl BandNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize channel averages into the canonical vector
    pub fn normalize(&self, averages: &ChannelBandAverages) -> BandPowers {
        self.normalize_detailed(averages).powers
    }

    /// Normalize an aggregation outcome; `NoData` yields the baseline vector
    pub fn normalize_aggregate(&self, aggregate: &Aggregate) -> NormalizedBands {
        match aggregate {
            Aggregate::NoData => self.baseline(),
            Aggregate::Averages { averages, .. } => self.normalize_detailed(averages),
        }
    }

    /// Normalize and report which fallbacks and clamps were applied
    pub fn normalize_detailed(&self, averages: &ChannelBandAverages) -> NormalizedBands {
        let mut quality_flags = Vec::new();
        let mut pooled: Vec<f64> = Vec::new();

        for slot in &self.config.electrodes {
            match averages.channel(&slot.channel) {
                Some(bands) => pooled.extend(bands.values().copied()),
                None => {
                    quality_flags.push(QualityFlag::DefaultedElectrode(slot.channel.clone()));
                    pooled.push(slot.default);
                }
            }
        }

        let Some(avg_value) = mean(&pooled) else {
            return self.baseline();
        };

        let mut powers = self.config.baseline;
        for band in Band::ALL {
            // Validated configs always carry a rule per band
            let Some(rule) = self.config.rule(band) else {
                continue;
            };
            let raw = avg_value * rule.factor;
            let value = rule.apply(avg_value);
            if value != raw {
                quality_flags.push(QualityFlag::Clamped(band));
            }
            powers.set(band, value);
        }

        NormalizedBands {
            powers,
            avg_value: Some(avg_value),
            quality_flags,
        }
    }

    fn baseline(&self) -> NormalizedBands {
        NormalizedBands {
            powers: self.config.baseline,
            avg_value: None,
            quality_flags: vec![QualityFlag::Baseline],
        }
    }
}
