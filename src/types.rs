//! Core types for the NeuroCalm Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: snapshot observations, per-channel averages, the canonical band
//! vector and the autofill response.

use crate::error::{InvalidObservation, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical EEG frequency band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Alpha,
    Beta,
    Gamma,
    Theta,
    Delta,
}

impl Band {
    /// All canonical bands in output order
    pub const ALL: [Band; 5] = [Band::Alpha, Band::Beta, Band::Gamma, Band::Theta, Band::Delta];

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
            Band::Theta => "theta",
            Band::Delta => "delta",
        }
    }
}

/// A single snapshot reading: one value for one band at one electrode.
///
/// Fields are private so every instance carries a non-empty channel, a
/// non-empty band and a finite value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    channel: String,
    band: String,
    value: f64,
}

impl Observation {
    /// Build an observation from already-typed parts
    pub fn new(
        channel: impl Into<String>,
        band: impl Into<String>,
        value: f64,
    ) -> Result<Self, InvalidObservation> {
        let channel = channel.into().trim().to_string();
        let band = band.into().trim().to_string();

        if channel.is_empty() {
            return Err(InvalidObservation::MissingChannel);
        }
        if band.is_empty() {
            return Err(InvalidObservation::MissingBand);
        }
        if !value.is_finite() {
            return Err(InvalidObservation::NonFinite(value));
        }

        Ok(Self {
            channel,
            band,
            value,
        })
    }

    /// Build an observation from raw text fields as they appear in a snapshot row
    pub fn parse(
        channel: Option<&str>,
        band: Option<&str>,
        value: Option<&str>,
    ) -> Result<Self, InvalidObservation> {
        let channel = channel.ok_or(InvalidObservation::MissingChannel)?;
        let band = band.ok_or(InvalidObservation::MissingBand)?;
        let raw = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(InvalidObservation::MissingValue)?;
        let value: f64 = raw
            .parse()
            .map_err(|_| InvalidObservation::NotANumber(raw.to_string()))?;

        Self::new(channel, band, value)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn band(&self) -> &str {
        &self.band
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Per-channel, per-band arithmetic means over one snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelBandAverages(BTreeMap<String, BTreeMap<String, f64>>);

impl ChannelBandAverages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: impl Into<String>, band: impl Into<String>, mean: f64) {
        self.0
            .entry(channel.into())
            .or_default()
            .insert(band.into(), mean);
    }

    /// Band averages recorded for a channel, if the channel was seen at all
    pub fn channel(&self, channel: &str) -> Option<&BTreeMap<String, f64>> {
        self.0.get(channel).filter(|bands| !bands.is_empty())
    }

    pub fn get(&self, channel: &str, band: &str) -> Option<f64> {
        self.0.get(channel).and_then(|bands| bands.get(band)).copied()
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }
}

/// The canonical five-band feature vector consumed by the classifiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPowers {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub delta: f64,
}

impl BandPowers {
    pub fn get(&self, band: Band) -> f64 {
        match band {
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
            Band::Theta => self.theta,
            Band::Delta => self.delta,
        }
    }

    pub fn set(&mut self, band: Band, value: f64) {
        match band {
            Band::Alpha => self.alpha = value,
            Band::Beta => self.beta = value,
            Band::Gamma => self.gamma = value,
            Band::Theta => self.theta = value,
            Band::Delta => self.delta = value,
        }
    }

    /// Values in canonical band order
    pub fn to_array(&self) -> [f64; 5] {
        Band::ALL.map(|band| self.get(band))
    }

    /// Check that the vector is acceptable classifier input
    pub fn validate(&self) -> Result<(), ValidationError> {
        for band in Band::ALL {
            let value = self.get(band);
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteBand {
                    band: band.as_str(),
                });
            }
            if value < 0.0 {
                return Err(ValidationError::NegativeBand {
                    band: band.as_str(),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Where the autofill values came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Values were derived from headset readings
    EegHeadset,
    /// The snapshot file does not exist
    NoDataFile,
    /// The snapshot exists but holds no data rows
    NoRecords,
    /// The snapshot could not be processed
    Error,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::EegHeadset => "eeg_headset",
            SnapshotSource::NoDataFile => "no_data_file",
            SnapshotSource::NoRecords => "no_records",
            SnapshotSource::Error => "error",
        }
    }
}

/// Response of the autofill pipeline; same shape on success and failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutofillResponse {
    pub available: bool,
    #[serde(flatten)]
    pub bands: BandPowers,
    pub source: SnapshotSource,
    pub records_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_averages: Option<ChannelBandAverages>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_trims_labels() {
        let obs = Observation::new(" TP9 ", "Alpha ", 12.5).unwrap();
        assert_eq!(obs.channel(), "TP9");
        assert_eq!(obs.band(), "Alpha");
        assert_eq!(obs.value(), 12.5);
    }

    #[test]
    fn test_observation_rejects_bad_rows() {
        assert_eq!(
            Observation::parse(Some(""), Some("Alpha"), Some("1.0")),
            Err(InvalidObservation::MissingChannel)
        );
        assert_eq!(
            Observation::parse(Some("TP9"), None, Some("1.0")),
            Err(InvalidObservation::MissingBand)
        );
        assert_eq!(
            Observation::parse(Some("TP9"), Some("Alpha"), Some("  ")),
            Err(InvalidObservation::MissingValue)
        );
        assert_eq!(
            Observation::parse(Some("TP9"), Some("Alpha"), Some("abc")),
            Err(InvalidObservation::NotANumber("abc".to_string()))
        );
        assert!(matches!(
            Observation::parse(Some("TP9"), Some("Alpha"), Some("inf")),
            Err(InvalidObservation::NonFinite(_))
        ));
    }

    #[test]
    fn test_band_powers_validation() {
        let mut powers = BandPowers {
            alpha: 45.0,
            beta: 25.0,
            gamma: 15.0,
            theta: 35.0,
            delta: 0.0,
        };
        assert!(powers.validate().is_ok());

        powers.set(Band::Alpha, -1.0);
        assert_eq!(
            powers.validate(),
            Err(ValidationError::NegativeBand {
                band: "alpha",
                value: -1.0
            })
        );

        powers.set(Band::Alpha, f64::NAN);
        assert_eq!(
            powers.validate(),
            Err(ValidationError::NonFiniteBand { band: "alpha" })
        );
    }

    #[test]
    fn test_autofill_response_shape() {
        let response = AutofillResponse {
            available: false,
            bands: BandPowers {
                alpha: 45.0,
                beta: 25.0,
                gamma: 15.0,
                theta: 35.0,
                delta: 20.0,
            },
            source: SnapshotSource::NoDataFile,
            records_count: 0,
            channel_averages: None,
            error: None,
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["alpha"], 45.0);
        assert_eq!(value["source"], "no_data_file");
        assert_eq!(value["records_count"], 0);
        assert!(value.get("channel_averages").is_none());
        assert!(value.get("error").is_none());
    }
}
