//! Configuration file handling
//!
//! Every tunable of the pipeline lives here as immutable data: electrode slot
//! defaults, band synthesis rules, the fallback vector, the fusion policy and
//! the on-disk locations. Values are loaded from `neurocalm.toml`; every field
//! has a default so a partial file is valid.

use crate::error::FluxError;
use crate::types::{Band, BandPowers};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "neurocalm.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FluxConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub normalizer: NormalizerConfig,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub models: ModelsConfig,
}

/// File system locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// CSV snapshot written by the headset recorder
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,

    /// Directory that holds per-request image artifacts
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot(),
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_snapshot() -> PathBuf {
    PathBuf::from("eeg_live_data.csv")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

/// An electrode slot and the value used when the electrode is absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectrodeSlot {
    pub channel: String,
    pub default: f64,
}

/// Linear band synthesis rule: `clamp(avg * factor, min, max)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandRule {
    pub band: Band,
    pub factor: f64,
    pub min: f64,
    pub max: f64,
}

impl BandRule {
    /// Always lands in `[min, max]`; an undefined product maps to `min`
    pub fn apply(&self, avg_value: f64) -> f64 {
        let scaled = avg_value * self.factor;
        if scaled.is_nan() {
            self.min
        } else {
            scaled.clamp(self.min, self.max)
        }
    }
}

/// Band normalizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_electrodes")]
    pub electrodes: Vec<ElectrodeSlot>,

    #[serde(default = "default_rules")]
    pub rules: Vec<BandRule>,

    /// Returned verbatim when no data is available
    #[serde(default = "default_baseline")]
    pub baseline: BandPowers,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            electrodes: default_electrodes(),
            rules: default_rules(),
            baseline: default_baseline(),
        }
    }
}

impl NormalizerConfig {
    pub fn rule(&self, band: Band) -> Option<&BandRule> {
        self.rules.iter().find(|rule| rule.band == band)
    }
}

fn default_electrodes() -> Vec<ElectrodeSlot> {
    [("TP9", 45.0), ("AF7", 25.0), ("AF8", 15.0), ("TP10", 35.0)]
        .into_iter()
        .map(|(channel, default)| ElectrodeSlot {
            channel: channel.to_string(),
            default,
        })
        .collect()
}

fn default_rules() -> Vec<BandRule> {
    vec![
        BandRule {
            band: Band::Alpha,
            factor: 1.1,
            min: 30.0,
            max: 80.0,
        },
        BandRule {
            band: Band::Beta,
            factor: 0.8,
            min: 15.0,
            max: 50.0,
        },
        BandRule {
            band: Band::Gamma,
            factor: 0.5,
            min: 5.0,
            max: 30.0,
        },
        BandRule {
            band: Band::Theta,
            factor: 0.9,
            min: 20.0,
            max: 60.0,
        },
        BandRule {
            band: Band::Delta,
            factor: 0.6,
            min: 10.0,
            max: 40.0,
        },
    ]
}

fn default_baseline() -> BandPowers {
    BandPowers {
        alpha: 45.0,
        beta: 25.0,
        gamma: 15.0,
        theta: 35.0,
        delta: 20.0,
    }
}

/// Weighted merge of the image and EEG stress scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default = "default_image_weight")]
    pub image_weight: f64,

    #[serde(default = "default_eeg_weight")]
    pub eeg_weight: f64,

    /// Merged scores below this are "low"
    #[serde(default = "default_low_below")]
    pub low_below: f64,

    /// Merged scores at or above this are "high"
    #[serde(default = "default_high_from")]
    pub high_from: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            image_weight: default_image_weight(),
            eeg_weight: default_eeg_weight(),
            low_below: default_low_below(),
            high_from: default_high_from(),
        }
    }
}

fn default_image_weight() -> f64 {
    0.4
}

fn default_eeg_weight() -> f64 {
    0.6
}

fn default_low_below() -> f64 {
    0.34
}

fn default_high_from() -> f64 {
    0.67
}

/// External program that answers one prediction per invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorCommand {
    pub program: PathBuf,

    #[serde(default)]
    pub args: Vec<String>,
}

/// External model locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_models_dir")]
    pub dir: PathBuf,

    /// Files checked by `doctor`, relative to `dir`
    #[serde(default = "default_model_files")]
    pub files: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PredictorCommand>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eeg: Option<PredictorCommand>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
            files: default_model_files(),
            image: None,
            eeg: None,
        }
    }
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_files() -> Vec<String> {
    [
        "random_forest_model.pkl",
        "scaler.pkl",
        "label_encoder.pkl",
        "cnn_emotion_model.h5",
        "lstm_emotion_model.h5",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl FluxConfig {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> Result<Self, FluxError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FluxError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| FluxError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, FluxError> {
        let config: FluxConfig =
            toml::from_str(content).map_err(|e| FluxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load configuration from the working directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>, FluxError> {
        let path = Path::new(CONFIG_FILE_NAME);
        if path.exists() {
            Ok(Some(Self::load(path)?))
        } else {
            Ok(None)
        }
    }

    /// Generate default configuration file content
    pub fn default_toml() -> Result<String, FluxError> {
        toml::to_string_pretty(&FluxConfig::default()).map_err(|e| FluxError::Config(e.to_string()))
    }

    /// Reject configurations that would break the normalizer or fusion invariants
    pub fn validate(&self) -> Result<(), FluxError> {
        let normalizer = &self.normalizer;

        for slot in &normalizer.electrodes {
            if slot.channel.trim().is_empty() {
                return Err(FluxError::Config("electrode slot with empty channel".into()));
            }
            if !slot.default.is_finite() {
                return Err(FluxError::Config(format!(
                    "electrode {} has a non-finite default",
                    slot.channel
                )));
            }
        }

        for band in Band::ALL {
            let count = normalizer.rules.iter().filter(|r| r.band == band).count();
            if count != 1 {
                return Err(FluxError::Config(format!(
                    "expected exactly one rule for {}, found {}",
                    band.as_str(),
                    count
                )));
            }
        }

        for rule in &normalizer.rules {
            let finite = rule.factor.is_finite() && rule.min.is_finite() && rule.max.is_finite();
            if !finite || rule.min > rule.max {
                return Err(FluxError::Config(format!(
                    "invalid rule for {}: factor {}, range [{}, {}]",
                    rule.band.as_str(),
                    rule.factor,
                    rule.min,
                    rule.max
                )));
            }
        }

        normalizer
            .baseline
            .validate()
            .map_err(|e| FluxError::Config(format!("baseline: {}", e)))?;

        let fusion = &self.fusion;
        let weights_ok = fusion.image_weight.is_finite()
            && fusion.eeg_weight.is_finite()
            && fusion.image_weight >= 0.0
            && fusion.eeg_weight >= 0.0
            && fusion.image_weight + fusion.eeg_weight > 0.0;
        if !weights_ok {
            return Err(FluxError::Config(format!(
                "fusion weights must be non-negative with a positive sum (image {}, eeg {})",
                fusion.image_weight, fusion.eeg_weight
            )));
        }

        if !(0.0..=1.0).contains(&fusion.low_below)
            || !(0.0..=1.0).contains(&fusion.high_from)
            || fusion.low_below > fusion.high_from
        {
            return Err(FluxError::Config(format!(
                "fusion thresholds must satisfy 0 <= low_below <= high_from <= 1 (got {}, {})",
                fusion.low_below, fusion.high_from
            )));
        }

        Ok(())
    }
}
