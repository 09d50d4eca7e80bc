//! Stress merge policy
//!
//! Combines the image and EEG scores into one level. The default policy is a
//! normalized weighted mean followed by two thresholds.

use crate::config::FusionConfig;
use crate::fusion::predictor::Prediction;
use serde::{Deserialize, Serialize};

/// Final stress classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
}

impl StressLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StressLevel::Low => "low",
            StressLevel::Moderate => "moderate",
            StressLevel::High => "high",
        }
    }
}

/// Merged result of both predictors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedStress {
    pub level: StressLevel,
    pub score: f64,
}

/// Rule that turns two predictions into one level
pub trait MergePolicy: Send + Sync {
    fn merge(&self, image: &Prediction, eeg: &Prediction) -> MergedStress;

    /// Parameters echoed into the verdict
    fn describe(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Weighted mean of the two scores
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedMerge {
    image_weight: f64,
    eeg_weight: f64,
    low_below: f64,
    high_from: f64,
}

impl Default for WeightedMerge {
    fn default() -> Self {
        Self::from(&FusionConfig::default())
    }
}

impl From<&FusionConfig> for WeightedMerge {
    fn from(config: &FusionConfig) -> Self {
        Self {
            image_weight: config.image_weight,
            eeg_weight: config.eeg_weight,
            low_below: config.low_below,
            high_from: config.high_from,
        }
    }
}

impl WeightedMerge {
    pub fn level_for(&self, score: f64) -> StressLevel {
        if score < self.low_below {
            StressLevel::Low
        } else if score >= self.high_from {
            StressLevel::High
        } else {
            StressLevel::Moderate
        }
    }
}

impl MergePolicy for WeightedMerge {
    fn merge(&self, image: &Prediction, eeg: &Prediction) -> MergedStress {
        let total = self.image_weight + self.eeg_weight;
        let score = (self.image_weight * image.stress_score + self.eeg_weight * eeg.stress_score)
            / total;
        let score = score.clamp(0.0, 1.0);

        MergedStress {
            level: self.level_for(score),
            score,
        }
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "policy": "weighted_mean",
            "image_weight": self.image_weight,
            "eeg_weight": self.eeg_weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_mean() {
        let merge = WeightedMerge::default();
        let merged = merge.merge(&Prediction::new("stressed", 1.0), &Prediction::new("calm", 0.0));
        assert!((merged.score - 0.4).abs() < 1e-12);
        assert_eq!(merged.level, StressLevel::Moderate);
    }

    #[test]
    fn test_thresholds() {
        let merge = WeightedMerge::default();
        assert_eq!(merge.level_for(0.0), StressLevel::Low);
        assert_eq!(merge.level_for(0.3399), StressLevel::Low);
        assert_eq!(merge.level_for(0.34), StressLevel::Moderate);
        assert_eq!(merge.level_for(0.6699), StressLevel::Moderate);
        assert_eq!(merge.level_for(0.67), StressLevel::High);
        assert_eq!(merge.level_for(1.0), StressLevel::High);
    }

    #[test]
    fn test_single_source_weighting() {
        let config = FusionConfig {
            image_weight: 0.0,
            eeg_weight: 2.0,
            ..FusionConfig::default()
        };
        let merge = WeightedMerge::from(&config);
        let merged = merge.merge(&Prediction::new("x", 1.0), &Prediction::new("y", 0.8));
        assert!((merged.score - 0.8).abs() < 1e-12);
        assert_eq!(merged.level, StressLevel::High);
    }
}
