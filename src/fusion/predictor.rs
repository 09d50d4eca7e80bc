//! Predictor contracts
//!
//! The trained models are black boxes behind two traits. Their raw outputs are
//! carried as a [`ModelOutput`] tree and converted to plain JSON only when the
//! verdict is assembled.

use crate::error::{FusionError, PredictorError};
use crate::types::BandPowers;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Raw model output: scalars, tensors flattened to nested arrays, or labelled maps
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<ModelOutput>),
    Map(BTreeMap<String, ModelOutput>),
}

impl ModelOutput {
    /// Convert to JSON, rejecting values JSON cannot carry
    pub fn to_json(&self) -> Result<Value, FusionError> {
        self.to_json_at("$")
    }

    fn to_json_at(&self, path: &str) -> Result<Value, FusionError> {
        Ok(match self {
            ModelOutput::Null => Value::Null,
            ModelOutput::Bool(b) => Value::Bool(*b),
            ModelOutput::Int(i) => Value::Number((*i).into()),
            ModelOutput::Float(f) => Value::Number(finite_number(*f, path)?),
            ModelOutput::Text(s) => Value::String(s.clone()),
            ModelOutput::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item.to_json_at(&format!("{path}[{i}]")))
                    .collect::<Result<_, _>>()?,
            ),
            ModelOutput::Map(entries) => {
                let mut map = Map::new();
                for (key, item) in entries {
                    map.insert(key.clone(), item.to_json_at(&format!("{path}.{key}"))?);
                }
                Value::Object(map)
            }
        })
    }

    /// Build from already-parsed JSON
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => ModelOutput::Null,
            Value::Bool(b) => ModelOutput::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ModelOutput::Int(i),
                None => ModelOutput::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ModelOutput::Text(s),
            Value::Array(items) => {
                ModelOutput::Array(items.into_iter().map(Self::from_json).collect())
            }
            Value::Object(map) => ModelOutput::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<f64> for ModelOutput {
    fn from(value: f64) -> Self {
        ModelOutput::Float(value)
    }
}

impl From<i64> for ModelOutput {
    fn from(value: i64) -> Self {
        ModelOutput::Int(value)
    }
}

impl From<&str> for ModelOutput {
    fn from(value: &str) -> Self {
        ModelOutput::Text(value.to_string())
    }
}

impl From<Vec<f64>> for ModelOutput {
    fn from(values: Vec<f64>) -> Self {
        ModelOutput::Array(values.into_iter().map(ModelOutput::Float).collect())
    }
}

impl<K: Into<String>, V: Into<ModelOutput>> FromIterator<(K, V)> for ModelOutput {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ModelOutput::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn finite_number(value: f64, path: &str) -> Result<Number, FusionError> {
    Number::from_f64(value).ok_or_else(|| FusionError::Unserializable {
        path: path.to_string(),
        reason: format!("{value} is not a finite number"),
    })
}

/// One model's answer
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Class label, e.g. "stressed" or "neutral"
    pub label: String,
    /// Stress likelihood in [0, 1]
    pub stress_score: f64,
    /// Anything else the model emitted (probabilities, logits, ...)
    pub outputs: ModelOutput,
}

impl Prediction {
    pub fn new(label: impl Into<String>, stress_score: f64) -> Self {
        Self {
            label: label.into(),
            stress_score,
            outputs: ModelOutput::Null,
        }
    }

    pub fn with_outputs(mut self, outputs: ModelOutput) -> Self {
        self.outputs = outputs;
        self
    }

    /// Check the score before it enters the merge
    pub fn checked(self, model: &str) -> Result<Self, FusionError> {
        if self.stress_score.is_finite() && (0.0..=1.0).contains(&self.stress_score) {
            Ok(self)
        } else {
            Err(FusionError::InvalidScore {
                model: model.to_string(),
                score: self.stress_score,
            })
        }
    }
}

/// Image-based stress classifier (the CNN)
pub trait ImageClassifier: Send + Sync {
    fn name(&self) -> &str {
        "image"
    }

    /// Classify the image stored at `image_path`
    fn classify(&self, image_path: &Path) -> Result<Prediction, PredictorError>;
}

/// EEG-based stress classifier (random forest with its label decoder)
pub trait EegClassifier: Send + Sync {
    fn name(&self) -> &str {
        "eeg"
    }

    fn classify(&self, features: &BandPowers) -> Result<Prediction, PredictorError>;
}
