//! Process-backed predictors
//!
//! Runs a configured external program once per prediction. The image model
//! receives the artifact path as its last argument; the EEG model receives the
//! band vector as JSON on stdin. Both answer with one JSON object on stdout:
//! `{"label": "...", "stress_score": 0.0, "outputs": ...}`.

use crate::config::PredictorCommand;
use crate::error::PredictorError;
use crate::fusion::predictor::{EegClassifier, ImageClassifier, ModelOutput, Prediction};
use crate::types::BandPowers;
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PredictionWire {
    label: String,
    stress_score: f64,
    #[serde(default)]
    outputs: serde_json::Value,
}

/// Predictor that shells out to an external model runner
#[derive(Debug, Clone)]
pub struct CommandPredictor {
    name: String,
    command: PredictorCommand,
}

impl CommandPredictor {
    pub fn new(name: impl Into<String>, command: PredictorCommand) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.command.program);
        command.args(&self.command.args);
        command
    }

    fn parse_output(&self, output: Output) -> Result<Prediction, PredictorError> {
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PredictorError::new(format!(
                "{} exited with {}: {}",
                self.command.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let wire: PredictionWire = serde_json::from_slice(&output.stdout).map_err(|e| {
            PredictorError::new(format!("invalid predictor output: {e}"))
        })?;
        debug!(model = %self.name, label = %wire.label, "predictor answered");

        Ok(Prediction::new(wire.label, wire.stress_score)
            .with_outputs(ModelOutput::from_json(wire.outputs)))
    }

    fn spawn_error(&self, e: std::io::Error) -> PredictorError {
        PredictorError::new(format!(
            "failed to run {}: {}",
            self.command.program.display(),
            e
        ))
    }
}

impl ImageClassifier for CommandPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, image_path: &Path) -> Result<Prediction, PredictorError> {
        let output = self
            .base_command()
            .arg(image_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;
        self.parse_output(output)
    }
}

impl EegClassifier for CommandPredictor {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, features: &BandPowers) -> Result<Prediction, PredictorError> {
        let input = serde_json::to_vec(features)
            .map_err(|e| PredictorError::new(format!("failed to encode features: {e}")))?;

        let mut child = self
            .base_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A runner may exit without reading stdin; its exit status decides
            if let Err(e) = stdin.write_all(&input) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(PredictorError::new(format!("failed to send features: {e}")));
                }
            }
        }

        let output = child.wait_with_output().map_err(|e| self.spawn_error(e))?;
        self.parse_output(output)
    }
}
