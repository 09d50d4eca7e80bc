//! Image + EEG stress fusion
//!
//! [`FusionCoordinator`] validates a request, stores the image as a scoped
//! artifact, asks both external predictors, merges their scores and returns a
//! JSON-only verdict. The artifact is removed on every exit path.

mod command;
mod merge;
mod predictor;
mod upload;

pub use command::CommandPredictor;
pub use merge::{MergePolicy, MergedStress, StressLevel, WeightedMerge};
pub use predictor::{EegClassifier, ImageClassifier, ModelOutput, Prediction};
pub use upload::{ImagePayload, UploadArtifact, DEFAULT_EXTENSION};

use crate::config::FluxConfig;
use crate::error::{FluxError, FusionError};
use crate::types::BandPowers;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Final verdict; contains only plain JSON values
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StressVerdict(Map<String, Value>);

impl StressVerdict {
    pub fn final_stress_level(&self) -> Option<&str> {
        self.0.get("final_stress_level").and_then(Value::as_str)
    }

    pub fn final_stress_score(&self) -> Option<f64> {
        self.0.get("final_stress_score").and_then(Value::as_f64)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_json(&self) -> Result<String, FluxError> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

/// Coordinates the two predictors for one request at a time.
///
/// Holds no per-request state; share it behind an `Arc` across workers.
pub struct FusionCoordinator {
    image: Box<dyn ImageClassifier>,
    eeg: Box<dyn EegClassifier>,
    merge: Box<dyn MergePolicy>,
    upload_dir: PathBuf,
}

impl FusionCoordinator {
    /// Create a coordinator with the default weighted merge
    pub fn new(
        image: Box<dyn ImageClassifier>,
        eeg: Box<dyn EegClassifier>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image,
            eeg,
            merge: Box::new(WeightedMerge::default()),
            upload_dir: upload_dir.into(),
        }
    }

    /// Create a coordinator using the configured upload directory and merge weights
    pub fn from_config(
        config: &FluxConfig,
        image: Box<dyn ImageClassifier>,
        eeg: Box<dyn EegClassifier>,
    ) -> Self {
        Self::new(image, eeg, config.paths.upload_dir.clone())
            .with_merge_policy(Box::new(WeightedMerge::from(&config.fusion)))
    }

    pub fn with_merge_policy(mut self, merge: Box<dyn MergePolicy>) -> Self {
        self.merge = merge;
        self
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Produce one verdict for an image and a band vector.
    ///
    /// Inputs are validated before anything touches the disk. Any predictor or
    /// serialization failure yields an error and no verdict.
    pub fn fuse(
        &self,
        image: &ImagePayload,
        features: &BandPowers,
    ) -> Result<StressVerdict, FluxError> {
        features.validate()?;
        image.validate()?;

        let artifact =
            UploadArtifact::create(&self.upload_dir, image).map_err(FusionError::Artifact)?;
        info!(
            artifact = %artifact.file_name(),
            alpha = features.alpha,
            beta = features.beta,
            gamma = features.gamma,
            theta = features.theta,
            delta = features.delta,
            "processing fusion request"
        );

        let result = self.run(artifact.path(), features);

        if let Err(e) = artifact.close() {
            warn!(error = %e, "failed to remove upload artifact");
        }

        match &result {
            Ok(verdict) => info!(
                level = verdict.final_stress_level().unwrap_or_default(),
                "prediction complete"
            ),
            Err(e) => warn!(error = %e, "prediction failed"),
        }

        result.map_err(FluxError::from)
    }

    fn run(&self, image_path: &Path, features: &BandPowers) -> Result<StressVerdict, FusionError> {
        let image_model = self.image.name().to_string();
        let image_prediction = self
            .image
            .classify(image_path)
            .map_err(|e| FusionError::Predictor {
                model: image_model.clone(),
                message: e.to_string(),
            })?
            .checked(&image_model)?;
        debug!(
            label = %image_prediction.label,
            score = image_prediction.stress_score,
            "image prediction"
        );

        let eeg_model = self.eeg.name().to_string();
        let eeg_prediction = self
            .eeg
            .classify(features)
            .map_err(|e| FusionError::Predictor {
                model: eeg_model.clone(),
                message: e.to_string(),
            })?
            .checked(&eeg_model)?;
        debug!(
            label = %eeg_prediction.label,
            score = eeg_prediction.stress_score,
            "eeg prediction"
        );

        let merged = self.merge.merge(&image_prediction, &eeg_prediction);

        let mut verdict = Map::new();
        verdict.insert("final_stress_level".into(), json!(merged.level.as_str()));
        verdict.insert("final_stress_score".into(), finite(merged.score, "$.final_stress_score")?);
        verdict.insert("image".into(), prediction_json(&image_model, &image_prediction)?);
        verdict.insert("eeg".into(), prediction_json(&eeg_model, &eeg_prediction)?);
        verdict.insert("eeg_input".into(), serde_json::to_value(features).map_err(|e| {
            FusionError::Unserializable {
                path: "$.eeg_input".into(),
                reason: e.to_string(),
            }
        })?);
        let policy = self.merge.describe();
        if !policy.is_null() {
            verdict.insert("merge".into(), policy);
        }

        Ok(StressVerdict(verdict))
    }
}

fn prediction_json(model: &str, prediction: &Prediction) -> Result<Value, FusionError> {
    Ok(json!({
        "model": model,
        "label": prediction.label,
        "stress_score": finite(prediction.stress_score, &format!("$.{model}.stress_score"))?,
        "outputs": prediction.outputs.to_json()?,
    }))
}

fn finite(value: f64, path: &str) -> Result<Value, FusionError> {
    ModelOutput::Float(value)
        .to_json()
        .map_err(|_| FusionError::Unserializable {
            path: path.to_string(),
            reason: format!("{value} is not a finite number"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PredictorError, ValidationError};
    use std::sync::{Arc, Mutex};

    /// Scores an image by the mean of its bytes and records what it saw
    #[derive(Default)]
    struct ByteMeanImage {
        seen: Mutex<Vec<PathBuf>>,
    }

    impl ImageClassifier for ByteMeanImage {
        fn name(&self) -> &str {
            "cnn"
        }

        fn classify(&self, image_path: &Path) -> Result<Prediction, PredictorError> {
            let bytes = std::fs::read(image_path).map_err(|e| PredictorError::new(e.to_string()))?;
            self.seen.lock().unwrap().push(image_path.to_path_buf());
            let mean = bytes.iter().map(|b| *b as f64).sum::<f64>() / bytes.len() as f64 / 255.0;
            let outputs = ModelOutput::from(vec![1.0 - mean, mean]);
            Ok(Prediction::new("face", mean).with_outputs(outputs))
        }
    }

    impl ImageClassifier for Arc<ByteMeanImage> {
        fn name(&self) -> &str {
            "cnn"
        }

        fn classify(&self, image_path: &Path) -> Result<Prediction, PredictorError> {
            self.as_ref().classify(image_path)
        }
    }

    /// Scores EEG by the beta / (alpha + beta) ratio
    struct BetaRatioEeg;

    impl EegClassifier for BetaRatioEeg {
        fn name(&self) -> &str {
            "random_forest"
        }

        fn classify(&self, features: &BandPowers) -> Result<Prediction, PredictorError> {
            let score = features.beta / (features.alpha + features.beta);
            let label = if score > 0.5 { "stressed" } else { "relaxed" };
            let outputs = [("class_index", ModelOutput::Int(i64::from(score > 0.5)))]
                .into_iter()
                .collect();
            Ok(Prediction::new(label, score).with_outputs(outputs))
        }
    }

    struct FailingImage;

    impl ImageClassifier for FailingImage {
        fn classify(&self, image_path: &Path) -> Result<Prediction, PredictorError> {
            assert!(image_path.exists());
            Err(PredictorError::new("model file corrupt"))
        }
    }

    struct NanEeg;

    impl EegClassifier for NanEeg {
        fn classify(&self, _features: &BandPowers) -> Result<Prediction, PredictorError> {
            Ok(Prediction::new("stressed", 0.5).with_outputs(ModelOutput::from(vec![f64::NAN])))
        }
    }

    fn features() -> BandPowers {
        BandPowers {
            alpha: 45.0,
            beta: 25.0,
            gamma: 15.0,
            theta: 35.0,
            delta: 20.0,
        }
    }

    fn png(bytes: &[u8]) -> ImagePayload {
        ImagePayload::new(bytes.to_vec())
            .with_file_name("face.png")
            .with_content_type("image/png")
    }

    fn dir_is_empty(path: &Path) -> bool {
        !path.exists() || std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[test]
    fn test_fuse_produces_verdict_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let image = Arc::new(ByteMeanImage::default());
        let coordinator = FusionCoordinator::new(
            Box::new(Arc::clone(&image)),
            Box::new(BetaRatioEeg),
            dir.path().join("uploads"),
        );

        let verdict = coordinator.fuse(&png(&[255, 255, 0, 0]), &features()).unwrap();

        // image 0.5, eeg 25/70; 0.4 * 0.5 + 0.6 * 0.357 = 0.414
        let expected = 0.4 * 0.5 + 0.6 * (25.0 / 70.0);
        assert!((verdict.final_stress_score().unwrap() - expected).abs() < 1e-12);
        assert_eq!(verdict.final_stress_level(), Some("moderate"));
        assert_eq!(verdict.get("image").unwrap()["label"], "face");
        assert_eq!(verdict.get("image").unwrap()["outputs"], json!([0.5, 0.5]));
        assert_eq!(verdict.get("eeg").unwrap()["label"], "relaxed");
        assert_eq!(verdict.get("eeg_input").unwrap()["theta"], 35.0);

        let seen = image.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].extension().unwrap(), "png");
        assert!(!seen[0].exists());
        assert!(dir_is_empty(&dir.path().join("uploads")));
    }

    #[test]
    fn test_fuse_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = FusionCoordinator::new(
            Box::new(ByteMeanImage::default()),
            Box::new(BetaRatioEeg),
            dir.path(),
        );

        let image = png(&[10, 20, 30, 40, 50]);
        let first = coordinator.fuse(&image, &features()).unwrap().to_json().unwrap();
        let second = coordinator.fuse(&image, &features()).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_negative_band_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");
        let image = Arc::new(ByteMeanImage::default());
        let coordinator = FusionCoordinator::new(
            Box::new(Arc::clone(&image)),
            Box::new(BetaRatioEeg),
            &upload_dir,
        );

        let mut bad = features();
        bad.alpha = -1.0;
        let err = coordinator.fuse(&png(&[1, 2, 3]), &bad).unwrap_err();

        assert!(matches!(
            err,
            FluxError::Validation(ValidationError::NegativeBand { band: "alpha", .. })
        ));
        assert!(!upload_dir.exists());
        assert!(image.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_non_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = FusionCoordinator::new(
            Box::new(ByteMeanImage::default()),
            Box::new(BetaRatioEeg),
            dir.path().join("uploads"),
        );

        let upload = ImagePayload::new(b"%PDF".to_vec()).with_content_type("application/pdf");
        let err = coordinator.fuse(&upload, &features()).unwrap_err();
        assert!(matches!(err, FluxError::Validation(ValidationError::NotAnImage(_))));
        assert!(dir_is_empty(&dir.path().join("uploads")));
    }

    #[test]
    fn test_predictor_failure_removes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator =
            FusionCoordinator::new(Box::new(FailingImage), Box::new(BetaRatioEeg), dir.path());

        let err = coordinator.fuse(&png(&[7; 16]), &features()).unwrap_err();
        match err {
            FluxError::Fusion(FusionError::Predictor { model, message }) => {
                assert_eq!(model, "image");
                assert_eq!(message, "model file corrupt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(dir_is_empty(dir.path()));
    }

    #[test]
    fn test_unserializable_output_is_fusion_failure() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = FusionCoordinator::new(
            Box::new(ByteMeanImage::default()),
            Box::new(NanEeg),
            dir.path(),
        );

        let err = coordinator.fuse(&png(&[1]), &features()).unwrap_err();
        assert!(matches!(
            err,
            FluxError::Fusion(FusionError::Unserializable { .. })
        ));
        assert!(dir_is_empty(dir.path()));
    }

    #[test]
    fn test_config_weights_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FluxConfig::default();
        config.paths.upload_dir = dir.path().to_path_buf();
        config.fusion.image_weight = 1.0;
        config.fusion.eeg_weight = 0.0;

        let coordinator = FusionCoordinator::from_config(
            &config,
            Box::new(ByteMeanImage::default()),
            Box::new(BetaRatioEeg),
        );
        assert_eq!(coordinator.upload_dir(), dir.path());

        let verdict = coordinator.fuse(&png(&[255]), &features()).unwrap();
        assert_eq!(verdict.final_stress_score(), Some(1.0));
        assert_eq!(verdict.final_stress_level(), Some("high"));
        assert_eq!(verdict.get("merge").unwrap()["image_weight"], 1.0);
    }

    #[test]
    fn test_concurrent_requests_do_not_interfere() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = FusionCoordinator::new(
            Box::new(ByteMeanImage::default()),
            Box::new(BetaRatioEeg),
            dir.path(),
        );

        let verdicts: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8u8)
                .map(|i| {
                    let coordinator = &coordinator;
                    scope.spawn(move || {
                        coordinator
                            .fuse(&png(&[i * 30]), &features())
                            .unwrap()
                            .to_json()
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (i, verdict) in verdicts.iter().enumerate() {
            let expected = coordinator
                .fuse(&png(&[i as u8 * 30]), &features())
                .unwrap()
                .to_json()
                .unwrap();
            assert_eq!(verdict, &expected);
        }
        assert!(dir_is_empty(dir.path()));
    }
}
