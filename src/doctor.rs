//! Environment diagnostics
//!
//! Checks the pieces a deployment needs before serving requests: the snapshot
//! file, a writable upload directory and the trained model files.

use crate::config::FluxConfig;
use crate::snapshot::{Snapshot, SnapshotReader};
use crate::FLUX_VERSION;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl DoctorCheck {
    fn new(name: impl Into<String>, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorReport {
    pub version: String,
    pub checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    pub fn has_errors(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Error)
    }
}

/// Run every check against `config`
pub fn run(config: &FluxConfig) -> DoctorReport {
    let mut checks = vec![DoctorCheck::new(
        "version",
        CheckStatus::Ok,
        format!("neurocalm-flux {}", FLUX_VERSION),
    )];

    checks.push(check_snapshot(&config.paths.snapshot));
    checks.push(check_upload_dir(&config.paths.upload_dir));

    for file in &config.models.files {
        checks.push(check_model_file(&config.models.dir.join(file), file));
    }

    let predictors = [
        ("image_predictor", &config.models.image),
        ("eeg_predictor", &config.models.eeg),
    ];
    for (name, command) in predictors {
        checks.push(match command {
            Some(command) => DoctorCheck::new(
                name,
                CheckStatus::Ok,
                format!("{} {}", command.program.display(), command.args.join(" "))
                    .trim_end()
                    .to_string(),
            ),
            None => DoctorCheck::new(name, CheckStatus::Warning, "not configured"),
        });
    }

    DoctorReport {
        version: FLUX_VERSION.to_string(),
        checks,
    }
}

fn check_snapshot(path: &Path) -> DoctorCheck {
    match SnapshotReader::read_path(path) {
        Ok(Snapshot::Missing) => DoctorCheck::new(
            "snapshot",
            CheckStatus::Warning,
            format!("{} does not exist yet; start EEG recording", path.display()),
        ),
        Ok(Snapshot::Rows(rows)) => {
            let modified = fs::metadata(path)
                .and_then(|m| m.modified())
                .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
                .unwrap_or_else(|_| "unknown".to_string());
            let status = if rows.is_empty() {
                CheckStatus::Warning
            } else {
                CheckStatus::Ok
            };
            DoctorCheck::new(
                "snapshot",
                status,
                format!("{} rows, last modified {}", rows.len(), modified),
            )
        }
        Err(e) => DoctorCheck::new("snapshot", CheckStatus::Error, e.to_string()),
    }
}

fn check_upload_dir(path: &Path) -> DoctorCheck {
    let probe = fs::create_dir_all(path).and_then(|_| tempfile::tempfile_in(path));
    match probe {
        Ok(_) => DoctorCheck::new(
            "upload_dir",
            CheckStatus::Ok,
            format!("{} is writable", path.display()),
        ),
        Err(e) => DoctorCheck::new(
            "upload_dir",
            CheckStatus::Error,
            format!("{} is not writable: {}", path.display(), e),
        ),
    }
}

fn check_model_file(path: &Path, name: &str) -> DoctorCheck {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => DoctorCheck::new(
            format!("model:{name}"),
            CheckStatus::Ok,
            format!("{} bytes", meta.len()),
        ),
        Ok(meta) if meta.is_file() => DoctorCheck::new(
            format!("model:{name}"),
            CheckStatus::Error,
            format!("{} is empty", path.display()),
        ),
        Ok(_) => DoctorCheck::new(
            format!("model:{name}"),
            CheckStatus::Error,
            format!("{} is not a file", path.display()),
        ),
        Err(e) => DoctorCheck::new(
            format!("model:{name}"),
            CheckStatus::Error,
            format!("{}: {}", path.display(), e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of<'a>(report: &'a DoctorReport, name: &str) -> &'a DoctorCheck {
        report
            .checks
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("no check named {name}"))
    }

    #[test]
    fn test_healthy_environment() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FluxConfig::default();
        config.paths.snapshot = dir.path().join("eeg.csv");
        config.paths.upload_dir = dir.path().join("uploads");
        config.models.dir = dir.path().join("models");
        config.models.files = vec!["cnn_emotion_model.h5".to_string()];

        fs::write(&config.paths.snapshot, "Channel,Band,Value\nTP9,Alpha,1\n").unwrap();
        fs::create_dir_all(&config.models.dir).unwrap();
        fs::write(config.models.dir.join("cnn_emotion_model.h5"), [0u8; 32]).unwrap();

        let report = run(&config);
        assert!(!report.has_errors(), "{report:?}");
        assert_eq!(status_of(&report, "snapshot").status, CheckStatus::Ok);
        assert!(status_of(&report, "snapshot").message.starts_with("1 rows"));
        assert_eq!(status_of(&report, "upload_dir").status, CheckStatus::Ok);
        assert_eq!(
            status_of(&report, "model:cnn_emotion_model.h5").message,
            "32 bytes"
        );
        assert_eq!(status_of(&report, "image_predictor").status, CheckStatus::Warning);
    }

    #[test]
    fn test_missing_models_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FluxConfig::default();
        config.paths.snapshot = dir.path().join("absent.csv");
        config.paths.upload_dir = dir.path().join("uploads");
        config.models.dir = dir.path().join("models");

        let report = run(&config);
        assert!(report.has_errors());
        assert_eq!(status_of(&report, "snapshot").status, CheckStatus::Warning);
        assert_eq!(
            status_of(&report, "model:random_forest_model.pkl").status,
            CheckStatus::Error
        );
        assert_eq!(
            report.checks.iter().filter(|c| c.name.starts_with("model:")).count(),
            5
        );
    }

    #[test]
    fn test_malformed_snapshot_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FluxConfig::default();
        config.paths.snapshot = dir.path().join("eeg.csv");
        config.paths.upload_dir = dir.path().join("uploads");
        config.models.files.clear();
        fs::write(&config.paths.snapshot, "Channel,Band,Value\nTP9,Alpha,x\n").unwrap();

        let report = run(&config);
        assert_eq!(status_of(&report, "snapshot").status, CheckStatus::Error);
    }
}
