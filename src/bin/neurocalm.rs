//! NeuroCalm CLI - Command-line interface for NeuroCalm Flux
//!
//! Commands:
//! - autofill: Derive the canonical band vector from the headset snapshot
//! - fuse: Combine an image and a band vector into a stress verdict
//! - doctor: Diagnose snapshot, upload directory and model files
//! - init-config: Write a default neurocalm.toml

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use neurocalm_flux::config::{FluxConfig, CONFIG_FILE_NAME};
use neurocalm_flux::doctor::{self, CheckStatus, DoctorReport};
use neurocalm_flux::fusion::{CommandPredictor, FusionCoordinator, ImagePayload};
use neurocalm_flux::{autofill, BandPowers, FluxError, FLUX_VERSION};

/// NeuroCalm - EEG band autofill and image/EEG stress fusion
#[derive(Parser)]
#[command(name = "neurocalm")]
#[command(author = "NeuroCalm Team")]
#[command(version = FLUX_VERSION)]
#[command(about = "Normalize EEG snapshots and fuse stress predictions", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./neurocalm.toml when present)
    #[arg(short, long, global = true, env = "NEUROCALM_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the canonical band vector from the headset snapshot
    Autofill {
        /// Snapshot CSV (overrides paths.snapshot)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,

        /// Output format (pretty when stdout is a terminal)
        #[arg(long)]
        output_format: Option<OutputFormat>,
    },

    /// Combine an image and a band vector into a stress verdict
    Fuse {
        /// Image file
        #[arg(short, long)]
        image: PathBuf,

        #[arg(long, allow_negative_numbers = true)]
        alpha: f64,

        #[arg(long, allow_negative_numbers = true)]
        beta: f64,

        #[arg(long, allow_negative_numbers = true)]
        gamma: f64,

        #[arg(long, allow_negative_numbers = true)]
        theta: f64,

        #[arg(long, allow_negative_numbers = true)]
        delta: f64,

        /// Upload directory (overrides paths.upload_dir)
        #[arg(long)]
        upload_dir: Option<PathBuf>,

        /// Output format (pretty when stdout is a terminal)
        #[arg(long)]
        output_format: Option<OutputFormat>,
    },

    /// Diagnose snapshot, upload directory and model files
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination path
        #[arg(default_value = CONFIG_FILE_NAME)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON on one line
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging on stderr so stdout stays pure JSON
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("NEUROCALM_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(cli: Cli) -> Result<(), NeuroCliError> {
    match cli.command {
        Commands::Autofill {
            snapshot,
            output_format,
        } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_autofill(&config, snapshot.as_deref(), output_format)
        }

        Commands::Fuse {
            image,
            alpha,
            beta,
            gamma,
            theta,
            delta,
            upload_dir,
            output_format,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let features = BandPowers {
                alpha,
                beta,
                gamma,
                theta,
                delta,
            };
            cmd_fuse(&config, &image, features, upload_dir, output_format)
        }

        Commands::Doctor { json } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_doctor(&config, json)
        }

        Commands::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn load_config(path: Option<&Path>) -> Result<FluxConfig, NeuroCliError> {
    let config = match path {
        Some(path) => {
            info!("Loading config from: {}", path.display());
            FluxConfig::load(path)?
        }
        None => match FluxConfig::load_default()? {
            Some(config) => {
                info!("Loaded config from {}", CONFIG_FILE_NAME);
                config
            }
            None => {
                debug!("No config file found, using defaults");
                FluxConfig::default()
            }
        },
    };
    Ok(config)
}

fn cmd_autofill(
    config: &FluxConfig,
    snapshot: Option<&Path>,
    output_format: Option<OutputFormat>,
) -> Result<(), NeuroCliError> {
    let snapshot = snapshot.unwrap_or(config.paths.snapshot.as_path());
    let response = autofill(snapshot, config);
    println!("{}", format_output(&response, output_format)?);
    Ok(())
}

fn cmd_fuse(
    config: &FluxConfig,
    image: &Path,
    features: BandPowers,
    upload_dir: Option<PathBuf>,
    output_format: Option<OutputFormat>,
) -> Result<(), NeuroCliError> {
    // Reject bad parameters before touching the image or the models
    features.validate().map_err(FluxError::from)?;

    let mut config = config.clone();
    if let Some(dir) = upload_dir {
        config.paths.upload_dir = dir;
    }

    let image_command = config
        .models
        .image
        .clone()
        .ok_or(NeuroCliError::PredictorMissing("models.image"))?;
    let eeg_command = config
        .models
        .eeg
        .clone()
        .ok_or(NeuroCliError::PredictorMissing("models.eeg"))?;

    let payload = ImagePayload::from_path(image)?;

    let coordinator = FusionCoordinator::from_config(
        &config,
        Box::new(CommandPredictor::new("image", image_command)),
        Box::new(CommandPredictor::new("eeg", eeg_command)),
    );

    let verdict = coordinator.fuse(&payload, &features)?;
    println!("{}", format_output(&verdict, output_format)?);
    Ok(())
}

fn cmd_doctor(config: &FluxConfig, json: bool) -> Result<(), NeuroCliError> {
    let report = doctor::run(config);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_doctor_report(&report);
    }

    if report.has_errors() {
        Err(NeuroCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn print_doctor_report(report: &DoctorReport) {
    println!("NeuroCalm Doctor Report");
    println!("=======================");
    println!("Version: {}", report.version);
    println!("\nChecks:");

    for check in &report.checks {
        let status_icon = match check.status {
            CheckStatus::Ok => "[OK]",
            CheckStatus::Warning => "[WARN]",
            CheckStatus::Error => "[ERR]",
        };
        println!("  {} {}: {}", status_icon, check.name, check.message);
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<(), NeuroCliError> {
    if path.exists() && !force {
        return Err(NeuroCliError::ConfigExists(path.to_path_buf()));
    }

    let content = FluxConfig::default_toml()?;
    fs::write(path, content)?;
    println!("Created {} with default settings.", path.display());
    Ok(())
}

// Helper functions

fn format_output<T: serde::Serialize>(
    value: &T,
    format: Option<OutputFormat>,
) -> Result<String, NeuroCliError> {
    let pretty = match format {
        Some(OutputFormat::Json) => false,
        Some(OutputFormat::JsonPretty) => true,
        None => atty::is(atty::Stream::Stdout),
    };

    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

// Error types

#[derive(Debug)]
enum NeuroCliError {
    Io(io::Error),
    Flux(FluxError),
    Json(serde_json::Error),
    PredictorMissing(&'static str),
    ConfigExists(PathBuf),
    DoctorFailed,
}

impl From<io::Error> for NeuroCliError {
    fn from(e: io::Error) -> Self {
        NeuroCliError::Io(e)
    }
}

impl From<FluxError> for NeuroCliError {
    fn from(e: FluxError) -> Self {
        NeuroCliError::Flux(e)
    }
}

impl From<serde_json::Error> for NeuroCliError {
    fn from(e: serde_json::Error) -> Self {
        NeuroCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<NeuroCliError> for CliError {
    fn from(e: NeuroCliError) -> Self {
        match e {
            NeuroCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            NeuroCliError::Flux(FluxError::Validation(e)) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Provide an image file and non-negative band values".to_string()),
            },
            NeuroCliError::Flux(e @ FluxError::Fusion(_)) => CliError {
                code: "FUSION_FAILED".to_string(),
                message: e.to_string(),
                hint: Some("Run 'neurocalm doctor' to check the model files".to_string()),
            },
            NeuroCliError::Flux(e @ FluxError::Config(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'neurocalm init-config' for a valid template".to_string()),
            },
            NeuroCliError::Flux(e) => CliError {
                code: "PROCESSING_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            NeuroCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            NeuroCliError::PredictorMissing(key) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: format!("No predictor configured under [{}]", key),
                hint: Some(
                    "Set program and args for both [models.image] and [models.eeg]".to_string(),
                ),
            },
            NeuroCliError::ConfigExists(path) => CliError {
                code: "CONFIG_EXISTS".to_string(),
                message: format!("{} already exists", path.display()),
                hint: Some("Pass --force to overwrite it".to_string()),
            },
            NeuroCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}
