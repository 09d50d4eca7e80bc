//! NeuroCalm Flux - EEG snapshot normalization and image/EEG stress fusion
//!
//! Flux turns a raw headset CSV snapshot into the canonical five-band EEG
//! vector through a deterministic pipeline: snapshot reading → channel
//! aggregation → band normalization. The fusion stage combines that vector
//! with an image-based prediction into one stress verdict.
//!
//! ## Modules
//!
//! - **Autofill Pipeline**: Fail-soft snapshot → band vector conversion
//! - **Fusion**: Scoped image artifacts, pluggable predictors and merge policy

pub mod aggregator;
pub mod config;
pub mod doctor;
pub mod error;
pub mod fusion;
pub mod normalizer;
pub mod pipeline;
pub mod snapshot;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregator::{Aggregate, ChannelAggregator};
pub use config::FluxConfig;
pub use error::{FluxError, FusionError, ValidationError};
pub use fusion::{FusionCoordinator, ImagePayload, StressVerdict};
pub use normalizer::BandNormalizer;
pub use pipeline::{autofill, AutofillProcessor};
pub use types::{AutofillResponse, BandPowers, ChannelBandAverages, Observation, SnapshotSource};

/// Flux version reported by diagnostics and the CLI
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");
