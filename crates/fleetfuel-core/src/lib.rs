//! # fleetfuel-core: Telemetry Domain Core
//!
//! Foundational types and numeric kernels for the FleetFuel pipeline.
//!
//! This crate sits at the bottom of the workspace and carries:
//! - the flat semantic view of telemetry documents (samples, trips, model
//!   manifests, prediction summaries, queue payloads),
//! - the feature-pipeline configuration with environment overrides,
//! - the geo/time kernels every derived signal is built from: great-circle
//!   distance, NaN-aware rolling statistics, irregular-grid differencing.
//!
//! The kernels are pure: no I/O, no error returns. Ill-defined elements
//! (empty windows, non-positive time deltas, missing inputs) come back as
//! NaN and are resolved by the feature pipeline's imputation policy.

pub mod config;
pub mod geo;
pub mod series;
pub mod types;

pub use config::{FeatureConfig, ServiceConfig};
pub use types::{
    GpsBlock, ManifestStatus, ModelManifest, ModelMetrics, ObdBlock, PredictJob,
    PredictionSummary, SampleDoc, SampleRow, TrainJob, TripDoc,
};
