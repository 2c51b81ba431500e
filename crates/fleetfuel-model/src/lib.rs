//! # fleetfuel-model: Model Artifact
//!
//! The regressor, its preprocessing, and the on-disk contract binding
//! trainer to predictor.
//!
//! An artifact directory `{models_root}/{vehicleId}/{version}/` holds:
//!
//! - `model.bin` — binary record of the feed-forward network,
//! - `scaler.json` — per-feature standardization fitted on the training
//!   matrix,
//! - `feature_columns.json` — the ordered input contract,
//! - `meta.json` — shape and provenance (optional for loading),
//! - `metrics.txt`, `plots/` — diagnostics, consumed by nobody.
//!
//! Training applies `log1p` to the target and fits on standardized inputs;
//! [`FuelModel::predict`] undoes both, so callers always see mL/s.

pub mod artifact;
pub mod metrics;
pub mod net;
pub mod scaler;
pub mod train;

pub use artifact::{artifact_dir, ArtifactCache, ArtifactError, FuelModel, ModelMeta};
pub use metrics::{mae, r2, regression_metrics, rmse, RegressionMetrics};
pub use net::{FuelNet, FuelNetConfig};
pub use scaler::StandardScaler;
pub use train::{fit, TrainParams, TrainReport};

/// Inference backend: plain CPU ndarray.
pub type InferBackend = burn::backend::NdArray<f32>;
/// Training backend: the same, wrapped for automatic differentiation.
pub type TrainBackend = burn::backend::Autodiff<InferBackend>;
