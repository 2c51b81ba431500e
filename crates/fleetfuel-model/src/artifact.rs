//! The on-disk artifact contract and its loader cache.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::net::{FuelNet, FuelNetConfig};
use crate::scaler::StandardScaler;
use crate::InferBackend;

pub const MODEL_FILE: &str = "model.bin";
pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";
pub const META_FILE: &str = "meta.json";
pub const METRICS_FILE: &str = "metrics.txt";

#[derive(Error, Debug)]
pub enum ArtifactError {
    /// The directory exists but the artifact files do not (or the
    /// directory itself is absent). The caller fails the job.
    #[error("model artifact not found under '{0}'")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact metadata error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("model record error: {0}")]
    Record(#[from] burn::record::RecorderError),

    #[error("tensor data error: {0}")]
    Data(String),
}

/// Provenance and shape sidecar. Optional for loading — the column list
/// pins the input width and the topology defaults are stable — but always
/// written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMeta {
    pub vehicle_id: String,
    pub version: String,
    pub n_features: usize,
    pub hidden: Vec<usize>,
    pub seed: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub trained_at: DateTime<Utc>,
}

/// A loaded regressor with its preprocessing: standardization in front of
/// the network, `expm1` behind it.
pub struct FuelModel {
    net: FuelNet<InferBackend>,
    pub scaler: StandardScaler,
    pub feature_columns: Vec<String>,
}

impl FuelModel {
    pub fn new(
        net: FuelNet<InferBackend>,
        scaler: StandardScaler,
        feature_columns: Vec<String>,
    ) -> Self {
        FuelModel {
            net,
            scaler,
            feature_columns,
        }
    }

    pub fn n_features(&self) -> usize {
        self.feature_columns.len()
    }

    /// Predict mL/s for a row-major matrix whose columns are exactly
    /// `feature_columns`, in order.
    pub fn predict(&self, x: &[f64], rows: usize) -> Result<Vec<f64>, ArtifactError> {
        let cols = self.n_features();
        if rows == 0 {
            return Ok(Vec::new());
        }
        let standardized: Vec<f32> = self
            .scaler
            .transformed(x, cols)
            .into_iter()
            .map(|v| v as f32)
            .collect();
        let device = <InferBackend as Backend>::Device::default();
        let xt = Tensor::<InferBackend, 2>::from_data(
            TensorData::new(standardized, [rows, cols]),
            &device,
        );
        let out: Vec<f32> = self
            .net
            .forward(xt)
            .to_data()
            .to_vec()
            .map_err(|e| ArtifactError::Data(format!("{e:?}")))?;
        Ok(out.iter().map(|v| (*v as f64).exp_m1()).collect())
    }

    /// Write the full artifact into `dir` (creating it), diagnostics
    /// excluded — those are the trainer's to add.
    pub fn save(&self, dir: &Path, meta: &ModelMeta) -> Result<(), ArtifactError> {
        fs::create_dir_all(dir)?;
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.net.clone().save_file(dir.join("model"), &recorder)?;
        serde_json::to_writer_pretty(File::create(dir.join(SCALER_FILE))?, &self.scaler)?;
        serde_json::to_writer_pretty(
            File::create(dir.join(FEATURE_COLUMNS_FILE))?,
            &self.feature_columns,
        )?;
        serde_json::to_writer_pretty(File::create(dir.join(META_FILE))?, meta)?;
        Ok(())
    }

    /// Load an artifact directory written by [`FuelModel::save`].
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let model_path = dir.join(MODEL_FILE);
        let columns_path = dir.join(FEATURE_COLUMNS_FILE);
        let scaler_path = dir.join(SCALER_FILE);
        if !model_path.is_file() || !columns_path.is_file() || !scaler_path.is_file() {
            return Err(ArtifactError::NotFound(dir.to_path_buf()));
        }
        let feature_columns: Vec<String> =
            serde_json::from_reader(File::open(&columns_path)?)?;
        let scaler: StandardScaler = serde_json::from_reader(File::open(&scaler_path)?)?;

        let mut config = FuelNetConfig::new(feature_columns.len());
        if let Ok(file) = File::open(dir.join(META_FILE)) {
            if let Ok(meta) = serde_json::from_reader::<_, ModelMeta>(file) {
                if meta.hidden.len() == 3 {
                    config = FuelNetConfig::new(feature_columns.len())
                        .with_hidden1(meta.hidden[0])
                        .with_hidden2(meta.hidden[1])
                        .with_hidden3(meta.hidden[2]);
                }
            }
        }

        let device = <InferBackend as Backend>::Device::default();
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let net = config
            .init::<InferBackend>(&device)
            .load_file(dir.join("model"), &recorder, &device)?;
        Ok(FuelModel::new(net, scaler, feature_columns))
    }
}

/// `{root}/{vehicleId}/{version}/`
pub fn artifact_dir(root: &Path, vehicle_id: &str, version: &str) -> PathBuf {
    root.join(vehicle_id).join(version)
}

/// Loader cache keyed by `(vehicleId, version)`. Artifact directories are
/// immutable once their manifest is completed, so entries never expire.
pub struct ArtifactCache {
    root: PathBuf,
    cache: Mutex<HashMap<(String, String), Arc<FuelModel>>>,
}

impl ArtifactCache {
    pub fn new(root: &Path) -> Self {
        ArtifactCache {
            root: root.to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, vehicle_id: &str, version: &str) -> Result<Arc<FuelModel>, ArtifactError> {
        let key = (vehicle_id.to_string(), version.to_string());
        if let Some(model) = self.cache.lock().expect("cache poisoned").get(&key) {
            return Ok(Arc::clone(model));
        }
        let dir = artifact_dir(&self.root, vehicle_id, version);
        let model = Arc::new(FuelModel::load(&dir)?);
        info!(vehicle_id, version, dir = %dir.display(), "model artifact loaded");
        self.cache
            .lock()
            .expect("cache poisoned")
            .insert(key, Arc::clone(&model));
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::{fit, TrainParams};
    use tempfile::tempdir;

    fn tiny_model() -> FuelModel {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let y = vec![0.5, 1.0, 1.5];
        let columns = vec!["a".to_string(), "b".to_string()];
        let params = TrainParams {
            max_epochs: 5,
            ..TrainParams::default()
        };
        fit(&x, 3, 2, &y, &columns, &params).unwrap().0
    }

    fn meta() -> ModelMeta {
        ModelMeta {
            vehicle_id: "v1".into(),
            version: "1".into(),
            n_features: 2,
            hidden: vec![64, 32, 16],
            seed: 42,
            trained_at: Utc::now(),
        }
    }

    #[test]
    fn save_load_round_trip_preserves_predictions() {
        let model = tiny_model();
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("v1").join("1");
        model.save(&artifact, &meta()).unwrap();

        for file in [MODEL_FILE, SCALER_FILE, FEATURE_COLUMNS_FILE, META_FILE] {
            assert!(artifact.join(file).is_file(), "missing {file}");
        }

        let loaded = FuelModel::load(&artifact).unwrap();
        assert_eq!(loaded.feature_columns, model.feature_columns);
        let x = vec![1.0, 2.0];
        let a = model.predict(&x, 1).unwrap();
        let b = loaded.predict(&x, 1).unwrap();
        assert!((a[0] - b[0]).abs() < 1e-6);
    }

    #[test]
    fn missing_files_are_not_found() {
        let dir = tempdir().unwrap();
        let err = FuelModel::load(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(_)));

        // A directory with only the column list is still incomplete.
        let partial = dir.path().join("partial");
        fs::create_dir_all(&partial).unwrap();
        fs::write(partial.join(FEATURE_COLUMNS_FILE), "[\"a\"]").unwrap();
        let err = FuelModel::load(&partial).unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(_)));
    }

    #[test]
    fn cache_returns_the_same_instance() {
        let model = tiny_model();
        let dir = tempdir().unwrap();
        model
            .save(&artifact_dir(dir.path(), "v1", "1"), &meta())
            .unwrap();

        let cache = ArtifactCache::new(dir.path());
        let first = cache.get("v1", "1").unwrap();
        let second = cache.get("v1", "1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(matches!(
            cache.get("v1", "2").unwrap_err(),
            ArtifactError::NotFound(_)
        ));
    }

    #[test]
    fn predictions_are_never_below_negative_one() {
        // expm1 bounds the output below at -1; the predictor clamps at 0.
        let model = tiny_model();
        let x = vec![-100.0, -100.0];
        let pred = model.predict(&x, 1).unwrap();
        assert!(pred[0] >= -1.0);
    }
}
