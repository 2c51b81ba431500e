//! Manifest claim, training run, artifact write, status transitions.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use fleetfuel_core::config::FeatureConfig;
use fleetfuel_core::types::{
    ManifestArtifacts, ManifestStatus, ModelManifest, ModelMetrics, SampleRow, TrainJob,
};
use fleetfuel_features::frame::XMatrix;
use fleetfuel_features::{build_features, PipelineMode};
use fleetfuel_model::artifact::{FEATURE_COLUMNS_FILE, METRICS_FILE, MODEL_FILE};
use fleetfuel_model::{
    artifact_dir, fit, regression_metrics, FuelNetConfig, ModelMeta, TrainParams, TrainReport,
};
use fleetfuel_store::Store;
use tracing::{error, info, warn};

use crate::plots;
use crate::split::group_shuffle_split;

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub models_root: PathBuf,
    pub feature_config: FeatureConfig,
    pub train_params: TrainParams,
    pub test_fraction: f64,
    pub split_seed: u64,
}

impl TrainerConfig {
    pub fn new(models_root: PathBuf) -> Self {
        TrainerConfig {
            models_root,
            feature_config: FeatureConfig::default(),
            train_params: TrainParams::default(),
            test_fraction: 0.2,
            split_seed: 42,
        }
    }
}

pub struct Trainer {
    store: Store,
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(store: Store, config: TrainerConfig) -> Self {
        Trainer { store, config }
    }

    /// Process one train-queue message end to end. Never panics, never
    /// asks for a requeue: whatever happens here, the caller acknowledges
    /// the message and the manifest carries the durable outcome.
    pub fn handle_job(&self, job: &TrainJob) {
        let Some(manifest) = self.claim(job) else {
            return;
        };
        info!(
            manifest = %manifest.id,
            vehicle = %manifest.vehicle_id,
            version = %manifest.version,
            "training started"
        );
        match self.run(&manifest) {
            Ok((artifacts, metrics)) => {
                let completed = self.store.transition_manifest(
                    &manifest.id,
                    ManifestStatus::Training,
                    |m| {
                        m.status = ManifestStatus::Completed;
                        m.artifacts = Some(artifacts.clone());
                        m.metrics = Some(metrics.clone());
                        m.error = None;
                    },
                );
                match completed {
                    Ok(_) => info!(
                        manifest = %manifest.id,
                        mae = metrics.mae,
                        rmse = metrics.rmse,
                        r2 = metrics.r2,
                        "training completed"
                    ),
                    Err(err) => error!(
                        manifest = %manifest.id,
                        error = %err,
                        "could not record completion"
                    ),
                }
            }
            Err(err) => {
                error!(manifest = %manifest.id, error = %err, "training failed");
                self.fail(&manifest.id, &err.to_string());
            }
        }
    }

    /// Resolve the manifest and take ownership via the `pending → training`
    /// compare-and-swap. `None` means: acknowledge without work.
    fn claim(&self, job: &TrainJob) -> Option<ModelManifest> {
        let lookup = match &job.model_id {
            Some(id) => self.store.get_manifest(id),
            None => Ok(None),
        };
        let lookup = match lookup {
            Ok(Some(manifest)) => Ok(Some(manifest)),
            Ok(None) => match (&job.vehicle_id, &job.version) {
                (Some(vehicle), Some(version)) => self.store.find_manifest(vehicle, version),
                _ if job.model_id.is_none() => {
                    warn!("train job carries neither modelId nor (vehicleId, version)");
                    return None;
                }
                _ => Ok(None),
            },
            Err(err) => Err(err),
        };
        let manifest = match lookup {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                warn!(?job, "manifest not found, acknowledging without work");
                return None;
            }
            Err(err) => {
                error!(error = %err, "manifest lookup failed");
                return None;
            }
        };
        match self
            .store
            .transition_manifest(&manifest.id, ManifestStatus::Pending, |m| {
                m.status = ManifestStatus::Training;
            }) {
            Ok(claimed) => Some(claimed),
            Err(err) if err.is_conflict() => {
                info!(
                    manifest = %manifest.id,
                    status = manifest.status.as_str(),
                    "manifest is not pending; redelivery is a no-op"
                );
                None
            }
            Err(err) => {
                error!(manifest = %manifest.id, error = %err, "claim failed");
                None
            }
        }
    }

    fn fail(&self, id: &str, reason: &str) {
        let outcome = self
            .store
            .transition_manifest(id, ManifestStatus::Training, |m| {
                m.status = ManifestStatus::Failed;
                m.error = Some(reason.to_string());
            });
        if let Err(err) = outcome {
            error!(manifest = %id, error = %err, "could not record failure");
        }
    }

    /// The training run proper: corpus → features → split → fit →
    /// evaluate → artifact.
    fn run(&self, manifest: &ModelManifest) -> Result<(ManifestArtifacts, ModelMetrics)> {
        let mut rows: Vec<SampleRow> = Vec::new();
        for trip_id in manifest.corpus_trip_ids() {
            let docs = self
                .store
                .samples_for_trip(&trip_id)
                .with_context(|| format!("loading samples of trip '{trip_id}'"))?;
            rows.extend(docs.iter().map(|doc| doc.flatten()));
        }
        if rows.is_empty() {
            bail!("no_samples");
        }

        let mut frame = build_features(rows, &self.config.feature_config, PipelineMode::Train)?;
        if frame.is_empty() {
            bail!("no_features");
        }
        let feature_cols = frame.feature_cols.clone();
        let trip_ids = frame.trip_ids()?;
        let split = group_shuffle_split(&trip_ids, self.config.test_fraction, self.config.split_seed);
        info!(
            rows = frame.height(),
            train_trips = split.train_trips.len(),
            test_trips = split.test_trips.len(),
            "feature frame ready"
        );

        let x = frame.x_matrix(&feature_cols, false)?;
        let y = frame.y()?;
        let (x_train, y_train) = gather_rows(&x, &y, &split.train_rows);
        let (x_test, y_test) = gather_rows(&x, &y, &split.test_rows);

        let (model, report) = fit(
            &x_train,
            split.train_rows.len(),
            feature_cols.len(),
            &y_train,
            &feature_cols,
            &self.config.train_params,
        )?;

        // Held-out trips when the corpus allowed a split; otherwise the
        // training rows, which at least proves the fit is coherent.
        let (eval_x, eval_y): (&[f64], &[f64]) = if split.test_rows.is_empty() {
            (&x_train, &y_train)
        } else {
            (&x_test, &y_test)
        };
        let pred = model.predict(eval_x, eval_y.len())?;
        let scores =
            regression_metrics(eval_y, &pred).context("no finite evaluation pairs")?;
        let metrics = ModelMetrics {
            mae: scores.mae,
            rmse: scores.rmse,
            r2: scores.r2,
            n_train_rows: split.train_rows.len(),
            n_test_rows: split.test_rows.len(),
        };

        // Stage, then promote with a rename so readers only ever see a
        // complete artifact directory.
        let final_dir = artifact_dir(
            &self.config.models_root,
            &manifest.vehicle_id,
            &manifest.version,
        );
        let staging = self
            .config
            .models_root
            .join(&manifest.vehicle_id)
            .join(format!(
                ".staging-{}-{}",
                manifest.version,
                Utc::now().timestamp_millis()
            ));
        let meta = ModelMeta {
            vehicle_id: manifest.vehicle_id.clone(),
            version: manifest.version.clone(),
            n_features: feature_cols.len(),
            hidden: FuelNetConfig::new(feature_cols.len()).hidden_sizes().to_vec(),
            seed: self.config.train_params.seed,
            trained_at: Utc::now(),
        };
        model.save(&staging, &meta)?;
        write_metrics_file(&staging, &metrics, &report)?;
        frame.write_csv(&staging.join("features.csv"))?;

        let plots_dir = staging.join("plots");
        fs::create_dir_all(&plots_dir)?;
        plots::parity(&plots_dir.join("parity.png"), eval_y, &pred)?;
        plots::residuals(&plots_dir.join("residuals.png"), &pred, eval_y)?;
        plots::residual_histogram(&plots_dir.join("residual_hist.png"), eval_y, &pred)?;
        let speed = frame.numeric_column("speedKmh")?;
        plots::speed_histogram(&plots_dir.join("speed_hist.png"), &speed)?;

        if final_dir.exists() {
            // Leftover of an interrupted run. The manifest CAS guarantees
            // nobody else owns this (vehicleId, version).
            fs::remove_dir_all(&final_dir)
                .with_context(|| format!("clearing stale artifact '{}'", final_dir.display()))?;
        }
        if let Some(parent) = final_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&staging, &final_dir).with_context(|| {
            format!(
                "promoting staged artifact '{}' to '{}'",
                staging.display(),
                final_dir.display()
            )
        })?;

        let artifacts = ManifestArtifacts {
            dir: final_dir.display().to_string(),
            model: final_dir.join(MODEL_FILE).display().to_string(),
            feature_columns: final_dir.join(FEATURE_COLUMNS_FILE).display().to_string(),
            metrics: final_dir.join(METRICS_FILE).display().to_string(),
        };
        Ok((artifacts, metrics))
    }
}

fn gather_rows(x: &XMatrix, y: &[f64], rows: &[usize]) -> (Vec<f64>, Vec<f64>) {
    let mut gx = Vec::with_capacity(rows.len() * x.cols);
    let mut gy = Vec::with_capacity(rows.len());
    for &r in rows {
        gx.extend_from_slice(x.row(r));
        gy.push(y[r]);
    }
    (gx, gy)
}

fn write_metrics_file(dir: &Path, metrics: &ModelMetrics, report: &TrainReport) -> Result<()> {
    let text = format!(
        "MAE: {:.6}\nRMSE: {:.6}\nR2: {:.6}\nnTrainRows: {}\nnTestRows: {}\nepochs: {}\nbestValLoss: {:.6}\n",
        metrics.mae,
        metrics.rmse,
        metrics.r2,
        metrics.n_train_rows,
        metrics.n_test_rows,
        report.epochs,
        report.best_val_loss,
    );
    fs::write(dir.join(METRICS_FILE), text).context("writing metrics.txt")?;
    Ok(())
}
