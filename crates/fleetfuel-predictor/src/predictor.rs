//! Per-trip prediction: feature regeneration, matrix assembly, fuel
//! integration, summary upsert.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use fleetfuel_core::config::FeatureConfig;
use fleetfuel_core::types::{ManifestStatus, PredictJob, PredictionSummary, SampleRow};
use fleetfuel_features::table::TripTable;
use fleetfuel_features::{build_features, PipelineMode};
use fleetfuel_model::{regression_metrics, ArtifactCache};
use fleetfuel_store::Store;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PredictorConfig {
    pub models_root: PathBuf,
    pub feature_config: FeatureConfig,
}

impl PredictorConfig {
    pub fn new(models_root: PathBuf) -> Self {
        PredictorConfig {
            models_root,
            feature_config: FeatureConfig::inference(),
        }
    }
}

pub struct Predictor {
    store: Store,
    cache: ArtifactCache,
    config: PredictorConfig,
}

impl Predictor {
    pub fn new(store: Store, config: PredictorConfig) -> Self {
        Predictor {
            cache: ArtifactCache::new(&config.models_root),
            store,
            config,
        }
    }

    /// Process one predict-queue message. An `Err` is a failed job: the
    /// caller logs it and acknowledges — nothing here is fixed by a
    /// redelivery.
    pub fn handle_job(&self, job: &PredictJob) -> Result<PredictionSummary> {
        let trip = self
            .store
            .get_trip(&job.trip_id)
            .context("trip lookup failed")?;
        if trip.is_none() {
            bail!("trip '{}' not found", job.trip_id);
        }
        let docs = self
            .store
            .samples_for_trip(&job.trip_id)
            .context("sample lookup failed")?;
        if docs.is_empty() {
            bail!("trip '{}' has no samples", job.trip_id);
        }
        let rows: Vec<SampleRow> = docs.iter().map(|doc| doc.flatten()).collect();

        // A partially written artifact must never serve predictions: when
        // the manifest is known, only `completed` unlocks the load.
        if let Some(manifest) = self
            .store
            .find_manifest(&job.vehicle_id, &job.version)
            .context("manifest lookup failed")?
        {
            if manifest.status != ManifestStatus::Completed {
                bail!(
                    "model {}/{} manifest is '{}', refusing to load its artifact",
                    job.vehicle_id,
                    job.version,
                    manifest.status.as_str()
                );
            }
        }
        let model = self
            .cache
            .get(&job.vehicle_id, &job.version)
            .with_context(|| format!("loading model {}/{}", job.vehicle_id, job.version))?;

        let frame = build_features(
            rows.clone(),
            &self.config.feature_config,
            PipelineMode::Infer,
        )?;
        if frame.is_empty() {
            bail!("trip '{}' produced no feature rows", job.trip_id);
        }

        // Column order comes from the artifact, not from this build of the
        // pipeline; anything the artifact names that we cannot produce is
        // zeros plus a warning, never a silent reorder.
        let x = frame.x_matrix(&model.feature_columns, true)?;
        if !x.missing.is_empty() {
            warn!(
                trip = %job.trip_id,
                columns = ?x.missing,
                "artifact names feature columns the pipeline did not produce; zero-filling"
            );
        }
        let y_pred: Vec<f64> = model
            .predict(&x.data, x.rows)?
            .into_iter()
            .map(|v| v.max(0.0))
            .collect();

        // Fuel integral over the irregular grid: dt[0] = 0, negative or
        // duplicate deltas contribute nothing.
        let times_ms = frame.timestamps_ms()?;
        let mut fuel_ml = 0.0;
        for i in 1..times_ms.len() {
            let dt_s = (times_ms[i] - times_ms[i - 1]) as f64 / 1000.0;
            fuel_ml += y_pred[i] * dt_s.max(0.0);
        }
        let mean_rate = y_pred.iter().sum::<f64>() / y_pred.len() as f64;

        // Observed fuel aligned to the frame rows: inference mode drops
        // nothing after normalization, so the normalized table lines up
        // one-to-one with the frame.
        let observed = TripTable::normalize(rows).fuel;
        let scores = regression_metrics(&observed, &y_pred);

        let summary = PredictionSummary {
            fuel_used_l: round2(fuel_ml / 1000.0),
            avg_fuel_rate_lph: round2(mean_rate * 3.6),
            mae: scores.map(|s| s.mae),
            rmse: scores.map(|s| s.rmse),
            r2: scores.map(|s| s.r2),
            model_version: job.version.clone(),
            n_samples: x.rows,
            predicted_at: Utc::now(),
        };
        self.store
            .set_prediction_summary(&job.trip_id, &summary)
            .context("writing prediction summary")?;
        info!(
            trip = %job.trip_id,
            fuel_used_l = summary.fuel_used_l,
            avg_lph = summary.avg_fuel_rate_lph,
            rows = x.rows,
            "prediction summary written"
        );
        Ok(summary)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
