//! Document types shared by the stores, the pipelines, and the consumers.
//!
//! Wire names are camelCase and match the collection documents one-to-one;
//! timestamps are persisted as epoch milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GPS fix block of a telemetry sample. Any field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsBlock {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

/// OBD-II block of a telemetry sample. Any field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObdBlock {
    /// km/h
    pub vehicle_speed: Option<f64>,
    pub engine_rpm: Option<f64>,
    /// 0–100
    pub accelerator_position: Option<f64>,
    /// °C
    pub engine_coolant_temp: Option<f64>,
    /// °C
    pub intake_air_temp: Option<f64>,
    /// mL/s; wins over the root-level field when both are present
    pub fuel_consumption_rate: Option<f64>,
}

/// One telemetry tick as stored in the `samples` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleDoc {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub trip_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub gps: Option<GpsBlock>,
    #[serde(default)]
    pub obd: Option<ObdBlock>,
    /// Root-level fallback for the fuel target.
    #[serde(default)]
    pub fuel_consumption_rate: Option<f64>,
}

/// Flat numeric view of a sample, with NaN standing in for missing values.
///
/// This is what the feature pipeline consumes; the OBD-nested fuel rate has
/// already won over the root-level one here.
#[derive(Debug, Clone)]
pub struct SampleRow {
    pub trip_id: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub vehicle_speed: f64,
    pub engine_rpm: f64,
    pub accelerator_position: f64,
    pub coolant_temp: f64,
    pub intake_temp: f64,
    pub fuel_rate: f64,
}

fn num(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

impl SampleDoc {
    /// Flatten the nested document into the semantic view.
    ///
    /// Fuel-rate precedence: `obd.fuelConsumptionRate` first, root-level
    /// `fuelConsumptionRate` as the fallback.
    pub fn flatten(&self) -> SampleRow {
        let gps = self.gps.clone().unwrap_or_default();
        let obd = self.obd.clone().unwrap_or_default();
        let fuel = obd
            .fuel_consumption_rate
            .or(self.fuel_consumption_rate);
        SampleRow {
            trip_id: self.trip_id.clone(),
            timestamp: self.timestamp,
            latitude: num(gps.latitude),
            longitude: num(gps.longitude),
            altitude: num(gps.altitude),
            vehicle_speed: num(obd.vehicle_speed),
            engine_rpm: num(obd.engine_rpm),
            accelerator_position: num(obd.accelerator_position),
            coolant_temp: num(obd.engine_coolant_temp),
            intake_temp: num(obd.intake_air_temp),
            fuel_rate: num(fuel),
        }
    }
}

/// Per-trip prediction result written back onto the trip document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSummary {
    pub fuel_used_l: f64,
    pub avg_fuel_rate_lph: f64,
    #[serde(rename = "MAE", default, skip_serializing_if = "Option::is_none")]
    pub mae: Option<f64>,
    #[serde(rename = "RMSE", default, skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    #[serde(rename = "R2", default, skip_serializing_if = "Option::is_none")]
    pub r2: Option<f64>,
    pub model_version: String,
    pub n_samples: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub predicted_at: DateTime<Utc>,
}

/// A trip document. Samples live in their own collection; the only mutation
/// this system performs here is the `predictionSummary` upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_summary: Option<PredictionSummary>,
    /// Fields owned by external collaborators, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Lifecycle of a model manifest. Terminal states are never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Pending,
    Training,
    Completed,
    Failed,
}

impl ManifestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestStatus::Pending => "pending",
            ManifestStatus::Training => "training",
            ManifestStatus::Completed => "completed",
            ManifestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ManifestStatus::Completed | ManifestStatus::Failed)
    }
}

/// Held-out evaluation metrics recorded on a completed manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
    #[serde(rename = "MAE")]
    pub mae: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    #[serde(rename = "R2")]
    pub r2: f64,
    pub n_train_rows: usize,
    pub n_test_rows: usize,
}

/// Paths of a written model artifact, relative to nothing — these are the
/// absolute locations on the shared model volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestArtifacts {
    pub dir: String,
    pub model: String,
    pub feature_columns: String,
    pub metrics: String,
}

/// Document describing a model-to-be-trained and its outcome.
///
/// `(vehicleId, version)` is unique. Created externally as `pending`; the
/// trainer owns every later transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelManifest {
    #[serde(rename = "_id")]
    pub id: String,
    pub vehicle_id: String,
    pub version: String,
    #[serde(default)]
    pub train_trips_ids: Vec<String>,
    #[serde(default)]
    pub val_trips_ids: Vec<String>,
    pub status: ManifestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ManifestArtifacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ModelMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ModelManifest {
    /// All trips the trainer loads; the train/test split is recomputed from
    /// this union, not taken from the two id lists.
    pub fn corpus_trip_ids(&self) -> Vec<String> {
        let mut ids = self.train_trips_ids.clone();
        for id in &self.val_trips_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// Payload of the train queue. At least one of `modelId` or the
/// `(vehicleId, version)` pair must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Payload of the predict queue. All fields required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictJob {
    pub trip_id: String,
    pub vehicle_id: String,
    pub version: String,
}
