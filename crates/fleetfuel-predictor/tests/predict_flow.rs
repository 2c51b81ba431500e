//! End-to-end predictor flow: train an artifact with the real trainer,
//! then predict trips against it.

use chrono::{TimeZone, Utc};
use fleetfuel_core::types::{
    GpsBlock, ManifestStatus, ModelManifest, ObdBlock, PredictJob, SampleDoc, TripDoc,
};
use fleetfuel_model::TrainParams;
use fleetfuel_predictor::{Predictor, PredictorConfig};
use fleetfuel_store::Store;
use fleetfuel_trainer::{Trainer, TrainerConfig};
use tempfile::{tempdir, TempDir};

const LAT_PER_M: f64 = 1.0 / 111_195.0;

fn seed_trip(store: &Store, trip_id: &str, n: usize, base_speed_kmh: f64, with_fuel: bool) {
    let mut lat = 48.0;
    for i in 0..n {
        let speed = base_speed_kmh + 5.0 * ((i as f64) / 10.0).sin();
        lat += speed / 3.6 * LAT_PER_M;
        store
            .insert_sample(&SampleDoc {
                id: None,
                trip_id: trip_id.into(),
                timestamp: Utc.timestamp_millis_opt(i as i64 * 1_000).unwrap(),
                gps: Some(GpsBlock {
                    latitude: Some(lat),
                    longitude: Some(11.0),
                    altitude: Some(500.0),
                }),
                obd: Some(ObdBlock {
                    vehicle_speed: Some(speed),
                    engine_rpm: Some(1_200.0 + 20.0 * speed),
                    accelerator_position: Some(15.0 + speed / 4.0),
                    engine_coolant_temp: Some(90.0),
                    intake_air_temp: Some(25.0),
                    fuel_consumption_rate: with_fuel.then_some(0.1 + 0.02 * speed),
                }),
                fuel_consumption_rate: None,
            })
            .unwrap();
    }
}

fn put_trip(store: &Store, trip_id: &str) {
    store
        .put_trip(&TripDoc {
            id: trip_id.into(),
            vehicle_id: Some("veh-1".into()),
            prediction_summary: None,
            extra: Default::default(),
        })
        .unwrap();
}

/// Train a quick artifact for `veh-1`/`1` and return the fixture roots.
fn trained_fixture() -> (TempDir, TempDir, Store) {
    let data = tempdir().unwrap();
    let models = tempdir().unwrap();
    let store = Store::open(data.path()).unwrap();
    for (i, trip) in ["train-1", "train-2", "train-3"].iter().enumerate() {
        seed_trip(&store, trip, 40, 30.0 + 10.0 * i as f64, true);
    }
    store
        .insert_manifest(&ModelManifest {
            id: "m1".into(),
            vehicle_id: "veh-1".into(),
            version: "1".into(),
            train_trips_ids: vec!["train-1".into(), "train-2".into(), "train-3".into()],
            val_trips_ids: vec![],
            status: ManifestStatus::Pending,
            artifacts: None,
            metrics: None,
            error: None,
            updated_at: Utc::now(),
        })
        .unwrap();
    let mut config = TrainerConfig::new(models.path().to_path_buf());
    config.train_params = TrainParams {
        max_epochs: 20,
        ..TrainParams::default()
    };
    Trainer::new(store.clone(), config).handle_job(&fleetfuel_core::types::TrainJob {
        model_id: Some("m1".into()),
        vehicle_id: None,
        version: None,
    });
    assert_eq!(
        store.get_manifest("m1").unwrap().unwrap().status,
        ManifestStatus::Completed
    );
    (data, models, store)
}

fn job(trip: &str) -> PredictJob {
    PredictJob {
        trip_id: trip.into(),
        vehicle_id: "veh-1".into(),
        version: "1".into(),
    }
}

#[test]
fn predicts_a_trip_and_upserts_the_summary() {
    let (_data, models, store) = trained_fixture();
    seed_trip(&store, "ride", 30, 45.0, true);
    put_trip(&store, "ride");

    let predictor = Predictor::new(store.clone(), PredictorConfig::new(models.path().to_path_buf()));
    let summary = predictor.handle_job(&job("ride")).unwrap();

    assert!(summary.fuel_used_l >= 0.0);
    assert!(summary.avg_fuel_rate_lph >= 0.0);
    assert_eq!(summary.n_samples, 30);
    assert_eq!(summary.model_version, "1");
    // Ground truth present: comparison metrics reported.
    assert!(summary.mae.is_some() && summary.rmse.is_some() && summary.r2.is_some());

    let doc = store.get_trip("ride").unwrap().unwrap();
    let stored = doc.prediction_summary.expect("summary upserted");
    assert_eq!(stored.fuel_used_l, summary.fuel_used_l);
}

#[test]
fn prediction_is_idempotent() {
    let (_data, models, store) = trained_fixture();
    seed_trip(&store, "ride", 25, 40.0, true);
    put_trip(&store, "ride");

    let predictor = Predictor::new(store.clone(), PredictorConfig::new(models.path().to_path_buf()));
    let first = predictor.handle_job(&job("ride")).unwrap();
    let second = predictor.handle_job(&job("ride")).unwrap();

    assert_eq!(first.fuel_used_l, second.fuel_used_l);
    assert_eq!(first.avg_fuel_rate_lph, second.avg_fuel_rate_lph);
    assert_eq!(first.mae, second.mae);
    assert_eq!(first.rmse, second.rmse);
    assert_eq!(first.r2, second.r2);
    assert_eq!(first.n_samples, second.n_samples);
}

#[test]
fn trips_without_fuel_ground_truth_omit_metrics() {
    let (_data, models, store) = trained_fixture();
    seed_trip(&store, "blind", 20, 50.0, false);
    put_trip(&store, "blind");

    let predictor = Predictor::new(store.clone(), PredictorConfig::new(models.path().to_path_buf()));
    let summary = predictor.handle_job(&job("blind")).unwrap();
    assert!(summary.mae.is_none() && summary.rmse.is_none() && summary.r2.is_none());
    assert!(summary.fuel_used_l >= 0.0);
}

#[test]
fn missing_trip_or_samples_fail_the_job() {
    let (_data, models, store) = trained_fixture();
    let predictor = Predictor::new(store.clone(), PredictorConfig::new(models.path().to_path_buf()));

    let err = predictor.handle_job(&job("ghost")).unwrap_err();
    assert!(err.to_string().contains("not found"), "{err}");

    put_trip(&store, "hollow");
    let err = predictor.handle_job(&job("hollow")).unwrap_err();
    assert!(err.to_string().contains("no samples"), "{err}");
}

#[test]
fn refuses_artifacts_of_incomplete_manifests() {
    let (_data, models, store) = trained_fixture();
    seed_trip(&store, "ride", 10, 40.0, true);
    put_trip(&store, "ride");
    // A second model version whose manifest never completed.
    store
        .insert_manifest(&ModelManifest {
            id: "m2".into(),
            vehicle_id: "veh-1".into(),
            version: "2".into(),
            train_trips_ids: vec![],
            val_trips_ids: vec![],
            status: ManifestStatus::Training,
            artifacts: None,
            metrics: None,
            error: None,
            updated_at: Utc::now(),
        })
        .unwrap();

    let predictor = Predictor::new(store.clone(), PredictorConfig::new(models.path().to_path_buf()));
    let err = predictor
        .handle_job(&PredictJob {
            trip_id: "ride".into(),
            vehicle_id: "veh-1".into(),
            version: "2".into(),
        })
        .unwrap_err();
    assert!(err.to_string().contains("refusing"), "{err}");
}

#[test]
fn missing_artifact_fails_with_not_found() {
    let (_data, models, store) = trained_fixture();
    seed_trip(&store, "ride", 10, 40.0, true);
    put_trip(&store, "ride");

    let predictor = Predictor::new(store.clone(), PredictorConfig::new(models.path().to_path_buf()));
    let err = predictor
        .handle_job(&PredictJob {
            trip_id: "ride".into(),
            vehicle_id: "veh-1".into(),
            version: "99".into(),
        })
        .unwrap_err();
    assert!(err.to_string().contains("loading model"), "{err}");
}

#[test]
fn two_sample_trip_integrates_over_ten_seconds() {
    let (_data, models, store) = trained_fixture();
    // Two samples 10 s apart, 100 m along latitude, constant OBD speed.
    for (i, t_ms) in [0i64, 10_000].iter().enumerate() {
        store
            .insert_sample(&SampleDoc {
                id: None,
                trip_id: "short".into(),
                timestamp: Utc.timestamp_millis_opt(*t_ms).unwrap(),
                gps: Some(GpsBlock {
                    latitude: Some(48.0 + i as f64 * 100.0 * LAT_PER_M),
                    longitude: Some(11.0),
                    altitude: None,
                }),
                obd: Some(ObdBlock {
                    vehicle_speed: Some(36.0),
                    engine_rpm: Some(1_500.0),
                    accelerator_position: Some(20.0),
                    engine_coolant_temp: Some(90.0),
                    intake_air_temp: Some(25.0),
                    fuel_consumption_rate: Some(1.0),
                }),
                fuel_consumption_rate: None,
            })
            .unwrap();
    }
    put_trip(&store, "short");

    let predictor = Predictor::new(store.clone(), PredictorConfig::new(models.path().to_path_buf()));
    let summary = predictor.handle_job(&job("short")).unwrap();
    assert_eq!(summary.n_samples, 2);
    // dt = [0, 10]: the integral is ten times the second prediction, so a
    // plausible mL/s rate keeps the total well under a liter.
    assert!(summary.fuel_used_l >= 0.0 && summary.fuel_used_l < 1.0);
}

#[test]
fn single_sample_trip_uses_zero_integration_time() {
    let (_data, models, store) = trained_fixture();
    seed_trip(&store, "tick", 1, 30.0, true);
    put_trip(&store, "tick");

    let predictor = Predictor::new(store.clone(), PredictorConfig::new(models.path().to_path_buf()));
    let summary = predictor.handle_job(&job("tick")).unwrap();
    assert_eq!(summary.n_samples, 1);
    assert_eq!(summary.fuel_used_l, 0.0); // dt[0] = 0
}
