use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use clap::Parser;
use fleetfuel_core::types::{
    GpsBlock, ManifestStatus, ModelManifest, ObdBlock, PredictJob, SampleDoc, TrainJob, TripDoc,
};
use fleetfuel_store::Store;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("installing tracing subscriber")?;

    let store = Store::open(&cli.data_dir)
        .with_context(|| format!("opening store at '{}'", cli.data_dir.display()))?;

    match cli.command {
        Commands::Import { csv } => import_samples(&store, &csv),
        Commands::Train {
            vehicle,
            version,
            trips,
            queue,
        } => enqueue_training(&store, &vehicle, &version, &trips, &queue),
        Commands::Predict {
            trip,
            vehicle,
            version,
            queue,
        } => {
            let id = store.queue(&queue)?.publish(&PredictJob {
                trip_id: trip.clone(),
                vehicle_id: vehicle,
                version,
            })?;
            info!(trip = %trip, id, queue = %queue, "predict job enqueued");
            Ok(())
        }
        Commands::Status { vehicle, version } => {
            let manifest = store
                .find_manifest(&vehicle, &version)?
                .ok_or_else(|| anyhow!("no manifest for {vehicle}/{version}"))?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            Ok(())
        }
        Commands::Summary { trip } => {
            let doc = store
                .get_trip(&trip)?
                .ok_or_else(|| anyhow!("trip '{trip}' not found"))?;
            match doc.prediction_summary {
                Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                None => println!("trip '{trip}' has no prediction summary yet"),
            }
            Ok(())
        }
    }
}

/// Load a sample CSV into the store, creating a trip document per distinct
/// trip id.
fn import_samples(store: &Store, path: &Path) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening '{}'", path.display()))?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let trip_idx = column("tripId").ok_or_else(|| anyhow!("CSV is missing 'tripId'"))?;
    let ts_idx = column("timestamp").ok_or_else(|| anyhow!("CSV is missing 'timestamp'"))?;
    let numeric = [
        column("latitude"),
        column("longitude"),
        column("altitude"),
        column("vehicleSpeed"),
        column("engineRpm"),
        column("acceleratorPosition"),
        column("engineCoolantTemp"),
        column("intakeAirTemp"),
        column("fuelConsumptionRate"),
    ];

    let mut trips: BTreeSet<String> = BTreeSet::new();
    let mut imported = 0usize;
    for record in reader.records() {
        let record = record?;
        let trip_id = record
            .get(trip_idx)
            .ok_or_else(|| anyhow!("row without tripId"))?
            .to_string();
        let millis: i64 = record
            .get(ts_idx)
            .ok_or_else(|| anyhow!("row without timestamp"))?
            .trim()
            .parse()
            .context("parsing timestamp as epoch milliseconds")?;
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| anyhow!("timestamp {millis} out of range"))?;
        let field = |slot: Option<usize>| -> Option<f64> {
            slot.and_then(|idx| record.get(idx))
                .and_then(|raw| raw.trim().parse::<f64>().ok())
        };
        let doc = SampleDoc {
            id: None,
            trip_id: trip_id.clone(),
            timestamp,
            gps: Some(GpsBlock {
                latitude: field(numeric[0]),
                longitude: field(numeric[1]),
                altitude: field(numeric[2]),
            }),
            obd: Some(ObdBlock {
                vehicle_speed: field(numeric[3]),
                engine_rpm: field(numeric[4]),
                accelerator_position: field(numeric[5]),
                engine_coolant_temp: field(numeric[6]),
                intake_air_temp: field(numeric[7]),
                fuel_consumption_rate: field(numeric[8]),
            }),
            fuel_consumption_rate: None,
        };
        store.insert_sample(&doc)?;
        trips.insert(trip_id);
        imported += 1;
    }
    for trip_id in &trips {
        if store.get_trip(trip_id)?.is_none() {
            store.put_trip(&TripDoc {
                id: trip_id.clone(),
                vehicle_id: None,
                prediction_summary: None,
                extra: Default::default(),
            })?;
        }
    }
    store.flush()?;
    info!(imported, trips = trips.len(), "sample import finished");
    Ok(())
}

fn enqueue_training(
    store: &Store,
    vehicle: &str,
    version: &str,
    trips: &[String],
    queue: &str,
) -> Result<()> {
    if trips.is_empty() {
        return Err(anyhow!("--trips must name at least one trip"));
    }
    if let Some(existing) = store.find_manifest(vehicle, version)? {
        return Err(anyhow!(
            "manifest for {vehicle}/{version} already exists with status '{}'",
            existing.status.as_str()
        ));
    }
    let manifest = ModelManifest {
        id: uuid::Uuid::new_v4().to_string(),
        vehicle_id: vehicle.to_string(),
        version: version.to_string(),
        train_trips_ids: trips.to_vec(),
        val_trips_ids: vec![],
        status: ManifestStatus::Pending,
        artifacts: None,
        metrics: None,
        error: None,
        updated_at: Utc::now(),
    };
    store.insert_manifest(&manifest)?;
    let id = store.queue(queue)?.publish(&TrainJob {
        model_id: Some(manifest.id.clone()),
        vehicle_id: Some(vehicle.to_string()),
        version: Some(version.to_string()),
    })?;
    info!(
        manifest = %manifest.id,
        vehicle,
        version,
        message = id,
        queue = %queue,
        "training manifest created and job enqueued"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn import_reads_samples_and_creates_trips() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("samples.csv");
        std::fs::write(
            &csv_path,
            "tripId,timestamp,latitude,longitude,vehicleSpeed,fuelConsumptionRate\n\
             t1,0,48.0,11.0,36,1.0\n\
             t1,1000,48.0003,11.0,37,1.1\n\
             t2,0,49.0,12.0,,\n",
        )
        .unwrap();
        let store = Store::open(&dir.path().join("db")).unwrap();
        import_samples(&store, &csv_path).unwrap();

        let t1 = store.samples_for_trip("t1").unwrap();
        assert_eq!(t1.len(), 2);
        let row = t1[0].flatten();
        assert_eq!(row.vehicle_speed, 36.0);
        assert_eq!(row.fuel_rate, 1.0);
        // Missing numeric cells flatten to NaN.
        let t2 = store.samples_for_trip("t2").unwrap();
        assert!(t2[0].flatten().vehicle_speed.is_nan());
        assert!(store.get_trip("t1").unwrap().is_some());
        assert!(store.get_trip("t2").unwrap().is_some());
    }

    #[test]
    fn enqueue_training_rejects_duplicates_and_publishes() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("db")).unwrap();
        let trips = vec!["t1".to_string()];
        enqueue_training(&store, "veh-1", "1", &trips, "model-train").unwrap();

        let manifest = store.find_manifest("veh-1", "1").unwrap().unwrap();
        assert_eq!(manifest.status, ManifestStatus::Pending);
        assert_eq!(store.queue("model-train").unwrap().len(), 1);

        let err = enqueue_training(&store, "veh-1", "1", &trips, "model-train").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
