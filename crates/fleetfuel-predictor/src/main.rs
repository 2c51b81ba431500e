//! Predict-queue consumer binary.
//!
//! Claims up to four jobs at a time and runs them on a matching rayon
//! pool; each job is acknowledged once processed, success or failure.
//! Unacknowledged in-flight jobs (crash, SIGINT mid-run) are requeued by
//! the recovery sweep on the next start.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fleetfuel_core::config::ServiceConfig;
use fleetfuel_core::types::PredictJob;
use fleetfuel_predictor::{Predictor, PredictorConfig};
use fleetfuel_store::Store;
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// In-flight bound per consumer instance.
const PREFETCH: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "fleetfuel-predictor")]
#[command(about = "FleetFuel trip prediction consumer", version)]
struct Cli {
    /// Path of the embedded document database.
    #[arg(long, env = "FLEETFUEL_DATA_DIR", default_value = "fleetfuel-data")]
    data_dir: PathBuf,

    /// Root of the shared model volume.
    #[arg(long, env = "FLEETFUEL_MODELS_ROOT", default_value = "models")]
    models_root: PathBuf,

    /// Queue to consume predict jobs from.
    #[arg(long, env = "FLEETFUEL_PREDICT_QUEUE")]
    queue: Option<String>,

    /// Idle poll interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    poll_ms: u64,

    /// Set the logging level
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("installing tracing subscriber")?;

    let service = ServiceConfig::from_env();
    let queue_name = cli.queue.unwrap_or(service.predict_queue);

    let store = Store::open(&cli.data_dir)
        .with_context(|| format!("opening store at '{}'", cli.data_dir.display()))?;
    if !cli.models_root.is_dir() {
        anyhow::bail!(
            "model root '{}' is not a readable directory",
            cli.models_root.display()
        );
    }
    let queue = store.queue(&queue_name)?;
    let requeued = queue.recover()?;
    if requeued > 0 {
        warn!(requeued, "recovered in-flight predict jobs from a previous run");
    }

    let predictor = Predictor::new(store.clone(), PredictorConfig::new(cli.models_root));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(PREFETCH)
        .build()
        .context("building prediction thread pool")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("installing signal handler")?;
    }

    info!(queue = %queue_name, prefetch = PREFETCH, "predictor consuming");
    while !shutdown.load(Ordering::SeqCst) {
        let deliveries = match queue.claim(PREFETCH) {
            Ok(deliveries) => deliveries,
            Err(err) => {
                error!(error = %err, "queue claim failed");
                thread::sleep(Duration::from_millis(cli.poll_ms));
                continue;
            }
        };
        if deliveries.is_empty() {
            thread::sleep(Duration::from_millis(cli.poll_ms));
            continue;
        }
        pool.install(|| {
            deliveries.par_iter().for_each(|delivery| {
                match delivery.parse::<PredictJob>() {
                    Ok(job) => {
                        if let Err(err) = predictor.handle_job(&job) {
                            error!(trip = %job.trip_id, error = %err, "prediction failed");
                        }
                    }
                    Err(err) => {
                        error!(id = delivery.id, error = %err, "unparseable predict job");
                    }
                }
                if let Err(err) = queue.ack(delivery) {
                    error!(id = delivery.id, error = %err, "ack failed");
                }
            });
        });
    }
    store.flush()?;
    info!("predictor shut down cleanly");
    Ok(())
}
