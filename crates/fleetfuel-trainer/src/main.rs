//! Train-queue consumer binary.
//!
//! Exit codes: 0 on clean shutdown (SIGINT), non-zero when initialization
//! fails — unopenable database or unusable model root.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fleetfuel_core::config::{FeatureConfig, ServiceConfig};
use fleetfuel_store::Store;
use fleetfuel_trainer::{Trainer, TrainerConfig};
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// The trainer claims one message at a time: model fitting saturates the
/// instance, so prefetching more would only hold messages hostage.
const PREFETCH: usize = 1;

#[derive(Parser, Debug)]
#[command(name = "fleetfuel-trainer")]
#[command(about = "FleetFuel model training consumer", version)]
struct Cli {
    /// Path of the embedded document database.
    #[arg(long, env = "FLEETFUEL_DATA_DIR", default_value = "fleetfuel-data")]
    data_dir: PathBuf,

    /// Root of the shared model volume.
    #[arg(long, env = "FLEETFUEL_MODELS_ROOT", default_value = "models")]
    models_root: PathBuf,

    /// Queue to consume train jobs from.
    #[arg(long, env = "FLEETFUEL_TRAIN_QUEUE")]
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
    let queue_name = cli.queue.unwrap_or(service.train_queue);
    let feature_config = FeatureConfig::from_env().context("reading feature configuration")?;

    let store = Store::open(&cli.data_dir)
        .with_context(|| format!("opening store at '{}'", cli.data_dir.display()))?;
    std::fs::create_dir_all(&cli.models_root)
        .with_context(|| format!("preparing model root '{}'", cli.models_root.display()))?;
    let queue = store.queue(&queue_name)?;
    let requeued = queue.recover()?;
    if requeued > 0 {
        warn!(requeued, "recovered in-flight train jobs from a previous run");
    }

    let mut config = TrainerConfig::new(cli.models_root);
    config.feature_config = feature_config;
    let trainer = Trainer::new(store.clone(), config);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("installing signal handler")?;
    }

    info!(queue = %queue_name, "trainer consuming");
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
        for delivery in deliveries {
            match delivery.parse() {
                Ok(job) => trainer.handle_job(&job),
                Err(err) => {
                    // Poison payload: log it and let the ack below bury it.
                    error!(id = delivery.id, error = %err, "unparseable train job");
                }
            }
            if let Err(err) = queue.ack(&delivery) {
                error!(id = delivery.id, error = %err, "ack failed");
            }
        }
    }
    store.flush()?;
    info!("trainer shut down cleanly");
    Ok(())
}
