//! Command-line surface of the `fleetfuel` operator tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fleetfuel")]
#[command(author, version, about = "FleetFuel operator tooling", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Path of the embedded document database.
    #[arg(long, env = "FLEETFUEL_DATA_DIR", default_value = "fleetfuel-data")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import telemetry samples from a CSV file
    Import {
        /// CSV with headers tripId,timestamp,latitude,longitude,altitude,
        /// vehicleSpeed,engineRpm,acceleratorPosition,engineCoolantTemp,
        /// intakeAirTemp,fuelConsumptionRate
        #[arg(long)]
        csv: PathBuf,
    },
    /// Create a pending model manifest and enqueue its training job
    Train {
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        version: String,
        /// Comma-separated trip ids forming the training corpus
        #[arg(long, value_delimiter = ',')]
        trips: Vec<String>,
        #[arg(long, env = "FLEETFUEL_TRAIN_QUEUE", default_value = "model-train")]
        queue: String,
    },
    /// Enqueue a prediction job for one trip
    Predict {
        #[arg(long)]
        trip: String,
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        version: String,
        #[arg(long, env = "FLEETFUEL_PREDICT_QUEUE", default_value = "predict.trip")]
        queue: String,
    },
    /// Show a model manifest
    Status {
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        version: String,
    },
    /// Show a trip's prediction summary
    Summary {
        #[arg(long)]
        trip: String,
    },
}
