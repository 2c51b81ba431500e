//! # fleetfuel-predictor: Predict-Queue Consumer
//!
//! Applies a trained model artifact to one trip at a time: regenerate the
//! engineered features in inference mode, build the design matrix in the
//! artifact's column order, predict, integrate fuel over the irregular
//! time grid, and upsert the `predictionSummary` onto the trip document.
//!
//! The predictor never deletes a sample row — every tick contributes to
//! the fuel time-integral — and never mutates the samples themselves.
//! Re-running a job overwrites the summary with the same result, so
//! redelivery needs no guarding beyond the upsert itself.

pub mod predictor;

pub use predictor::{Predictor, PredictorConfig};
