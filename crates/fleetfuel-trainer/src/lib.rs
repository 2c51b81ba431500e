//! # fleetfuel-trainer: Train-Queue Consumer
//!
//! Consumes model manifests from the train queue and turns each into a
//! model artifact: load the manifest's trips, run the feature pipeline in
//! training mode, group-split, fit, evaluate on the held-out trips, write
//! the artifact (staged, promoted by rename), and move the manifest to its
//! terminal state.
//!
//! Every message is acknowledged, success or not — a poisoned manifest
//! must never block the queue; its `failed` record is the durable failure
//! trail. Idempotence under redelivery comes from the manifest's
//! `pending → training` compare-and-swap, never from the broker.

pub mod plots;
pub mod split;
pub mod trainer;

pub use split::group_shuffle_split;
pub use trainer::{Trainer, TrainerConfig};
