//! # fleetfuel-store: Documents and Queues
//!
//! Embedded persistence for the FleetFuel services: the document
//! collections (`samples`, `trips`, `models`) and the durable job queues
//! live in one sled database, so a single `FLEETFUEL_DATA_DIR` is the whole
//! deployment surface.
//!
//! Collections hold JSON documents keyed by `_id`; the manifest collection
//! additionally maintains a `(vehicleId, version)` index and exposes the
//! compare-and-swap status transition the trainer's idempotence rests on.
//! Queues provide publish / claim / ack / nack with at-least-once
//! redelivery; see [`queue`].

pub mod error;
pub mod queue;
pub mod store;

pub use error::StoreError;
pub use queue::{Delivery, JobQueue};
pub use store::Store;
