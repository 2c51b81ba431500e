//! # fleetfuel-features: Telemetry Feature Pipeline
//!
//! The deterministic transform from raw, irregularly sampled, multi-sensor
//! trip telemetry to a model-ready feature table. Training and inference
//! run the same code path; [`PipelineMode`] parameterizes the three
//! documented divergences (fusion weight default, row-deletion policy,
//! imputation strategy) so there is no second implementation to drift.
//!
//! Pipeline order is fixed:
//!
//! 1. normalize and sort,
//! 2. GPS plateau backfill,
//! 3. GPS fallback differencing + robust smoothing,
//! 4. physics-based GPS rejection,
//! 5. complementary OBD/GPS fusion,
//! 6. target preparation (training only),
//! 7. acceleration,
//! 8. rolling statistics,
//! 9. road grade,
//! 10. minimum-speed row filter,
//! 11. imputation (training only),
//! 12. feature-frame assembly.

pub mod derive;
pub mod frame;
pub mod pipeline;
pub mod speed;
pub mod table;

pub use frame::FeatureFrame;
pub use pipeline::{build_features, PipelineMode};

/// Ordered model input columns. This list is the input contract: it is
/// written to every artifact at fit time and replayed at inference.
pub const FEATURE_COLUMNS: [&str; 15] = [
    "speedKmh",
    "accel_ms2",
    "obd_rpm",
    "obd_throttle",
    "coolantC",
    "intakeC",
    "speedKmh_mean5",
    "speedKmh_std5",
    "accel_ms2_mean5",
    "accel_ms2_std5",
    "obd_rpm_mean5",
    "obd_rpm_std5",
    "obd_throttle_mean5",
    "obd_throttle_std5",
    "grade",
];

/// Rolling window shared by the smoothers and the `_mean5`/`_std5`
/// features.
pub const ROLLING_WINDOW: usize = 5;
