//! Pipeline and service configuration.
//!
//! Every tunable of the feature pipeline can be overridden through a
//! `FLEETFUEL_`-prefixed environment variable; the consumers read their
//! store/queue locations the same way. Defaults are the shipped values.

use std::env;

use anyhow::{Context, Result};

/// Tunables of the feature pipeline.
///
/// The same struct drives training and inference; the two entry points of
/// `fleetfuel-features` start from [`FeatureConfig::default`] and
/// [`FeatureConfig::inference`] respectively and differ only where
/// documented.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    /// Row retention threshold on the fused speed. Rows below it are kept
    /// only when they carry a target. 0 disables the filter.
    pub min_speed_kmh: f64,
    /// Inter-sample delta above which derived rates are discarded (s).
    pub gap_s: f64,
    /// Base weight of the OBD speed in complementary fusion.
    pub alpha: f64,
    /// Optional idle-row filter and its thresholds.
    pub drop_idle: bool,
    pub idle_speed_kmh: f64,
    pub idle_fuel_mls: f64,
    /// |OBD − GPS| above this escalates the fusion weight (km/h).
    pub mismatch_kmh: f64,
    /// Physical acceleration bounds for GPS rejection (m/s²).
    pub a_accel_max_ms2: f64,
    pub a_decel_max_ms2: f64,
    /// Slack added to the admissible speed interval (km/h).
    pub phys_margin_kmh: f64,
    /// Plateau detection: same-position displacement and span window.
    pub gps_same_eps_m: f64,
    pub gps_min_span_s: f64,
    pub gps_max_span_s: f64,
    /// Hard speed clamp (km/h).
    pub vmax_kmh: f64,
    /// Accepted but observed by no step. Reserved.
    pub break_s: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            min_speed_kmh: 0.0,
            gap_s: 6.0,
            alpha: 0.6,
            drop_idle: false,
            idle_speed_kmh: 0.05,
            idle_fuel_mls: 0.005,
            mismatch_kmh: 15.0,
            a_accel_max_ms2: 6.0,
            a_decel_max_ms2: 6.0,
            phys_margin_kmh: 5.0,
            gps_same_eps_m: 2.0,
            gps_min_span_s: 1.5,
            gps_max_span_s: 15.0,
            vmax_kmh: 160.0,
            break_s: 180.0,
        }
    }
}

impl FeatureConfig {
    /// Inference-time defaults: heavier trust in GPS.
    pub fn inference() -> Self {
        FeatureConfig {
            alpha: 0.7,
            ..FeatureConfig::default()
        }
    }

    /// Training defaults with `FLEETFUEL_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = FeatureConfig::default();
        override_f64("FLEETFUEL_MIN_SPEED_KMH", &mut config.min_speed_kmh)?;
        override_f64("FLEETFUEL_GAP_S", &mut config.gap_s)?;
        override_f64("FLEETFUEL_ALPHA", &mut config.alpha)?;
        override_bool("FLEETFUEL_DROP_IDLE", &mut config.drop_idle)?;
        override_f64("FLEETFUEL_IDLE_SPEED_KMH", &mut config.idle_speed_kmh)?;
        override_f64("FLEETFUEL_IDLE_FUEL_MLS", &mut config.idle_fuel_mls)?;
        override_f64("FLEETFUEL_MISMATCH_KMH", &mut config.mismatch_kmh)?;
        override_f64("FLEETFUEL_A_ACCEL_MAX_MS2", &mut config.a_accel_max_ms2)?;
        override_f64("FLEETFUEL_A_DECEL_MAX_MS2", &mut config.a_decel_max_ms2)?;
        override_f64("FLEETFUEL_PHYS_MARGIN_KMH", &mut config.phys_margin_kmh)?;
        override_f64("FLEETFUEL_GPS_SAME_EPS_M", &mut config.gps_same_eps_m)?;
        override_f64("FLEETFUEL_GPS_MIN_SPAN_S", &mut config.gps_min_span_s)?;
        override_f64("FLEETFUEL_GPS_MAX_SPAN_S", &mut config.gps_max_span_s)?;
        override_f64("FLEETFUEL_VMAX_KMH", &mut config.vmax_kmh)?;
        override_f64("FLEETFUEL_BREAK_S", &mut config.break_s)?;
        Ok(config)
    }
}

/// Store, model-volume, and queue locations shared by every binary.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path of the embedded document database.
    pub data_dir: String,
    /// Root of the shared model volume.
    pub models_root: String,
    pub train_queue: String,
    pub predict_queue: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            data_dir: "fleetfuel-data".into(),
            models_root: "models".into(),
            train_queue: "model-train".into(),
            predict_queue: "predict.trip".into(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let mut config = ServiceConfig::default();
        if let Ok(value) = env::var("FLEETFUEL_DATA_DIR") {
            config.data_dir = value;
        }
        if let Ok(value) = env::var("FLEETFUEL_MODELS_ROOT") {
            config.models_root = value;
        }
        if let Ok(value) = env::var("FLEETFUEL_TRAIN_QUEUE") {
            config.train_queue = value;
        }
        if let Ok(value) = env::var("FLEETFUEL_PREDICT_QUEUE") {
            config.predict_queue = value;
        }
        config
    }
}

fn override_f64(name: &str, slot: &mut f64) -> Result<()> {
    if let Ok(raw) = env::var(name) {
        *slot = raw
            .trim()
            .parse::<f64>()
            .with_context(|| format!("parsing {name}='{raw}' as a number"))?;
    }
    Ok(())
}

fn override_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Ok(raw) = env::var(name) {
        *slot = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            other => anyhow::bail!("parsing {name}='{other}' as a boolean"),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_values() {
        let config = FeatureConfig::default();
        assert_eq!(config.alpha, 0.6);
        assert_eq!(config.gap_s, 6.0);
        assert_eq!(config.vmax_kmh, 160.0);
        assert!(!config.drop_idle);
    }

    #[test]
    fn inference_defaults_shift_alpha_only() {
        let train = FeatureConfig::default();
        let infer = FeatureConfig::inference();
        assert_eq!(infer.alpha, 0.7);
        assert_eq!(
            FeatureConfig {
                alpha: train.alpha,
                ..infer
            },
            train
        );
    }

    // One test touches the process environment; keeping it single avoids
    // cross-test races on shared variables.
    #[test]
    fn environment_overrides_apply_and_reject_garbage() {
        env::set_var("FLEETFUEL_VMAX_KMH", "120.5");
        env::set_var("FLEETFUEL_DROP_IDLE", "true");
        let config = FeatureConfig::from_env().unwrap();
        assert_eq!(config.vmax_kmh, 120.5);
        assert!(config.drop_idle);

        env::set_var("FLEETFUEL_GAP_S", "often");
        assert!(FeatureConfig::from_env().is_err());

        env::remove_var("FLEETFUEL_VMAX_KMH");
        env::remove_var("FLEETFUEL_DROP_IDLE");
        env::remove_var("FLEETFUEL_GAP_S");
    }
}
