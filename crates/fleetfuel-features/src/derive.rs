//! Derived signals: acceleration, rolling statistics, road grade.
//!
//! Like the speed module, everything here works on contiguous per-trip
//! slices in timestamp order.

use fleetfuel_core::config::FeatureConfig;
use fleetfuel_core::geo::step_distances_m;
use fleetfuel_core::series::{irregular_diff, rolling_mean, rolling_median, rolling_std};

use crate::ROLLING_WINDOW;

const KMH_TO_MS: f64 = 1.0 / 3.6;

/// Step 7 — longitudinal acceleration in m/s² from the fused speed.
///
/// The first sample of a trip and any step whose time delta exceeds
/// `gap_s` are NaN. When `clamp` is set (inference mode) finite values are
/// hard-limited to `[-a_decel_max, +a_accel_max]`.
pub fn acceleration_ms2(
    speed_kmh: &[f64],
    t_s: &[f64],
    dt: &[f64],
    config: &FeatureConfig,
    clamp: bool,
) -> Vec<f64> {
    let v_ms: Vec<f64> = speed_kmh.iter().map(|v| v * KMH_TO_MS).collect();
    let mut accel = irregular_diff(&v_ms, t_s);
    for i in 0..accel.len() {
        if dt[i] > config.gap_s {
            accel[i] = f64::NAN;
        }
        if clamp && accel[i].is_finite() {
            accel[i] = accel[i].clamp(-config.a_decel_max_ms2, config.a_accel_max_ms2);
        }
    }
    accel
}

/// Step 8 — trailing rolling mean and sample std of window 5 with
/// `min_periods = 1`. The std is NaN at each trip's first sample (a
/// single observation has no sample deviation); training later imputes it,
/// inference zero-fills at the matrix boundary.
pub fn rolling_pair(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    (
        rolling_mean(values, ROLLING_WINDOW),
        rolling_std(values, ROLLING_WINDOW),
    )
}

/// Step 9 — road grade from consecutive GPS fixes.
///
/// Pointwise `dh/d` for displacements above one millimeter, smoothed with a
/// per-trip rolling median of window 5.
pub fn grade(lat: &[f64], lon: &[f64], alt: &[f64]) -> Vec<f64> {
    let distances = step_distances_m(lat, lon);
    let n = alt.len();
    let mut raw = vec![f64::NAN; n];
    for i in 1..n {
        let d = distances[i];
        if d > 1e-3 {
            raw[i] = (alt[i] - alt[i - 1]) / d;
        }
    }
    rolling_median(&raw, ROLLING_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> FeatureConfig {
        FeatureConfig::default()
    }

    #[test]
    fn acceleration_first_sample_is_nan() {
        let speed = [36.0, 36.0];
        let t = [0.0, 10.0];
        let dt = [f64::NAN, 10.0];
        let accel = acceleration_ms2(&speed, &t, &dt, &cfg(), false);
        assert!(accel[0].is_nan());
        assert!((accel[1]).abs() < 1e-12);
    }

    #[test]
    fn acceleration_masks_gaps() {
        let speed = [0.0, 36.0];
        let t = [0.0, 7.0]; // beyond gap_s = 6
        let dt = [f64::NAN, 7.0];
        let accel = acceleration_ms2(&speed, &t, &dt, &cfg(), false);
        assert!(accel[1].is_nan());
    }

    #[test]
    fn acceleration_clamps_in_inference_mode() {
        let speed = [0.0, 72.0]; // 20 m/s in one second
        let t = [0.0, 1.0];
        let dt = [f64::NAN, 1.0];
        let free = acceleration_ms2(&speed, &t, &dt, &cfg(), false);
        let clamped = acceleration_ms2(&speed, &t, &dt, &cfg(), true);
        assert!((free[1] - 20.0).abs() < 1e-9);
        assert_eq!(clamped[1], cfg().a_accel_max_ms2);
    }

    #[test]
    fn duplicate_timestamps_do_not_divide_by_zero() {
        let speed = [10.0, 10.0];
        let t = [5.0, 5.0];
        let dt = [f64::NAN, 0.0];
        let accel = acceleration_ms2(&speed, &t, &dt, &cfg(), false);
        assert!(accel[1].is_nan());
    }

    #[test]
    fn rolling_pair_std_is_nan_first() {
        let (mean, std) = rolling_pair(&[10.0, 20.0, 30.0]);
        assert_eq!(mean[0], 10.0);
        assert!(std[0].is_nan());
        assert!(std[1].is_finite());
    }

    #[test]
    fn grade_requires_displacement() {
        // Stationary pair then a 100 m step climbing 5 m.
        let lat = [0.0, 0.0, 100.0 / 111_195.0];
        let lon = [0.0; 3];
        let alt = [10.0, 10.0, 15.0];
        let g = grade(&lat, &lon, &alt);
        // Rolling median over [NaN, NaN, 0.05] → 0.05 at the last position.
        assert!((g[2] - 0.05).abs() < 1e-3);
    }

    #[test]
    fn grade_is_nan_without_altitude() {
        let lat = [0.0, 100.0 / 111_195.0];
        let lon = [0.0; 2];
        let alt = [f64::NAN, f64::NAN];
        let g = grade(&lat, &lon, &alt);
        assert!(g.iter().all(|v| v.is_nan()));
    }
}
