//! Speed reconstruction: plateau backfill, fallback differencing, robust
//! smoothing, physics-based rejection, and complementary OBD/GPS fusion.
//!
//! Everything in this module operates on one trip at a time — the inputs
//! are contiguous per-trip slices in timestamp order.

use fleetfuel_core::config::FeatureConfig;
use fleetfuel_core::geo::haversine_m;
use fleetfuel_core::series::robust_rolling;

use crate::ROLLING_WINDOW;

const MS_TO_KMH: f64 = 3.6;

/// Step 2 — GPS speed reconstruction across stationary-fix plateaus.
///
/// GPS hardware can hold a fix frozen across several ticks; speed cannot be
/// inferred inside such a plateau but is known retroactively once the first
/// real displacement shows up. Maintain an anchor `i`; advance `j` while the
/// displacement from `i` stays within `gps_same_eps_m`. When sample `j`
/// breaks out, the average speed over `(i, j]` is assigned to every sample
/// in that span, provided the span duration lies in
/// `(gps_min_span_s, gps_max_span_s]`. An unresolved tail stays NaN.
pub fn plateau_backfill(lat: &[f64], lon: &[f64], t_s: &[f64], config: &FeatureConfig) -> Vec<f64> {
    let n = lat.len();
    let mut speed = vec![f64::NAN; n];
    if n < 2 {
        return speed;
    }
    let mut anchor = 0;
    while anchor < n - 1 {
        let mut breakout = None;
        for j in anchor + 1..n {
            let d = haversine_m(lat[anchor], lon[anchor], lat[j], lon[j]);
            if d.is_nan() {
                continue;
            }
            if d > config.gps_same_eps_m {
                breakout = Some((j, d));
                break;
            }
        }
        let Some((j, distance)) = breakout else {
            break; // stationary tail, nothing to backfill
        };
        let span = t_s[j] - t_s[anchor];
        if span > config.gps_min_span_s && span <= config.gps_max_span_s {
            let kmh = distance / span * MS_TO_KMH;
            for slot in speed.iter_mut().take(j + 1).skip(anchor + 1) {
                *slot = kmh;
            }
        }
        anchor = j;
    }
    speed
}

/// Step 3 — fill the gaps left by the backfill with per-step differencing,
/// then smooth. Returns `(raw, smoothed)`, both clipped at `vmax_kmh`.
///
/// Per-step speeds are invalid when `dt <= 0` or `dt > gap_s`.
pub fn gps_speed_series(
    lat: &[f64],
    lon: &[f64],
    t_s: &[f64],
    backfilled: &[f64],
    config: &FeatureConfig,
) -> (Vec<f64>, Vec<f64>) {
    let n = lat.len();
    let mut raw = backfilled.to_vec();
    for i in 1..n {
        if !raw[i].is_nan() {
            continue;
        }
        let dt = t_s[i] - t_s[i - 1];
        if dt <= 0.0 || dt > config.gap_s {
            continue;
        }
        let d = haversine_m(lat[i - 1], lon[i - 1], lat[i], lon[i]);
        if d.is_nan() {
            continue;
        }
        raw[i] = d / dt * MS_TO_KMH;
    }
    clip_upper(&mut raw, config.vmax_kmh);
    let mut smoothed = robust_rolling(&raw, ROLLING_WINDOW);
    clip_upper(&mut smoothed, config.vmax_kmh);
    (raw, smoothed)
}

/// Step 4 — physics-based rejection of the smoothed GPS speed.
///
/// The previous OBD speed (falling back to the previous smoothed GPS
/// speed) bounds what the current speed can physically be:
///
/// ```text
/// [max(0, v_prev − a_decel·dt·3.6) − margin, v_prev + a_accel·dt·3.6 + margin]
/// ```
///
/// A smoothed value outside the interval becomes NaN. Rows with no
/// reference speed or no time delta are left intact. The reference uses
/// the pre-rejection series throughout, so the pass is order-independent.
pub fn reject_implausible_gps(
    gps_smooth: &mut [f64],
    obd_kmh: &[f64],
    dt: &[f64],
    config: &FeatureConfig,
) {
    let reference: Vec<f64> = gps_smooth.to_vec();
    for i in 1..gps_smooth.len() {
        let step = dt[i];
        if step.is_nan() {
            continue;
        }
        let v_prev = if !obd_kmh[i - 1].is_nan() {
            obd_kmh[i - 1]
        } else {
            reference[i - 1]
        };
        if v_prev.is_nan() {
            continue;
        }
        let lower = (v_prev - config.a_decel_max_ms2 * step * MS_TO_KMH).max(0.0)
            - config.phys_margin_kmh;
        let upper = v_prev + config.a_accel_max_ms2 * step * MS_TO_KMH + config.phys_margin_kmh;
        let v = gps_smooth[i];
        if !v.is_nan() && (v < lower || v > upper) {
            gps_smooth[i] = f64::NAN;
        }
    }
}

/// Step 5 — complementary fusion of OBD and (smoothed) GPS speeds.
///
/// The weight escalates from the configured base: GPS-less rows lean on OBD
/// at 0.85, rows where the sensors disagree by more than `mismatch_kmh`
/// lean at least 0.75. Where the weighted combination is undefined the
/// surviving sensor wins outright.
pub fn fuse_speeds(obd_kmh: &[f64], gps_kmh: &[f64], config: &FeatureConfig) -> Vec<f64> {
    let n = obd_kmh.len();
    let mut fused = vec![f64::NAN; n];
    for i in 0..n {
        let obd = obd_kmh[i];
        let gps = gps_kmh[i];
        let mut alpha = config.alpha;
        if gps.is_nan() {
            alpha = 0.85;
        }
        if (obd - gps).abs() > config.mismatch_kmh {
            alpha = alpha.max(0.75);
        }
        let mut v = alpha * obd + (1.0 - alpha) * gps;
        if v.is_nan() {
            if !obd.is_nan() {
                v = obd;
            } else if !gps.is_nan() {
                v = gps;
            }
        }
        if v > config.vmax_kmh {
            v = config.vmax_kmh;
        }
        fused[i] = v;
    }
    fused
}

fn clip_upper(values: &mut [f64], cap: f64) {
    for v in values.iter_mut() {
        if *v > cap {
            *v = cap;
        }
    }
}
