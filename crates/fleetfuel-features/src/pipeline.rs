//! The pipeline orchestrator: runs the fixed step order over a sample
//! table and emits the feature frame.

use anyhow::Result;
use fleetfuel_core::config::FeatureConfig;
use fleetfuel_core::series::column_median;
use fleetfuel_core::types::SampleRow;

use crate::derive::{acceleration_ms2, grade, rolling_pair};
use crate::frame::FeatureFrame;
use crate::speed::{fuse_speeds, gps_speed_series, plateau_backfill, reject_implausible_gps};
use crate::table::{retain_rows, TripTable};
use crate::FEATURE_COLUMNS;

/// Which side of the train/serve boundary is running the pipeline.
///
/// Training owns row-level cleaning: it sees the whole corpus, so it can
/// drop target-less rows and estimate imputation medians. Inference must
/// never delete a row — every sample contributes to the fuel
/// time-integral — so it keeps everything and zero-fills at the matrix
/// boundary instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    Train,
    Infer,
}

/// Run the feature pipeline over flattened samples of one or more trips.
///
/// The output frame has columns `["tripId", "timestamp"] + FEATURE_COLUMNS`
/// plus `"y"` in train mode. Row order follows `(tripId, timestamp)`.
pub fn build_features(
    rows: Vec<SampleRow>,
    config: &FeatureConfig,
    mode: PipelineMode,
) -> Result<FeatureFrame> {
    // Step 1: normalize, drop unpositioned rows, sort.
    let mut table = TripTable::normalize(rows);

    // Steps 2–5: per-trip speed reconstruction and fusion.
    let mut speed = vec![f64::NAN; table.len()];
    {
        let dt = table.trip_dt();
        for (start, end) in table.trip_bounds() {
            let lat = &table.lat[start..end];
            let lon = &table.lon[start..end];
            let t = &table.t_s[start..end];
            let obd = &table.obd_kmh[start..end];

            let backfilled = plateau_backfill(lat, lon, t, config);
            let (_raw, mut smooth) = gps_speed_series(lat, lon, t, &backfilled, config);
            reject_implausible_gps(&mut smooth, obd, &dt[start..end], config);
            let fused = fuse_speeds(obd, &smooth, config);
            speed[start..end].copy_from_slice(&fused);
        }
    }

    // Step 6 (train only): target preparation — rows without a fuel
    // reading carry no signal, and optionally neither do idle rows.
    if mode == PipelineMode::Train {
        let keep: Vec<bool> = (0..table.len())
            .map(|i| {
                if table.fuel[i].is_nan() {
                    return false;
                }
                if config.drop_idle
                    && speed[i] < config.idle_speed_kmh
                    && table.fuel[i] < config.idle_fuel_mls
                {
                    return false;
                }
                true
            })
            .collect();
        table.retain(&keep);
        retain_rows(&mut speed, &keep);
    }

    // Steps 7–9: per-trip derived signals on the retained rows.
    let n = table.len();
    let mut accel = vec![f64::NAN; n];
    let mut speed_mean = vec![f64::NAN; n];
    let mut speed_std = vec![f64::NAN; n];
    let mut accel_mean = vec![f64::NAN; n];
    let mut accel_std = vec![f64::NAN; n];
    let mut rpm_mean = vec![f64::NAN; n];
    let mut rpm_std = vec![f64::NAN; n];
    let mut throttle_mean = vec![f64::NAN; n];
    let mut throttle_std = vec![f64::NAN; n];
    let mut grade_col = vec![f64::NAN; n];
    {
        let dt = table.trip_dt();
        let clamp = mode == PipelineMode::Infer;
        for (start, end) in table.trip_bounds() {
            let slice_accel = acceleration_ms2(
                &speed[start..end],
                &table.t_s[start..end],
                &dt[start..end],
                config,
                clamp,
            );
            accel[start..end].copy_from_slice(&slice_accel);

            let (m, s) = rolling_pair(&speed[start..end]);
            speed_mean[start..end].copy_from_slice(&m);
            speed_std[start..end].copy_from_slice(&s);
            let (m, s) = rolling_pair(&slice_accel);
            accel_mean[start..end].copy_from_slice(&m);
            accel_std[start..end].copy_from_slice(&s);
            let (m, s) = rolling_pair(&table.rpm[start..end]);
            rpm_mean[start..end].copy_from_slice(&m);
            rpm_std[start..end].copy_from_slice(&s);
            let (m, s) = rolling_pair(&table.throttle[start..end]);
            throttle_mean[start..end].copy_from_slice(&m);
            throttle_std[start..end].copy_from_slice(&s);

            let g = grade(
                &table.lat[start..end],
                &table.lon[start..end],
                &table.alt[start..end],
            );
            grade_col[start..end].copy_from_slice(&g);
        }
    }

    let mut features: Vec<(String, Vec<f64>)> = vec![
        ("speedKmh".into(), speed),
        ("accel_ms2".into(), accel),
        ("obd_rpm".into(), table.rpm.clone()),
        ("obd_throttle".into(), table.throttle.clone()),
        ("coolantC".into(), table.coolant.clone()),
        ("intakeC".into(), table.intake.clone()),
        ("speedKmh_mean5".into(), speed_mean),
        ("speedKmh_std5".into(), speed_std),
        ("accel_ms2_mean5".into(), accel_mean),
        ("accel_ms2_std5".into(), accel_std),
        ("obd_rpm_mean5".into(), rpm_mean),
        ("obd_rpm_std5".into(), rpm_std),
        ("obd_throttle_mean5".into(), throttle_mean),
        ("obd_throttle_std5".into(), throttle_std),
        ("grade".into(), grade_col),
    ];
    debug_assert!(features
        .iter()
        .map(|(name, _)| name.as_str())
        .eq(FEATURE_COLUMNS));

    if mode == PipelineMode::Train {
        // Step 10: minimum-speed row filter.
        if config.min_speed_kmh > 0.0 {
            let speed_col = &features[0].1;
            let keep: Vec<bool> = (0..table.len())
                .map(|i| speed_col[i] >= config.min_speed_kmh || !table.fuel[i].is_nan())
                .collect();
            table.retain(&keep);
            for (_, column) in features.iter_mut() {
                retain_rows(column, &keep);
            }
        }

        // Step 11: drop rows with no target or no features at all, then
        // impute what is left with corpus-wide column medians.
        let keep: Vec<bool> = (0..table.len())
            .map(|i| {
                !table.fuel[i].is_nan()
                    && features.iter().any(|(_, column)| !column[i].is_nan())
            })
            .collect();
        table.retain(&keep);
        for (_, column) in features.iter_mut() {
            retain_rows(column, &keep);
        }
        for (_, column) in features.iter_mut() {
            let mut median = column_median(column);
            if !median.is_finite() {
                // A column that is missing across the entire corpus has no
                // median; it degenerates to zero rather than poisoning X.
                median = 0.0;
            }
            for value in column.iter_mut() {
                if !value.is_finite() {
                    *value = median;
                }
            }
        }
    }

    let timestamp_ms: Vec<i64> = table
        .timestamp
        .iter()
        .map(|ts| ts.timestamp_millis())
        .collect();
    let y = match mode {
        PipelineMode::Train => Some(table.fuel.clone()),
        PipelineMode::Infer => None,
    };
    FeatureFrame::from_columns(table.trip_id.clone(), timestamp_ms, features, y)
}
