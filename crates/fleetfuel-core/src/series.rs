//! NaN-aware rolling statistics and irregular-grid differencing.
//!
//! All kernels preserve length and treat NaN as "missing": a NaN neither
//! contributes to a window nor poisons it. A window with fewer valid
//! observations than its minimum yields NaN at that position.

/// Centered rolling median. `min_periods` counts valid (non-NaN) values.
pub fn rolling_median_centered(values: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    rolling_centered(values, window, min_periods, median_of)
}

/// Centered rolling mean. `min_periods` counts valid (non-NaN) values.
pub fn rolling_mean_centered(values: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    rolling_centered(values, window, min_periods, mean_of)
}

/// Robust smoother: centered rolling median then centered rolling mean,
/// both of window `w` with `min_periods = max(1, w/2)`.
pub fn robust_rolling(values: &[f64], window: usize) -> Vec<f64> {
    let min_periods = (window / 2).max(1);
    let medians = rolling_median_centered(values, window, min_periods);
    rolling_mean_centered(&medians, window, min_periods)
}

/// Trailing rolling mean with `min_periods = 1`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling_trailing(values, window, 1, mean_of)
}

/// Trailing rolling sample standard deviation with `min_periods = 1`.
///
/// A single-observation window has no sample deviation and yields NaN, so
/// the first position of every group comes back NaN.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling_trailing(values, window, 1, std_of)
}

/// Trailing rolling median with `min_periods = 1`.
pub fn rolling_median(values: &[f64], window: usize) -> Vec<f64> {
    rolling_trailing(values, window, 1, median_of)
}

/// Pointwise rate of change on an irregular time grid:
/// `(v[i] - v[i-1]) / (t[i] - t[i-1])`.
///
/// The first element is undefined; non-positive deltas and NaN inputs give
/// NaN. Gap masking is the caller's concern.
pub fn irregular_diff(values: &[f64], times_s: &[f64]) -> Vec<f64> {
    let n = values.len().min(times_s.len());
    let mut out = vec![f64::NAN; n];
    for i in 1..n {
        let dt = times_s[i] - times_s[i - 1];
        if dt > 0.0 {
            out[i] = (values[i] - values[i - 1]) / dt;
        }
    }
    out
}

/// Median over the valid values of a whole column; NaN when none remain.
pub fn column_median(values: &[f64]) -> f64 {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = valid.len() / 2;
    if valid.len() % 2 == 0 {
        (valid[mid - 1] + valid[mid]) / 2.0
    } else {
        valid[mid]
    }
}

fn rolling_centered(
    values: &[f64],
    window: usize,
    min_periods: usize,
    stat: fn(&mut Vec<f64>) -> f64,
) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 {
        return out;
    }
    let before = (window - 1) / 2;
    let after = window / 2;
    let mut buf = Vec::with_capacity(window);
    for i in 0..n {
        let start = i.saturating_sub(before);
        let end = (i + after + 1).min(n);
        buf.clear();
        buf.extend(values[start..end].iter().copied().filter(|v| !v.is_nan()));
        if buf.len() >= min_periods.max(1) {
            out[i] = stat(&mut buf);
        }
    }
    out
}

fn rolling_trailing(
    values: &[f64],
    window: usize,
    min_periods: usize,
    stat: fn(&mut Vec<f64>) -> f64,
) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 {
        return out;
    }
    let mut buf = Vec::with_capacity(window);
    for i in 0..n {
        let start = (i + 1).saturating_sub(window);
        buf.clear();
        buf.extend(values[start..=i].iter().copied().filter(|v| !v.is_nan()));
        if buf.len() >= min_periods.max(1) {
            out[i] = stat(&mut buf);
        }
    }
    out
}

fn mean_of(buf: &mut Vec<f64>) -> f64 {
    buf.iter().sum::<f64>() / buf.len() as f64
}

fn median_of(buf: &mut Vec<f64>) -> f64 {
    buf.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = buf.len() / 2;
    if buf.len() % 2 == 0 {
        (buf[mid - 1] + buf[mid]) / 2.0
    } else {
        buf[mid]
    }
}

fn std_of(buf: &mut Vec<f64>) -> f64 {
    let n = buf.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = buf.iter().sum::<f64>() / n as f64;
    let var = buf.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn robust_rolling_preserves_length_and_smooths_spikes() {
        let series = [10.0, 10.0, 10.0, 100.0, 10.0, 10.0, 10.0];
        let smoothed = robust_rolling(&series, 5);
        assert_eq!(smoothed.len(), series.len());
        // The centered median of window 5 removes the single spike entirely.
        assert!(smoothed.iter().all(|v| close(*v, 10.0)), "{smoothed:?}");
    }

    #[test]
    fn robust_rolling_survives_nan_runs() {
        let series = [f64::NAN, 2.0, f64::NAN, 4.0, f64::NAN];
        let smoothed = robust_rolling(&series, 5);
        assert_eq!(smoothed.len(), 5);
        assert!(smoothed.iter().any(|v| !v.is_nan()));
    }

    #[test]
    fn rolling_std_is_nan_on_first_position() {
        let series = [1.0, 2.0, 3.0];
        let std = rolling_std(&series, 5);
        assert!(std[0].is_nan());
        assert!(close(std[1], std::f64::consts::FRAC_1_SQRT_2));
        assert!(close(std[2], 1.0));
    }

    #[test]
    fn rolling_mean_with_min_periods_one_starts_immediately() {
        let series = [2.0, 4.0, 6.0];
        let mean = rolling_mean(&series, 5);
        assert!(close(mean[0], 2.0));
        assert!(close(mean[1], 3.0));
        assert!(close(mean[2], 4.0));
    }

    #[test]
    fn irregular_diff_handles_gaps_and_duplicates() {
        let values = [0.0, 10.0, 20.0, 30.0];
        let times = [0.0, 2.0, 2.0, 4.0];
        let rates = irregular_diff(&values, &times);
        assert!(rates[0].is_nan());
        assert!(close(rates[1], 5.0));
        assert!(rates[2].is_nan()); // duplicate timestamp, dt = 0
        assert!(close(rates[3], 5.0));
    }

    #[test]
    fn column_median_skips_nan() {
        assert!(close(column_median(&[1.0, f64::NAN, 3.0]), 2.0));
        assert!(close(column_median(&[1.0, 2.0, 3.0, 4.0]), 2.5));
        assert!(column_median(&[f64::NAN]).is_nan());
        assert!(column_median(&[]).is_nan());
    }

    #[test]
    fn centered_median_matches_window_bounds() {
        let series = [1.0, 2.0, 3.0, 4.0, 5.0];
        let med = rolling_median_centered(&series, 5, 2);
        // Position 0 sees [1,2,3] — three valid values, median 2.
        assert!(close(med[0], 2.0));
        assert!(close(med[2], 3.0));
        assert!(close(med[4], 4.0));
    }
}
