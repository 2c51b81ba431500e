//! Regression metrics over paired slices. Non-finite pairs are skipped, so
//! callers can hand these the raw observed series.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub n: usize,
}

/// Compute all three metrics over the finite mask of `(truth, pred)`.
/// Returns `None` when no finite pair remains.
pub fn regression_metrics(truth: &[f64], pred: &[f64]) -> Option<RegressionMetrics> {
    let pairs: Vec<(f64, f64)> = truth
        .iter()
        .zip(pred.iter())
        .filter(|(t, p)| t.is_finite() && p.is_finite())
        .map(|(t, p)| (*t, *p))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    let n = pairs.len();
    let mae = pairs.iter().map(|(t, p)| (t - p).abs()).sum::<f64>() / n as f64;
    let mse = pairs.iter().map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n as f64;
    let mean_t = pairs.iter().map(|(t, _)| t).sum::<f64>() / n as f64;
    let ss_tot = pairs.iter().map(|(t, _)| (t - mean_t).powi(2)).sum::<f64>();
    let ss_res = pairs.iter().map(|(t, p)| (t - p).powi(2)).sum::<f64>();
    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };
    Some(RegressionMetrics {
        mae,
        rmse: mse.sqrt(),
        r2,
        n,
    })
}

pub fn mae(truth: &[f64], pred: &[f64]) -> f64 {
    regression_metrics(truth, pred).map_or(f64::NAN, |m| m.mae)
}

pub fn rmse(truth: &[f64], pred: &[f64]) -> f64 {
    regression_metrics(truth, pred).map_or(f64::NAN, |m| m.rmse)
}

pub fn r2(truth: &[f64], pred: &[f64]) -> f64 {
    regression_metrics(truth, pred).map_or(f64::NAN, |m| m.r2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_prediction_scores_r2_one() {
        let truth = [1.0, 2.0, 3.0];
        let m = regression_metrics(&truth, &truth).unwrap();
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.n, 3);
    }

    #[test]
    fn known_errors() {
        let truth = [0.0, 0.0];
        let pred = [1.0, -1.0];
        let m = regression_metrics(&truth, &pred).unwrap();
        assert_eq!(m.mae, 1.0);
        assert_eq!(m.rmse, 1.0);
    }

    #[test]
    fn non_finite_pairs_are_skipped() {
        let truth = [1.0, f64::NAN, 3.0];
        let pred = [1.0, 2.0, f64::INFINITY];
        let m = regression_metrics(&truth, &pred).unwrap();
        assert_eq!(m.n, 1);
        assert!(regression_metrics(&[f64::NAN], &[1.0]).is_none());
    }
}
