//! Per-feature standardization, persisted next to the model so inference
//! reproduces the exact training transform.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl StandardScaler {
    /// Fit on a row-major matrix. A constant column gets std 1.0 so the
    /// transform stays defined.
    pub fn fit(data: &[f64], rows: usize, cols: usize) -> Self {
        let mut mean = vec![0.0; cols];
        let mut std = vec![1.0; cols];
        if rows == 0 {
            return StandardScaler { mean, std };
        }
        for c in 0..cols {
            let mut sum = 0.0;
            for r in 0..rows {
                sum += data[r * cols + c];
            }
            mean[c] = sum / rows as f64;
        }
        for c in 0..cols {
            let mut sq = 0.0;
            for r in 0..rows {
                let d = data[r * cols + c] - mean[c];
                sq += d * d;
            }
            let s = (sq / rows as f64).sqrt();
            std[c] = if s > 0.0 { s } else { 1.0 };
        }
        StandardScaler { mean, std }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Transform in place, row-major.
    pub fn transform(&self, data: &mut [f64], cols: usize) {
        for (i, value) in data.iter_mut().enumerate() {
            let c = i % cols;
            *value = (*value - self.mean[c]) / self.std[c];
        }
    }

    pub fn transformed(&self, data: &[f64], cols: usize) -> Vec<f64> {
        let mut out = data.to_vec();
        self.transform(&mut out, cols);
        out
    }
}
