//! Adam training loop with early stopping on a held-back validation slice.

use anyhow::{ensure, Result};
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::artifact::FuelModel;
use crate::net::{FuelNet, FuelNetConfig};
use crate::scaler::StandardScaler;
use crate::{InferBackend, TrainBackend};

#[derive(Debug, Clone)]
pub struct TrainParams {
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    /// Share of rows held back for the early-stopping signal.
    pub validation_fraction: f64,
    /// Stop after this many epochs without a `tol` improvement.
    pub n_iter_no_change: usize,
    pub tol: f64,
    pub seed: u64,
}

impl Default for TrainParams {
    fn default() -> Self {
        TrainParams {
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            batch_size: 200,
            max_epochs: 300,
            validation_fraction: 0.1,
            n_iter_no_change: 10,
            tol: 1e-4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrainReport {
    pub epochs: usize,
    pub best_val_loss: f64,
    pub n_train: usize,
    pub n_val: usize,
}

/// Fit the regressor on a row-major matrix and a natural-unit target.
///
/// The target is `log1p`-transformed and the inputs standardized before
/// the network sees them; the returned [`FuelModel`] carries both
/// transforms, so its predictions come back in mL/s.
pub fn fit(
    x: &[f64],
    rows: usize,
    cols: usize,
    y: &[f64],
    feature_columns: &[String],
    params: &TrainParams,
) -> Result<(FuelModel, TrainReport)> {
    ensure!(rows > 0, "cannot fit on an empty matrix");
    ensure!(cols == feature_columns.len(), "column count mismatch");
    ensure!(x.len() == rows * cols, "matrix shape mismatch");
    ensure!(y.len() == rows, "target length mismatch");

    let scaler = StandardScaler::fit(x, rows, cols);
    let x_std: Vec<f32> = scaler
        .transformed(x, cols)
        .into_iter()
        .map(|v| v as f32)
        .collect();
    // Targets are non-negative rates; clamp protects log1p from stray
    // negative readings.
    let y_log: Vec<f32> = y.iter().map(|v| (v.max(0.0)).ln_1p() as f32).collect();

    let device = <TrainBackend as Backend>::Device::default();
    TrainBackend::seed(&device, params.seed);
    let mut rng = StdRng::seed_from_u64(params.seed);

    // Validation split for early stopping.
    let mut order: Vec<usize> = (0..rows).collect();
    order.shuffle(&mut rng);
    let n_val = ((rows as f64) * params.validation_fraction).round() as usize;
    let n_val = n_val.min(rows.saturating_sub(1));
    let (val_idx, train_idx) = order.split_at(n_val);
    let val_idx = val_idx.to_vec();
    let mut train_idx = train_idx.to_vec();

    let mut model = FuelNetConfig::new(cols).init::<TrainBackend>(&device);
    let mut optim = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(params.weight_decay as f32)))
        .init();

    let mut best_loss = f64::INFINITY;
    let mut best_model = model.clone();
    let mut stall = 0usize;
    let mut epochs_run = 0usize;

    for epoch in 0..params.max_epochs {
        epochs_run = epoch + 1;
        train_idx.shuffle(&mut rng);
        for chunk in train_idx.chunks(params.batch_size.max(1)) {
            let (bx, by) = gather(&x_std, &y_log, cols, chunk);
            let xt = Tensor::<TrainBackend, 2>::from_data(
                TensorData::new(bx, [chunk.len(), cols]),
                &device,
            );
            let yt = Tensor::<TrainBackend, 2>::from_data(
                TensorData::new(by, [chunk.len(), 1]),
                &device,
            );
            let loss = (model.forward(xt) - yt).powf_scalar(2.0).mean();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(params.learning_rate, model, grads);
        }

        // Early-stopping signal: validation loss, or training loss when the
        // corpus is too small to spare rows.
        let monitor_idx: &[usize] = if val_idx.is_empty() { &train_idx } else { &val_idx };
        let loss = mse_on(&model.valid(), &x_std, &y_log, cols, monitor_idx);
        debug!(epoch, loss, "epoch finished");
        if loss < best_loss - params.tol {
            best_loss = loss;
            best_model = model.clone();
            stall = 0;
        } else {
            stall += 1;
            if stall >= params.n_iter_no_change {
                break;
            }
        }
    }

    let report = TrainReport {
        epochs: epochs_run,
        best_val_loss: best_loss,
        n_train: train_idx.len(),
        n_val: val_idx.len(),
    };
    let model = FuelModel::new(best_model.valid(), scaler, feature_columns.to_vec());
    Ok((model, report))
}

fn gather(x: &[f32], y: &[f32], cols: usize, idx: &[usize]) -> (Vec<f32>, Vec<f32>) {
    let mut bx = Vec::with_capacity(idx.len() * cols);
    let mut by = Vec::with_capacity(idx.len());
    for &r in idx {
        bx.extend_from_slice(&x[r * cols..(r + 1) * cols]);
        by.push(y[r]);
    }
    (bx, by)
}

fn mse_on(
    net: &FuelNet<InferBackend>,
    x: &[f32],
    y: &[f32],
    cols: usize,
    idx: &[usize],
) -> f64 {
    if idx.is_empty() {
        return f64::INFINITY;
    }
    let device = <InferBackend as Backend>::Device::default();
    let (bx, by) = gather(x, y, cols, idx);
    let xt = Tensor::<InferBackend, 2>::from_data(TensorData::new(bx, [idx.len(), cols]), &device);
    let pred: Vec<f32> = net.forward(xt).to_data().to_vec().unwrap_or_default();
    if pred.len() != by.len() {
        return f64::INFINITY;
    }
    pred.iter()
        .zip(by.iter())
        .map(|(p, t)| ((p - t) as f64).powi(2))
        .sum::<f64>()
        / by.len() as f64
}
