//! Diagnostic plots written next to each artifact. Nobody consumes these;
//! they exist for the human reviewing a trained model.

use std::path::Path;

use anyhow::{Context, Result};
use plotters::prelude::*;

const SIZE: (u32, u32) = (640, 480);
const BINS: usize = 20;

/// Predicted vs observed with the identity diagonal.
pub fn parity(path: &Path, truth: &[f64], pred: &[f64]) -> Result<()> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let hi = max_of(truth.iter().chain(pred.iter())).max(1e-6);
    let mut chart = ChartBuilder::on(&root)
        .caption("Parity", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(0.0..hi, 0.0..hi)?;
    chart
        .configure_mesh()
        .x_desc("observed mL/s")
        .y_desc("predicted mL/s")
        .draw()?;
    chart.draw_series(
        truth
            .iter()
            .zip(pred.iter())
            .filter(|(t, p)| t.is_finite() && p.is_finite())
            .map(|(t, p)| Circle::new((*t, *p), 2, BLUE.filled())),
    )?;
    chart.draw_series(LineSeries::new(vec![(0.0, 0.0), (hi, hi)], &RED))?;
    root.present().context("writing parity plot")?;
    Ok(())
}

/// Residual (observed − predicted) against the prediction.
pub fn residuals(path: &Path, pred: &[f64], truth: &[f64]) -> Result<()> {
    let res: Vec<(f64, f64)> = pred
        .iter()
        .zip(truth.iter())
        .filter(|(p, t)| p.is_finite() && t.is_finite())
        .map(|(p, t)| (*p, t - p))
        .collect();
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let x_hi = max_of(res.iter().map(|(p, _)| p)).max(1e-6);
    let r_hi = max_of(res.iter().map(|(_, r)| r)).max(1e-6);
    let r_lo = res.iter().map(|(_, r)| *r).fold(0.0f64, f64::min);
    let mut chart = ChartBuilder::on(&root)
        .caption("Residuals vs prediction", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(0.0..x_hi, r_lo..r_hi)?;
    chart
        .configure_mesh()
        .x_desc("predicted mL/s")
        .y_desc("residual mL/s")
        .draw()?;
    chart.draw_series(res.iter().map(|(p, r)| Circle::new((*p, *r), 2, BLUE.filled())))?;
    chart.draw_series(LineSeries::new(vec![(0.0, 0.0), (x_hi, 0.0)], &RED))?;
    root.present().context("writing residual plot")?;
    Ok(())
}

/// Histogram of residuals.
pub fn residual_histogram(path: &Path, truth: &[f64], pred: &[f64]) -> Result<()> {
    let res: Vec<f64> = truth
        .iter()
        .zip(pred.iter())
        .filter(|(t, p)| t.is_finite() && p.is_finite())
        .map(|(t, p)| t - p)
        .collect();
    histogram(path, &res, "Residual histogram", "residual mL/s")
}

/// Histogram of the fused speed feature, a quick look at corpus coverage.
pub fn speed_histogram(path: &Path, speed_kmh: &[f64]) -> Result<()> {
    histogram(path, speed_kmh, "Speed histogram", "speedKmh")
}

fn histogram(path: &Path, values: &[f64], title: &str, x_desc: &str) -> Result<()> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (lo, hi) = if finite.is_empty() {
        (0.0, 1.0)
    } else {
        let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if hi > lo {
            (lo, hi)
        } else {
            (lo - 0.5, lo + 0.5)
        }
    };
    let width = (hi - lo) / BINS as f64;
    let mut counts = vec![0u64; BINS];
    for v in &finite {
        let mut bin = ((v - lo) / width) as usize;
        if bin >= BINS {
            bin = BINS - 1;
        }
        counts[bin] += 1;
    }
    let y_hi = counts.iter().copied().max().unwrap_or(1).max(1) as f64;

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(lo..hi, 0.0..y_hi * 1.05)?;
    chart.configure_mesh().x_desc(x_desc).y_desc("count").draw()?;
    chart.draw_series(counts.iter().enumerate().map(|(i, count)| {
        let x0 = lo + i as f64 * width;
        Rectangle::new([(x0, 0.0), (x0 + width, *count as f64)], BLUE.filled())
    }))?;
    root.present().with_context(|| format!("writing {title}"))?;
    Ok(())
}

fn max_of<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn all_plots_render_to_png() {
        let dir = tempdir().unwrap();
        let truth = vec![0.5, 1.0, 1.5, 2.0, f64::NAN];
        let pred = vec![0.6, 0.9, 1.4, 2.2, 1.0];
        parity(&dir.path().join("parity.png"), &truth, &pred).unwrap();
        residuals(&dir.path().join("residuals.png"), &pred, &truth).unwrap();
        residual_histogram(&dir.path().join("residual_hist.png"), &truth, &pred).unwrap();
        speed_histogram(&dir.path().join("speed_hist.png"), &[0.0, 30.0, 60.0, 90.0]).unwrap();
        for file in ["parity.png", "residuals.png", "residual_hist.png", "speed_hist.png"] {
            assert!(dir.path().join(file).is_file(), "missing {file}");
        }
    }

    #[test]
    fn histograms_tolerate_degenerate_input() {
        let dir = tempdir().unwrap();
        speed_histogram(&dir.path().join("empty.png"), &[]).unwrap();
        speed_histogram(&dir.path().join("constant.png"), &[5.0, 5.0]).unwrap();
    }
}
