//! The model-ready feature table and its matrix boundary.

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use polars::prelude::*;

/// Dense row-major design matrix extracted from a [`FeatureFrame`].
#[derive(Debug, Clone)]
pub struct XMatrix {
    pub rows: usize,
    pub cols: usize,
    /// Row-major values, `rows * cols` long.
    pub data: Vec<f64>,
    /// Columns requested but absent from the frame, zero-filled.
    pub missing: Vec<String>,
}

impl XMatrix {
    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }
}

/// Feature table with a fixed column order:
/// `["tripId", "timestamp"] + feature_cols (+ ["y"] in training)`.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub df: DataFrame,
    pub feature_cols: Vec<String>,
}

impl FeatureFrame {
    /// Assemble the frame from parallel columns. Order of `features` is
    /// preserved and becomes the input contract.
    pub fn from_columns(
        trip_id: Vec<String>,
        timestamp_ms: Vec<i64>,
        features: Vec<(String, Vec<f64>)>,
        y: Option<Vec<f64>>,
    ) -> Result<Self> {
        let mut columns = vec![
            Series::new("tripId", trip_id),
            Series::new("timestamp", timestamp_ms),
        ];
        let mut feature_cols = Vec::with_capacity(features.len());
        for (name, values) in features {
            columns.push(Series::new(&name, values));
            feature_cols.push(name);
        }
        if let Some(target) = y {
            columns.push(Series::new("y", target));
        }
        let df = DataFrame::new(columns).context("assembling feature frame")?;
        Ok(FeatureFrame { df, feature_cols })
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    pub fn trip_ids(&self) -> Result<Vec<String>> {
        let ids = self.df.column("tripId")?.utf8()?;
        Ok(ids
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect())
    }

    pub fn timestamps_ms(&self) -> Result<Vec<i64>> {
        let ts = self.df.column("timestamp")?.i64()?;
        Ok(ts.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    /// A single numeric column as a dense vector; nulls come back NaN.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let series = self
            .df
            .column(name)
            .with_context(|| format!("feature frame has no column '{name}'"))?
            .f64()?;
        Ok(series.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

    pub fn y(&self) -> Result<Vec<f64>> {
        self.numeric_column("y")
    }

    /// Build the design matrix in exactly the requested column order.
    ///
    /// Columns named but not present are zero-filled and reported in
    /// `missing` — the caller decides how loudly to complain. With
    /// `zero_fill_nan` set, every non-finite cell also becomes 0.0 (the
    /// inference-time boundary); training data is expected to arrive here
    /// already imputed.
    pub fn x_matrix(&self, columns: &[String], zero_fill_nan: bool) -> Result<XMatrix> {
        let rows = self.height();
        let cols = columns.len();
        if cols == 0 {
            return Err(anyhow!("no feature columns requested"));
        }
        let mut data = vec![0.0; rows * cols];
        let mut missing = Vec::new();
        for (c, name) in columns.iter().enumerate() {
            if self.df.column(name).is_err() {
                missing.push(name.clone());
                continue; // already zero-filled
            }
            let values = self.numeric_column(name)?;
            for (r, value) in values.iter().enumerate() {
                data[r * cols + c] = if zero_fill_nan && !value.is_finite() {
                    0.0
                } else {
                    *value
                };
            }
        }
        Ok(XMatrix {
            rows,
            cols,
            data,
            missing,
        })
    }

    /// Diagnostic CSV dump of the whole frame.
    pub fn write_csv(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
        let mut file =
            File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
        CsvWriter::new(&mut file)
            .finish(&mut self.df)
            .with_context(|| format!("writing feature frame to '{}'", path.display()))?;
        Ok(())
    }
}
