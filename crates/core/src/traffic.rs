//! Per-stream byte-count time series.

use ndarray::{Array1, Array2, ArrayView1, Axis, Slice};

use crate::error::{DpError, Result};

/// Stream label type.
pub type Label = i64;

/// Byte counts laid out as `(streams, buckets)`.
pub type ByteMatrix = Array2<f64>;

/// Labelled input traffic: one row per stream, one column per time bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficMatrix {
    data: ByteMatrix,
    labels: Vec<Label>,
}

impl TrafficMatrix {
    /// Wrap a byte matrix with one label per row.
    ///
    /// Byte counts must be finite and non-negative.
    pub fn new(data: ByteMatrix, labels: Vec<Label>) -> Result<Self> {
        if labels.len() != data.nrows() {
            return Err(DpError::invalid(format!(
                "expected {} labels, got {}",
                data.nrows(),
                labels.len()
            )));
        }
        if data.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(DpError::invalid(
                "byte counts must be finite and non-negative",
            ));
        }
        Ok(Self { data, labels })
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<Label>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != n_cols) {
            return Err(DpError::invalid("rows must all have the same length"));
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((n_rows, n_cols), flat)
            .map_err(|e| DpError::invalid(format!("bad traffic shape: {e}")))?;
        Self::new(data, labels)
    }

    /// Number of streams.
    pub fn num_streams(&self) -> usize {
        self.data.nrows()
    }

    /// Number of time buckets per stream.
    pub fn stream_len(&self) -> usize {
        self.data.ncols()
    }

    /// Underlying byte counts.
    pub fn data(&self) -> &ByteMatrix {
        &self.data
    }

    /// Stream labels in row order.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// One stream's series.
    pub fn stream(&self, index: usize) -> ArrayView1<'_, f64> {
        self.data.row(index)
    }

    /// Per-stream totals.
    pub fn totals(&self) -> Array1<f64> {
        self.data.sum_axis(Axis(1))
    }
}

/// Largest per-bucket spread across streams.
///
/// For every column take `max - min` over streams, then the maximum over
/// columns. This is the data-driven sensitivity used when no administrative
/// bound is configured.
pub fn dataset_sensitivity(data: &ByteMatrix) -> f64 {
    data.axis_iter(Axis(1))
        .map(|col| {
            let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = col.iter().copied().fold(f64::INFINITY, f64::min);
            max - min
        })
        .fold(0.0, f64::max)
}

/// Right-pad every row with zeros up to `cols` columns.
pub fn zero_pad_columns(data: &ByteMatrix, cols: usize) -> ByteMatrix {
    if data.ncols() >= cols {
        return data.clone();
    }
    let mut out = Array2::zeros((data.nrows(), cols));
    out.slice_axis_mut(Axis(1), Slice::from(..data.ncols())).assign(data);
    out
}
