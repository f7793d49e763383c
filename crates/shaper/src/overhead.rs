//! Shaping-overhead metrics.
//!
//! Shaped output may have a different number of columns than the input
//! (dynamic mode emits one value per decision, draining may add more), so the
//! shorter matrix is zero-padded before comparing.

use ndarray::{ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use dp_transport_core::{zero_pad_columns, ByteMatrix, DpError, Result};

/// Per-stream byte totals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamOverhead {
    /// `sum(shaped) - sum(original)`.
    pub sum_diff: f64,
    /// `sum(original)`.
    pub sum_original: f64,
}

impl StreamOverhead {
    /// `sum_diff / sum_original`.
    pub fn relative(&self) -> f64 {
        self.sum_diff / self.sum_original
    }
}

/// Mean and sample standard deviation of relative overhead.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverheadStats {
    /// Mean relative overhead.
    pub mean: f64,
    /// Sample standard deviation (zero with fewer than two streams).
    pub std: f64,
}

fn aligned(original: &ByteMatrix, shaped: &ByteMatrix) -> Result<(ByteMatrix, ByteMatrix)> {
    if original.nrows() != shaped.nrows() {
        return Err(DpError::invalid(format!(
            "original has {} streams but shaped has {}",
            original.nrows(),
            shaped.nrows()
        )));
    }
    let cols = original.ncols().max(shaped.ncols());
    Ok((zero_pad_columns(original, cols), zero_pad_columns(shaped, cols)))
}

/// Per-stream overhead of `shaped` over `original`.
pub fn overhead(original: &ByteMatrix, shaped: &ByteMatrix) -> Result<Vec<StreamOverhead>> {
    let (original, shaped) = aligned(original, shaped)?;
    let diff = &shaped - &original;
    Ok(diff
        .sum_axis(Axis(1))
        .iter()
        .zip(original.sum_axis(Axis(1)).iter())
        .map(|(&sum_diff, &sum_original)| StreamOverhead {
            sum_diff,
            sum_original,
        })
        .collect())
}

/// Summarize relative overhead, combining two traffic directions if given.
///
/// Streams whose ratio is not finite (no original bytes) are left out.
pub fn relative_overhead(
    forward: &[StreamOverhead],
    backward: Option<&[StreamOverhead]>,
) -> Result<OverheadStats> {
    let combined: Vec<StreamOverhead> = match backward {
        None => forward.to_vec(),
        Some(back) => {
            if back.len() != forward.len() {
                return Err(DpError::invalid("both directions need the same streams"));
            }
            forward
                .iter()
                .zip(back)
                .map(|(f, b)| StreamOverhead {
                    sum_diff: f.sum_diff + b.sum_diff,
                    sum_original: f.sum_original + b.sum_original,
                })
                .collect()
        }
    };

    let ratios: Vec<f64> = combined
        .iter()
        .map(StreamOverhead::relative)
        .filter(|r| r.is_finite())
        .collect();
    Ok(mean_std(&ratios))
}

/// Relative overhead straight from two matrices.
pub fn norm_overhead(original: &ByteMatrix, shaped: &ByteMatrix) -> Result<OverheadStats> {
    relative_overhead(&overhead(original, shaped)?, None)
}

/// Overhead of padding every trace to the largest trace.
pub fn pacer_overhead(original: &ByteMatrix) -> Vec<StreamOverhead> {
    let sizes = original.sum_axis(Axis(1));
    let largest = sizes.iter().copied().fold(0.0, f64::max);
    sizes
        .iter()
        .map(|&size| StreamOverhead {
            sum_diff: largest - size,
            sum_original: size,
        })
        .collect()
}

/// Share of streams whose shaped total falls short of the original.
pub fn fpa_failure_rate(original: &ByteMatrix, shaped: &ByteMatrix) -> Result<f64> {
    let rows = overhead(original, shaped)?;
    if rows.is_empty() {
        return Ok(0.0);
    }
    let failures = rows.iter().filter(|r| r.sum_diff < 0.0).count();
    Ok(failures as f64 / rows.len() as f64)
}

/// Mean 1-D Wasserstein distance between the L1-normalized shapes of each
/// original and shaped stream, over bucket indices.
pub fn wasserstein_overhead(original: &ByteMatrix, shaped: &ByteMatrix) -> Result<f64> {
    let (original, shaped) = aligned(original, shaped)?;
    if original.nrows() == 0 {
        return Ok(0.0);
    }
    let total: f64 = original
        .outer_iter()
        .zip(shaped.outer_iter())
        .map(|(o, s)| wasserstein_1d(o, s))
        .sum();
    Ok(total / original.nrows() as f64)
}

/// W1 between two weightings of the support `0, 1, ..., n-1`.
fn wasserstein_1d(u: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>) -> f64 {
    let u_norm = u.iter().map(|x| x.abs()).sum::<f64>() + 1e-10;
    let v_norm = v.iter().map(|x| x.abs()).sum::<f64>() + 1e-10;
    let u_total = u.sum() / u_norm;
    let v_total = v.sum() / v_norm;

    let mut u_cdf = 0.0;
    let mut v_cdf = 0.0;
    let mut dist = 0.0;
    let n = u.len();
    for i in 0..n.saturating_sub(1) {
        u_cdf += u[i] / u_norm;
        v_cdf += v[i] / v_norm;
        let cu = if u_total > 0.0 { u_cdf / u_total } else { 0.0 };
        let cv = if v_total > 0.0 { v_cdf / v_total } else { 0.0 };
        dist += (cu - cv).abs();
    }
    dist
}

fn mean_std(values: &[f64]) -> OverheadStats {
    if values.is_empty() {
        return OverheadStats {
            mean: 0.0,
            std: 0.0,
        };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = if values.len() < 2 {
        0.0
    } else {
        (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    };
    OverheadStats { mean, std }
}
