//! Deterministic, non-private shaping baselines.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use dp_transport_core::{ByteMatrix, TrafficMatrix};

/// Which baseline to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NonDpMethod {
    /// Every bucket of every stream sent at the global peak.
    #[serde(rename = "constant-rate")]
    ConstantRate,
    /// Every bucket sent at its column's peak across streams.
    #[serde(rename = "pacer")]
    Pacer,
}

/// Shape `traffic` with the chosen baseline.
pub fn shape_non_dp(traffic: &TrafficMatrix, method: NonDpMethod) -> ByteMatrix {
    match method {
        NonDpMethod::ConstantRate => constant_rate(traffic),
        NonDpMethod::Pacer => pacer(traffic),
    }
}

/// Constant-rate shaping: fill every bucket to the largest bucket seen.
pub fn constant_rate(traffic: &TrafficMatrix) -> ByteMatrix {
    let data = traffic.data();
    let peak = data.iter().copied().fold(0.0, f64::max);
    Array2::from_elem(data.dim(), peak)
}

/// Pacer shaping: fill each bucket to the column maximum.
pub fn pacer(traffic: &TrafficMatrix) -> ByteMatrix {
    let data = traffic.data();
    let mut out = Array2::zeros(data.dim());
    for (mut dst, src) in out
        .axis_iter_mut(Axis(1))
        .zip(data.axis_iter(Axis(1)))
    {
        let peak = src.iter().copied().fold(0.0, f64::max);
        dst.fill(peak);
    }
    out
}
