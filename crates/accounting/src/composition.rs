//! Advanced composition for pure-epsilon mechanisms.
//!
//! Laplace releases are composed with the advanced composition theorem:
//! `k` releases at `epsilon` each cost
//! `sqrt(2 k ln(1/delta)) * epsilon + k * epsilon * (e^epsilon - 1)`.

use tracing::debug;

use dp_transport_core::{DpError, Result};

use crate::rdp::check_delta;

const MAX_BISECTION_STEPS: usize = 200;

/// Total epsilon of `k` adaptive `epsilon`-DP releases at slack `delta`.
pub fn advanced_composition(epsilon: f64, delta: f64, k: u64) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let k = k as f64;
    (2.0 * k * (1.0 / delta).ln()).sqrt() * epsilon + k * epsilon * epsilon.exp_m1()
}

/// Per-release epsilon such that `k` releases compose to `global_epsilon`.
///
/// Inverts [`advanced_composition`] by bisection; the result composes to
/// within `1e-9` of the budget without exceeding it.
pub fn epsilon_per_query_for_budget(global_epsilon: f64, delta: f64, k: u64) -> Result<f64> {
    if !global_epsilon.is_finite() || global_epsilon <= 0.0 {
        return Err(DpError::invalid("global epsilon must be finite and > 0"));
    }
    if k == 0 {
        return Err(DpError::invalid("need at least one release to split a budget"));
    }
    check_delta(delta)?;

    let mut lo = 0.0;
    let mut hi = global_epsilon;
    while advanced_composition(hi, delta, k) < global_epsilon {
        lo = hi;
        hi *= 2.0;
        if !hi.is_finite() {
            return Err(DpError::numerical("could not bracket the per-release epsilon"));
        }
    }

    for _ in 0..MAX_BISECTION_STEPS {
        if hi - lo <= 1e-12 * hi.max(1.0) {
            break;
        }
        let mid = 0.5 * (lo + hi);
        if advanced_composition(mid, delta, k) <= global_epsilon {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    debug!(
        target: "dp_transport::composition",
        global_epsilon,
        k,
        epsilon_per_query = lo,
        "split budget across releases"
    );
    Ok(lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_release_formula() {
        let delta = (-0.5f64).exp();
        // sqrt(2 * 1 * 0.5) = 1
        let eps = advanced_composition(0.1, delta, 1);
        assert!((eps - (0.1 + 0.1 * 0.1f64.exp_m1())).abs() < 1e-12);
    }

    #[test]
    fn zero_releases_cost_nothing() {
        assert_eq!(advanced_composition(1.0, 1e-6, 0), 0.0);
    }

    #[test]
    fn inverse_stays_within_budget() {
        for &(budget, k) in &[(1.0, 10u64), (5.0, 100), (0.5, 1_000), (20.0, 3)] {
            let eps = epsilon_per_query_for_budget(budget, 1e-6, k).expect("split");
            let total = advanced_composition(eps, 1e-6, k);
            assert!(total <= budget + 1e-9);
            assert!((total - budget).abs() < 1e-6, "budget={budget} k={k} total={total}");
        }
    }

    #[test]
    fn more_releases_means_smaller_share() {
        let few = epsilon_per_query_for_budget(2.0, 1e-6, 10).expect("split");
        let many = epsilon_per_query_for_budget(2.0, 1e-6, 100).expect("split");
        assert!(many < few);
    }

    #[test]
    fn rejects_bad_budget() {
        assert!(epsilon_per_query_for_budget(0.0, 1e-6, 10).is_err());
        assert!(epsilon_per_query_for_budget(1.0, 1e-6, 0).is_err());
        assert!(epsilon_per_query_for_budget(1.0, 0.0, 10).is_err());
    }
}
