//! Noise calibration: find the noise multiplier that meets a target epsilon.

use serde::{Deserialize, Serialize};
use tracing::debug;

use dp_transport_core::{DpError, Result};

use crate::rdp::{calculate_privacy_loss, check_delta, check_orders};

/// Bisection bracket and stopping rule for [`solve_noise_multiplier_with`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Lower end of the noise-multiplier bracket.
    pub lower: f64,
    /// Upper end of the noise-multiplier bracket.
    pub upper: f64,
    /// Accept a candidate once `|eps - target| <= tolerance`.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 1000.0,
            tolerance: 0.01,
            max_iterations: 200,
        }
    }
}

impl SolverConfig {
    fn validate(&self) -> Result<()> {
        if !self.lower.is_finite() || self.lower < 0.0 {
            return Err(DpError::invalid("solver lower bound must be finite and >= 0"));
        }
        if !self.upper.is_finite() || self.upper <= self.lower {
            return Err(DpError::invalid("solver upper bound must exceed the lower bound"));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(DpError::invalid("solver tolerance must be > 0"));
        }
        if self.max_iterations == 0 {
            return Err(DpError::invalid("solver needs at least one iteration"));
        }
        Ok(())
    }
}

/// Noise multiplier whose `steps`-fold Gaussian composition spends
/// `target_epsilon` at `delta`, to within `0.01`.
pub fn solve_noise_multiplier(
    target_epsilon: f64,
    steps: u64,
    alphas: &[f64],
    delta: f64,
) -> Result<f64> {
    solve_noise_multiplier_with(target_epsilon, steps, alphas, delta, &SolverConfig::default())
}

/// [`solve_noise_multiplier`] with an explicit bracket and tolerance.
///
/// Epsilon is monotone non-increasing in the noise multiplier, so plain
/// bisection works. Targets the bracket cannot reach yield
/// [`DpError::NonConvergence`] rather than a silent loop.
pub fn solve_noise_multiplier_with(
    target_epsilon: f64,
    steps: u64,
    alphas: &[f64],
    delta: f64,
    config: &SolverConfig,
) -> Result<f64> {
    if target_epsilon.is_nan() || target_epsilon <= 0.0 {
        return Err(DpError::invalid("target epsilon must be > 0"));
    }
    if alphas.is_empty() {
        return Err(DpError::invalid("at least one Renyi order is required"));
    }
    check_orders(alphas)?;
    check_delta(delta)?;
    config.validate()?;

    let epsilon_for =
        |nm: f64| -> Result<f64> { Ok(calculate_privacy_loss(steps, alphas, nm, delta)?.epsilon) };
    let non_convergence = || DpError::NonConvergence {
        target_epsilon,
        lower: config.lower,
        upper: config.upper,
    };

    // The largest noise gives the smallest epsilon; the smallest noise the largest.
    if epsilon_for(config.upper)? > target_epsilon + config.tolerance {
        return Err(non_convergence());
    }
    if epsilon_for(config.lower)? < target_epsilon - config.tolerance {
        return Err(non_convergence());
    }

    let mut lo = config.lower;
    let mut hi = config.upper;
    let mut candidate = lo;
    let mut eps = epsilon_for(candidate)?;

    for iteration in 0..config.max_iterations {
        if (eps - target_epsilon).abs() <= config.tolerance {
            debug!(
                target: "dp_transport::calibrate",
                target_epsilon,
                steps,
                noise_multiplier = candidate,
                epsilon = eps,
                iterations = iteration,
                "noise multiplier solved"
            );
            return Ok(candidate);
        }
        if eps > target_epsilon {
            lo = candidate;
        } else {
            hi = candidate;
        }
        candidate = 0.5 * (lo + hi);
        eps = epsilon_for(candidate)?;
    }

    if (eps - target_epsilon).abs() <= config.tolerance {
        return Ok(candidate);
    }
    Err(non_convergence())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::default_alphas;

    #[test]
    fn solved_multiplier_hits_target() {
        let alphas = default_alphas();
        let delta = 1e-6;
        for &target in &[1.0, 10.0, 100.0, 10_000.0] {
            for &steps in &[1u64, 10, 100] {
                let nm = solve_noise_multiplier(target, steps, &alphas, delta).expect("solve");
                let eps = calculate_privacy_loss(steps, &alphas, nm, delta)
                    .expect("loss")
                    .epsilon;
                assert!(
                    (eps - target).abs() <= 0.01,
                    "target={target} steps={steps} nm={nm} eps={eps}"
                );
            }
        }
    }

    #[test]
    fn larger_budget_needs_less_noise() {
        let alphas = default_alphas();
        let tight = solve_noise_multiplier(1.0, 10, &alphas, 1e-6).expect("solve");
        let loose = solve_noise_multiplier(10.0, 10, &alphas, 1e-6).expect("solve");
        assert!(loose < tight);
    }

    #[test]
    fn unreachable_target_reports_non_convergence() {
        let alphas = default_alphas();
        let config = SolverConfig {
            upper: 0.5,
            ..SolverConfig::default()
        };
        let err = solve_noise_multiplier_with(0.01, 100, &alphas, 1e-6, &config).unwrap_err();
        assert!(matches!(err, DpError::NonConvergence { .. }));
    }

    #[test]
    fn rejects_bad_inputs() {
        let alphas = default_alphas();
        assert!(solve_noise_multiplier(0.0, 1, &alphas, 1e-6).is_err());
        assert!(solve_noise_multiplier(1.0, 1, &[], 1e-6).is_err());
        assert!(solve_noise_multiplier(1.0, 1, &alphas, 2.0).is_err());
        let err = solve_noise_multiplier(1.0, 10, &[0.5, 2.0], 1e-6).unwrap_err();
        assert!(matches!(err, DpError::InvalidParameters { .. }));
        let bad = SolverConfig {
            tolerance: 0.0,
            ..SolverConfig::default()
        };
        assert!(solve_noise_multiplier_with(1.0, 1, &alphas, 1e-6, &bad).is_err());
    }
}
