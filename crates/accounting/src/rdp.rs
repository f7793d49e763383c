//! Rényi Differential Privacy accounting for the Gaussian mechanism.
//!
//! All series are summed in log space; `A_alpha` overflows `f64` long before
//! the orders and step counts used for traffic shaping stop being interesting.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;
use statrs::function::factorial::ln_binomial;

use dp_transport_core::{DpError, Result};

/// Default log-magnitude below which the fractional-order series stops.
pub const DEFAULT_SERIES_CUTOFF: f64 = -30.0;

const MAX_SERIES_TERMS: usize = 100_000;

/// Tuning knobs for the fractional-order RDP series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RdpSeriesConfig {
    /// Stop once the largest new log-term drops below this value.
    pub cutoff: f64,
}

impl Default for RdpSeriesConfig {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_SERIES_CUTOFF,
        }
    }
}

/// An `(epsilon, delta)` guarantee obtained from RDP, with the order that won.
///
/// `epsilon == ∞` with a NaN `best_alpha` means no order gives any privacy,
/// e.g. because the noise multiplier is zero.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PrivacyLoss {
    /// Tightest epsilon over all candidate orders.
    pub epsilon: f64,
    /// Order achieving `epsilon`.
    pub best_alpha: f64,
}

impl PrivacyLoss {
    /// The "no privacy" result.
    pub fn no_privacy() -> Self {
        Self {
            epsilon: f64::INFINITY,
            best_alpha: f64::NAN,
        }
    }

    /// Whether the guarantee is finite.
    pub fn is_private(&self) -> bool {
        self.epsilon.is_finite()
    }
}

/// Candidate Rényi orders: `1.1, 1.2, ..., 10.9` then `12, ..., 63`.
///
/// Small step counts and large noise favor orders near 1; long compositions
/// at low noise favor the coarse integer tail.
pub fn default_alphas() -> Vec<f64> {
    let mut alphas: Vec<f64> = (1..100).map(|x| 1.0 + x as f64 / 10.0).collect();
    alphas.extend((12..64).map(|a| a as f64));
    alphas
}

/// RDP of one full-batch Gaussian release at order `alpha`.
pub fn rdp_at_order(noise_multiplier: f64, alpha: f64) -> f64 {
    if noise_multiplier.is_nan() || noise_multiplier <= 0.0 || alpha.is_infinite() {
        return f64::INFINITY;
    }
    alpha / (2.0 * noise_multiplier * noise_multiplier)
}

/// RDP of one Poisson-subsampled Gaussian release at order `alpha`.
pub fn subsampled_rdp(q: f64, noise_multiplier: f64, alpha: f64) -> Result<f64> {
    subsampled_rdp_with(q, noise_multiplier, alpha, &RdpSeriesConfig::default())
}

/// [`subsampled_rdp`] with an explicit series configuration.
pub fn subsampled_rdp_with(
    q: f64,
    noise_multiplier: f64,
    alpha: f64,
    series: &RdpSeriesConfig,
) -> Result<f64> {
    if !(0.0..=1.0).contains(&q) {
        return Err(DpError::invalid("sampling rate must lie in [0, 1]"));
    }
    if alpha.is_nan() || alpha <= 1.0 {
        return Err(DpError::invalid("Renyi order must be > 1"));
    }
    if q == 0.0 {
        return Ok(0.0);
    }
    if noise_multiplier.is_nan() || noise_multiplier <= 0.0 {
        return Ok(f64::INFINITY);
    }
    if q == 1.0 {
        return Ok(rdp_at_order(noise_multiplier, alpha));
    }
    if alpha.is_infinite() {
        return Ok(f64::INFINITY);
    }

    let log_a = if is_integer(alpha) {
        log_a_int(q, noise_multiplier, alpha as u64)
    } else {
        log_a_frac(q, noise_multiplier, alpha, series.cutoff)?
    };
    Ok(log_a / (alpha - 1.0))
}

/// Per-order RDP of `steps` subsampled Gaussian releases.
pub fn compute_rdp(q: f64, noise_multiplier: f64, steps: u64, alphas: &[f64]) -> Result<Vec<f64>> {
    let steps = steps as f64;
    alphas
        .iter()
        .map(|&alpha| subsampled_rdp(q, noise_multiplier, alpha).map(|rdp| rdp * steps))
        .collect()
}

/// Per-order RDP of `steps` full-batch Gaussian releases.
///
/// Gaussian RDP composes linearly at a fixed noise level.
pub fn compute_total_rdp(noise_multiplier: f64, steps: u64, alphas: &[f64]) -> Vec<f64> {
    if steps == 0 {
        return vec![0.0; alphas.len()];
    }
    let steps = steps as f64;
    alphas
        .iter()
        .map(|&alpha| rdp_at_order(noise_multiplier, alpha) * steps)
        .collect()
}

/// Convert per-order RDP to the tightest `(epsilon, delta)` guarantee.
///
/// `eps(alpha) = rdp(alpha) - ln(delta) / (alpha - 1)`; NaN entries are
/// skipped. Every order must be finite and above 1.
pub fn rdp_to_dp(alphas: &[f64], rdp: &[f64], delta: f64) -> Result<PrivacyLoss> {
    if alphas.len() != rdp.len() {
        return Err(DpError::invalid(format!(
            "got {} orders but {} rdp values",
            alphas.len(),
            rdp.len()
        )));
    }
    check_orders(alphas)?;
    check_delta(delta)?;

    let log_delta = delta.ln();
    let mut best = PrivacyLoss::no_privacy();
    for (&alpha, &value) in alphas.iter().zip(rdp.iter()) {
        let eps = value - log_delta / (alpha - 1.0);
        if eps < best.epsilon {
            best = PrivacyLoss {
                epsilon: eps,
                best_alpha: alpha,
            };
        }
    }
    Ok(best)
}

/// Privacy loss of `steps` full-batch Gaussian releases.
pub fn calculate_privacy_loss(
    steps: u64,
    alphas: &[f64],
    noise_multiplier: f64,
    delta: f64,
) -> Result<PrivacyLoss> {
    let rdp = compute_total_rdp(noise_multiplier, steps, alphas);
    rdp_to_dp(alphas, &rdp, delta)
}

pub(crate) fn check_orders(alphas: &[f64]) -> Result<()> {
    match alphas.iter().find(|&&a| !(a.is_finite() && a > 1.0)) {
        Some(alpha) => Err(DpError::invalid(format!(
            "Renyi order {alpha} must be finite and > 1"
        ))),
        None => Ok(()),
    }
}

pub(crate) fn check_delta(delta: f64) -> Result<()> {
    if !delta.is_finite() || delta <= 0.0 || delta >= 1.0 {
        return Err(DpError::invalid("delta must be in (0, 1)"));
    }
    Ok(())
}

/// Composition ledger: per-order RDP accumulated over recorded releases.
#[derive(Clone, Debug)]
pub struct RdpAccountant {
    orders: Vec<f64>,
    rdp: Vec<f64>,
    steps: u64,
    series: RdpSeriesConfig,
}

impl Default for RdpAccountant {
    fn default() -> Self {
        Self::new()
    }
}

impl RdpAccountant {
    /// Create an accountant over [`default_alphas`].
    pub fn new() -> Self {
        Self::with_orders(default_alphas())
    }

    /// Create an accountant with custom orders.
    ///
    /// Orders that are not finite and above 1 are dropped; an empty result
    /// falls back to the defaults.
    pub fn with_orders(orders: Vec<f64>) -> Self {
        let mut orders: Vec<f64> = orders
            .into_iter()
            .filter(|&a| a.is_finite() && a > 1.0)
            .collect();
        orders.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        orders.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

        if orders.is_empty() {
            orders = default_alphas();
        }

        let rdp = vec![0.0; orders.len()];
        Self {
            orders,
            rdp,
            steps: 0,
            series: RdpSeriesConfig::default(),
        }
    }

    /// Override the fractional-order series configuration.
    pub fn with_series_config(mut self, series: RdpSeriesConfig) -> Self {
        self.series = series;
        self
    }

    /// Record `steps` full-batch Gaussian releases.
    pub fn compose(&mut self, noise_multiplier: f64, steps: u64) {
        if steps == 0 {
            return;
        }
        let added = compute_total_rdp(noise_multiplier, steps, &self.orders);
        self.accumulate(&added, steps);
    }

    /// Record `steps` Poisson-subsampled Gaussian releases.
    pub fn compose_subsampled(&mut self, q: f64, noise_multiplier: f64, steps: u64) -> Result<()> {
        if steps == 0 {
            return Ok(());
        }
        let n = steps as f64;
        let added = self
            .orders
            .iter()
            .map(|&alpha| {
                subsampled_rdp_with(q, noise_multiplier, alpha, &self.series).map(|r| r * n)
            })
            .collect::<Result<Vec<f64>>>()?;
        self.accumulate(&added, steps);
        Ok(())
    }

    fn accumulate(&mut self, added: &[f64], steps: u64) {
        for (acc, &value) in self.rdp.iter_mut().zip(added) {
            if value.is_finite() {
                *acc += value;
            } else {
                *acc = f64::INFINITY;
            }
        }
        self.steps = self.steps.saturating_add(steps);
    }

    /// Orders tracked by this accountant.
    pub fn orders(&self) -> &[f64] {
        &self.orders
    }

    /// Accumulated RDP per order.
    pub fn rdp(&self) -> &[f64] {
        &self.rdp
    }

    /// Number of releases recorded so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Convert the ledger to `(epsilon, delta)`-DP.
    pub fn privacy_loss(&self, delta: f64) -> Result<PrivacyLoss> {
        rdp_to_dp(&self.orders, &self.rdp, delta)
    }

    /// Epsilon at `delta`, or infinity for an invalid delta.
    pub fn epsilon(&self, delta: f64) -> f64 {
        self.privacy_loss(delta)
            .map(|loss| loss.epsilon)
            .unwrap_or(f64::INFINITY)
    }

    /// Reset the accountant.
    pub fn reset(&mut self) {
        self.rdp.fill(0.0);
        self.steps = 0;
    }
}

fn is_integer(x: f64) -> bool {
    x.fract() == 0.0
}

/// `log(A_alpha)` for integer alpha: an exact binomial sum.
fn log_a_int(q: f64, sigma: f64, alpha: u64) -> f64 {
    let log_q = q.ln();
    let log_1mq = (1.0 - q).ln();
    let sigma_sq = sigma * sigma;
    let alpha_f = alpha as f64;

    let mut log_a = f64::NEG_INFINITY;
    for i in 0..=alpha {
        let i_f = i as f64;
        let log_coef = ln_binomial(alpha, i) + i_f * log_q + (alpha_f - i_f) * log_1mq;
        let s = log_coef + (i_f * i_f - i_f) / (2.0 * sigma_sq);
        log_a = log_add_exp(log_a, s);
    }
    log_a
}

/// `log(A_alpha)` for fractional alpha.
///
/// `A_alpha` splits into integrals over `(-inf, z0]` and `[z0, inf)`, each
/// expanded as a binomial series whose coefficients alternate in sign once
/// `i > alpha`.
fn log_a_frac(q: f64, sigma: f64, alpha: f64, cutoff: f64) -> Result<f64> {
    let mut log_a0 = f64::NEG_INFINITY;
    let mut log_a1 = f64::NEG_INFINITY;
    let log_q = q.ln();
    let log_1mq = (1.0 - q).ln();
    let sigma_sq = sigma * sigma;
    let z0 = sigma_sq * (1.0 / q - 1.0).ln() + 0.5;
    let erfc_scale = std::f64::consts::SQRT_2 * sigma;

    // binom(alpha, i) tracked as (log|c|, sign).
    let mut log_coef = 0.0;
    let mut positive = true;

    for i in 0..MAX_SERIES_TERMS {
        let i_f = i as f64;
        if i > 0 {
            let factor = (alpha - i_f + 1.0) / i_f;
            log_coef += factor.abs().ln();
            if factor < 0.0 {
                positive = !positive;
            }
        }
        let j = alpha - i_f;

        let log_t0 = log_coef + i_f * log_q + j * log_1mq;
        let log_t1 = log_coef + j * log_q + i_f * log_1mq;

        let log_e0 = 0.5f64.ln() + log_erfc((i_f - z0) / erfc_scale);
        let log_e1 = 0.5f64.ln() + log_erfc((z0 - j) / erfc_scale);

        let log_s0 = log_t0 + (i_f * i_f - i_f) / (2.0 * sigma_sq) + log_e0;
        let log_s1 = log_t1 + (j * j - j) / (2.0 * sigma_sq) + log_e1;

        if positive {
            log_a0 = log_add_exp(log_a0, log_s0);
            log_a1 = log_add_exp(log_a1, log_s1);
        } else {
            log_a0 = log_sub_exp(log_a0, log_s0)?;
            log_a1 = log_sub_exp(log_a1, log_s1)?;
        }

        if log_s0.max(log_s1) < cutoff {
            return Ok(log_add_exp(log_a0, log_a1));
        }
    }

    Err(DpError::numerical(format!(
        "RDP series at alpha={alpha} did not converge in {MAX_SERIES_TERMS} terms"
    )))
}

/// Numerically stable log(exp(a) + exp(b)).
fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    if a > b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}

/// Numerically stable log(exp(a) - exp(b)); requires `a >= b`.
fn log_sub_exp(a: f64, b: f64) -> Result<f64> {
    if a < b {
        return Err(DpError::numerical(
            "log-space subtraction would go negative",
        ));
    }
    if b == f64::NEG_INFINITY {
        return Ok(a);
    }
    if a == b {
        return Ok(f64::NEG_INFINITY);
    }
    let diff = (a - b).exp_m1();
    if diff.is_infinite() {
        return Ok(a);
    }
    Ok(diff.ln() + b)
}

/// log(erfc(x)), switching to the asymptotic expansion in the far tail.
fn log_erfc(x: f64) -> f64 {
    if x < 10.0 {
        return erfc(x).ln();
    }
    let x2 = x * x;
    let inv = 1.0 / x2;
    let series = 1.0 - 0.5 * inv + 0.75 * inv * inv - 1.875 * inv * inv * inv;
    -x2 - (x * std::f64::consts::PI.sqrt()).ln() + series.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_alphas_cover_both_regimes() {
        let alphas = default_alphas();
        assert_eq!(alphas.len(), 99 + 52);
        assert!((alphas[0] - 1.1).abs() < 1e-12);
        assert!((alphas[98] - 10.9).abs() < 1e-12);
        assert_eq!(alphas[99], 12.0);
        assert_eq!(*alphas.last().expect("non-empty"), 63.0);
    }

    #[test]
    fn full_batch_closed_form() {
        assert!((rdp_at_order(2.0, 8.0) - 1.0).abs() < 1e-12);
        assert!(rdp_at_order(0.0, 2.0).is_infinite());
        assert!(rdp_at_order(1.0, f64::INFINITY).is_infinite());
    }

    #[test]
    fn zero_noise_means_no_privacy() {
        let loss = calculate_privacy_loss(10, &default_alphas(), 0.0, 1e-6).expect("loss");
        assert!(loss.epsilon.is_infinite());
        assert!(loss.best_alpha.is_nan());
        assert!(!loss.is_private());
    }

    #[test]
    fn all_nan_rdp_means_no_privacy() {
        let loss = rdp_to_dp(&[2.0, 3.0], &[f64::NAN, f64::NAN], 1e-5).expect("loss");
        assert!(loss.epsilon.is_infinite());
        assert!(loss.best_alpha.is_nan());
    }

    #[test]
    fn rdp_to_dp_picks_minimum() {
        let delta = (-2.0f64).exp();
        // eps = rdp + 2 / (alpha - 1)
        let loss = rdp_to_dp(&[2.0, 3.0, 5.0], &[1.0, 0.5, 2.0], delta).expect("loss");
        assert!((loss.epsilon - 1.5).abs() < 1e-12);
        assert_eq!(loss.best_alpha, 3.0);
    }

    #[test]
    fn rdp_to_dp_rejects_length_mismatch() {
        assert!(rdp_to_dp(&[2.0], &[1.0, 2.0], 1e-5).is_err());
    }

    #[test]
    fn orders_at_or_below_one_are_rejected() {
        assert!(calculate_privacy_loss(10, &[0.5], 1.0, 1e-6).is_err());
        assert!(rdp_to_dp(&[1.0, 0.9], &[0.1, 0.1], 1e-6).is_err());
        assert!(rdp_to_dp(&[2.0, f64::NAN], &[0.1, 0.1], 1e-6).is_err());
        assert!(rdp_to_dp(&[2.0, f64::INFINITY], &[0.1, 0.1], 1e-6).is_err());
        assert!(rdp_to_dp(&[1.5, 2.0], &[0.1, 0.1], 1e-6).is_ok());
    }

    #[test]
    fn zero_steps_cost_nothing_even_without_noise() {
        let alphas = [2.0, 8.0];
        assert_eq!(compute_total_rdp(0.0, 0, &alphas), vec![0.0, 0.0]);
        let loss = calculate_privacy_loss(0, &alphas, 0.0, 1e-6).expect("loss");
        assert!(loss.epsilon.is_finite());
        assert_eq!(loss.best_alpha, 8.0);
    }

    #[test]
    fn total_rdp_doubles_with_steps() {
        let alphas = default_alphas();
        let k = 37;
        let single = compute_total_rdp(1.7, k, &alphas);
        let double = compute_total_rdp(1.7, 2 * k, &alphas);
        for (a, b) in single.iter().zip(double.iter()) {
            assert_eq!(2.0 * a, *b);
        }
    }

    #[test]
    fn subsampled_full_rate_matches_closed_form() {
        let r = subsampled_rdp(1.0, 1.5, 4.5).expect("rdp");
        assert!((r - rdp_at_order(1.5, 4.5)).abs() < 1e-12);
    }

    #[test]
    fn subsampled_edge_cases() {
        assert_eq!(subsampled_rdp(0.0, 1.0, 3.0).expect("rdp"), 0.0);
        assert!(subsampled_rdp(0.1, 0.0, 3.0).expect("rdp").is_infinite());
        assert!(subsampled_rdp(1.5, 1.0, 3.0).is_err());
    }

    #[test]
    fn subsampling_amplifies_privacy() {
        for &alpha in &[2.0, 3.5, 8.0, 12.0] {
            let sub = subsampled_rdp(0.01, 1.0, alpha).expect("rdp");
            let full = rdp_at_order(1.0, alpha);
            assert!(sub.is_finite());
            assert!(sub > 0.0);
            assert!(sub < full);
        }
    }

    #[test]
    fn fractional_series_sits_between_integer_neighbours() {
        let lo = subsampled_rdp(0.05, 2.0, 3.0).expect("rdp");
        let mid = subsampled_rdp(0.05, 2.0, 3.5).expect("rdp");
        let hi = subsampled_rdp(0.05, 2.0, 4.0).expect("rdp");
        assert!(lo <= mid + 1e-9);
        assert!(mid <= hi + 1e-9);
    }

    #[test]
    fn looser_cutoff_changes_little() {
        let tight = subsampled_rdp_with(0.05, 1.2, 2.5, &RdpSeriesConfig { cutoff: -60.0 })
            .expect("rdp");
        let default = subsampled_rdp(0.05, 1.2, 2.5).expect("rdp");
        assert!((tight - default).abs() < 1e-9);
    }

    #[test]
    fn log_erfc_is_continuous_at_switch() {
        let below = log_erfc(10.0 - 1e-9);
        let above = log_erfc(10.0 + 1e-9);
        assert!((below - above).abs() < 1e-6);
    }

    #[test]
    fn accountant_matches_free_function() {
        let mut acc = RdpAccountant::new();
        acc.compose(1.3, 40);
        acc.compose(1.3, 60);
        let loss = acc.privacy_loss(1e-6).expect("loss");
        let direct = calculate_privacy_loss(100, &default_alphas(), 1.3, 1e-6).expect("loss");
        assert_eq!(acc.steps(), 100);
        assert!((loss.epsilon - direct.epsilon).abs() < 1e-9);
        assert_eq!(loss.best_alpha, direct.best_alpha);
    }

    #[test]
    fn accountant_zero_noise_is_infinite() {
        let mut acc = RdpAccountant::new();
        acc.compose(0.0, 3);
        assert!(acc.epsilon(1e-6).is_infinite());
        acc.reset();
        assert_eq!(acc.steps(), 0);
        assert!(acc.epsilon(1e-6).is_finite());
    }

    #[test]
    fn test_epsilon_increases() {
        let mut acc = RdpAccountant::new();
        acc.compose_subsampled(0.01, 1.0, 1).expect("compose");
        let eps1 = acc.epsilon(1e-5);
        acc.compose_subsampled(0.01, 1.0, 1).expect("compose");
        let eps2 = acc.epsilon(1e-5);
        assert!(eps2 > eps1);
    }

    #[test]
    fn invalid_delta_rejected() {
        assert!(calculate_privacy_loss(1, &default_alphas(), 1.0, 0.0).is_err());
        assert!(calculate_privacy_loss(1, &default_alphas(), 1.0, 1.0).is_err());
    }

    proptest! {
        #[test]
        fn more_noise_never_increases_epsilon(
            noise_a in 0.05f64..50.0,
            noise_b in 0.05f64..50.0,
            steps in 1u64..500,
        ) {
            let alphas = default_alphas();
            let low = noise_a.min(noise_b);
            let high = noise_a.max(noise_b);
            let eps_low = calculate_privacy_loss(steps, &alphas, low, 1e-6).expect("loss").epsilon;
            let eps_high = calculate_privacy_loss(steps, &alphas, high, 1e-6).expect("loss").epsilon;
            prop_assert!(eps_high <= eps_low + 1e-9);
        }
    }
}
