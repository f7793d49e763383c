//! Fourier Perturbation Algorithm.
//!
//! Perturbs the lowest `k` real-DFT coefficients of a whole series with
//! Laplace noise, drops the rest, and transforms back. One global epsilon
//! covers the entire series.

use rand::Rng;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use dp_transport_core::{laplace_noise, DpError, Result};

/// Upper clip applied to reconstructed byte counts.
pub const FPA_CLIP_MAX: f64 = 1e9;

/// Number of real-DFT bins for a series of length `n`.
pub fn rfft_bins(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        n / 2 + 1
    }
}

/// Default coefficient count: `ceil(sqrt(n))`, at least one.
pub fn default_coefficients(n: usize) -> usize {
    ((n as f64).sqrt().ceil() as usize).max(1)
}

/// FPA parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct FourierPerturbation {
    /// Global epsilon for the whole series.
    pub epsilon: f64,
    /// L2 sensitivity of the series.
    pub sensitivity: f64,
    /// Retained low-frequency coefficients.
    pub coefficients: usize,
}

impl FourierPerturbation {
    /// Validate and build.
    pub fn new(epsilon: f64, sensitivity: f64, coefficients: usize) -> Result<Self> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(DpError::invalid("FPA epsilon must be finite and > 0"));
        }
        if !sensitivity.is_finite() || sensitivity < 0.0 {
            return Err(DpError::invalid("FPA sensitivity must be finite and >= 0"));
        }
        if coefficients == 0 {
            return Err(DpError::invalid("FPA needs at least one coefficient"));
        }
        Ok(Self {
            epsilon,
            sensitivity,
            coefficients,
        })
    }

    /// Laplace scale applied to each retained coefficient component.
    pub fn noise_scale(&self) -> f64 {
        (self.coefficients as f64).sqrt() * self.sensitivity / self.epsilon
    }

    /// Perturb one series; the output has the input's length.
    pub fn perturb<R: Rng + ?Sized>(&self, series: &[f64], rng: &mut R) -> Vec<f64> {
        let n = series.len();
        if n == 0 {
            return Vec::new();
        }
        let bins = rfft_bins(n);
        let k = self.coefficients.min(bins);
        let scale = self.noise_scale();

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);

        let mut spectrum: Vec<Complex<f64>> =
            series.iter().map(|&v| Complex::new(v, 0.0)).collect();
        fft.process(&mut spectrum);

        let mut kept = vec![Complex::new(0.0, 0.0); bins];
        for (slot, coef) in kept.iter_mut().zip(spectrum.iter()).take(k) {
            let noise_re = laplace_noise(scale, rng);
            let noise_im = laplace_noise(scale, rng);
            *slot = Complex::new(coef.re + noise_re, coef.im + noise_im);
        }

        // Rebuild a Hermitian spectrum; DC and Nyquist must be real.
        let mut full = vec![Complex::new(0.0, 0.0); n];
        full[0] = Complex::new(kept[0].re, 0.0);
        for j in 1..bins {
            if 2 * j == n {
                full[j] = Complex::new(kept[j].re, 0.0);
            } else {
                full[j] = kept[j];
                full[n - j] = kept[j].conj();
            }
        }
        ifft.process(&mut full);

        let inv_n = 1.0 / n as f64;
        full.iter()
            .map(|c| (c.re * inv_n).clamp(0.0, FPA_CLIP_MAX))
            .collect()
    }
}
