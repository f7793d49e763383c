//! Transport configuration.
//!
//! Field names on the wire follow the option names used by the experiment
//! harness (`DP_step`, `min_DP_size`, ...), so existing parameter files load
//! unchanged.

use std::path::Path;

use serde::{Deserialize, Serialize};

use dp_transport_core::{DpError, Result};

/// Which transport drives the queues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    /// Online queries every `DP_step` ticks.
    #[default]
    #[serde(rename = "DP_dynamic")]
    Dynamic,
    /// Per-tick budget absorption.
    #[serde(rename = "DP_wPrivacy")]
    WPrivacy,
    /// One-shot FPA over the whole series.
    #[serde(rename = "DP_static")]
    Static,
}

/// Which noise mechanism answers queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MechanismKind {
    /// `(epsilon, delta)` Gaussian.
    Gaussian,
    /// Laplace.
    Laplace,
    /// Noise-multiplier Gaussian accounted with RDP.
    #[default]
    #[serde(rename = "Gaussian_rdp")]
    GaussianRdp,
}

/// How the privacy level was specified.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PrivacyParameter {
    /// `sigma / sensitivity`.
    NoiseMultiplier(f64),
    /// Epsilon per query.
    EpsilonPerQuery(f64),
}

/// Settings for one transport run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Transport mode.
    pub transport_type: TransportType,
    /// Noise mechanism.
    #[serde(rename = "DP_mechanism")]
    pub mechanism: MechanismKind,
    /// Query sensitivity in bytes; derived from the data when unset.
    pub sensitivity: Option<f64>,
    /// Noise multiplier (exclusive with `epsilon_per_query`).
    pub noise_multiplier: Option<f64>,
    /// Epsilon per query (exclusive with `noise_multiplier`).
    pub epsilon_per_query: Option<f64>,
    /// Ticks per decision interval.
    #[serde(rename = "DP_step")]
    pub dp_step: usize,
    /// Lower clamp on published sizes.
    #[serde(rename = "min_DP_size")]
    pub min_dp_size: f64,
    /// Upper clamp on published sizes.
    #[serde(rename = "max_DP_size")]
    pub max_dp_size: f64,
    /// Privacy failure probability.
    pub delta: f64,
    /// Share of the wPrivacy window budget spent on decisions.
    pub decision_publication_ratio: f64,
    /// Static mode: retained Fourier coefficients.
    pub fpa_coefficients: Option<usize>,
    /// Composition window in ticks; the stream length when unset.
    pub privacy_window: Option<usize>,
    /// Per-stream queue capacity in bytes.
    pub queue_capacity: f64,
    /// Decision intervals allowed after the source is exhausted.
    pub max_drain_intervals: usize,
    /// Run seed.
    pub seed: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transport_type: TransportType::Dynamic,
            mechanism: MechanismKind::GaussianRdp,
            sensitivity: None,
            noise_multiplier: None,
            epsilon_per_query: None,
            dp_step: 1,
            min_dp_size: 0.0,
            max_dp_size: 1e6,
            delta: 1e-6,
            decision_publication_ratio: 0.7,
            fpa_coefficients: None,
            privacy_window: None,
            queue_capacity: 1e8,
            max_drain_intervals: 1_000_000,
            seed: 0,
        }
    }
}

impl TransportConfig {
    /// Parse from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DpError::config(format!("bad TOML config: {e}")))
    }

    /// Load from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DpError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DpError::config(format!("cannot render config: {e}")))
    }

    /// Composition window for a series of `stream_len` ticks.
    pub fn composition_window(&self, stream_len: usize) -> usize {
        self.privacy_window.unwrap_or(stream_len)
    }

    /// Number of queries the composition window is charged for.
    pub fn composition_queries(&self, stream_len: usize) -> u64 {
        let window = self.composition_window(stream_len);
        match self.transport_type {
            TransportType::Dynamic => (window / self.dp_step.max(1)) as u64,
            TransportType::WPrivacy => window as u64,
            TransportType::Static => 1,
        }
    }

    /// Run every pre-run check for a series of `stream_len` ticks.
    pub fn validate(&self, stream_len: usize) -> Result<PrivacyParameter> {
        if self.dp_step == 0 {
            return Err(DpError::config("DP_step must be a positive integer"));
        }
        if self.transport_type != TransportType::Static {
            let window = self.composition_window(stream_len);
            if window % self.dp_step != 0 {
                return Err(DpError::config(format!(
                    "DP_step {} does not evenly divide the composition window {window}",
                    self.dp_step
                )));
            }
        }
        if !self.min_dp_size.is_finite() || !self.max_dp_size.is_finite() {
            return Err(DpError::config("min_DP_size and max_DP_size must be finite"));
        }
        if self.min_dp_size < 0.0 {
            return Err(DpError::config("min_DP_size must be >= 0"));
        }
        if self.min_dp_size > self.max_dp_size {
            return Err(DpError::config(format!(
                "min_DP_size {} exceeds max_DP_size {}",
                self.min_dp_size, self.max_dp_size
            )));
        }
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(DpError::config("delta must lie in (0, 1)"));
        }
        if let Some(s) = self.sensitivity {
            if !s.is_finite() || s <= 0.0 {
                return Err(DpError::config("sensitivity must be finite and > 0"));
            }
        }
        if !self.queue_capacity.is_finite() || self.queue_capacity <= 0.0 {
            return Err(DpError::config("queue_capacity must be finite and > 0"));
        }

        let parameter = match (self.noise_multiplier, self.epsilon_per_query) {
            (Some(_), Some(_)) => {
                return Err(DpError::config(
                    "noise_multiplier and epsilon_per_query are mutually exclusive",
                ))
            }
            (None, None) => {
                return Err(DpError::config(
                    "one of noise_multiplier or epsilon_per_query is required",
                ))
            }
            (Some(nm), None) => {
                if !nm.is_finite() || nm < 0.0 {
                    return Err(DpError::config("noise_multiplier must be finite and >= 0"));
                }
                PrivacyParameter::NoiseMultiplier(nm)
            }
            (None, Some(eps)) => {
                if !eps.is_finite() || eps <= 0.0 {
                    return Err(DpError::config("epsilon_per_query must be finite and > 0"));
                }
                PrivacyParameter::EpsilonPerQuery(eps)
            }
        };

        match (self.transport_type, self.mechanism, parameter) {
            (TransportType::Dynamic, MechanismKind::GaussianRdp, _) => {}
            (TransportType::Dynamic, _, PrivacyParameter::NoiseMultiplier(_)) => {
                return Err(DpError::config(
                    "noise_multiplier is only meaningful for the Gaussian_rdp mechanism",
                ))
            }
            (TransportType::Dynamic, _, PrivacyParameter::EpsilonPerQuery(_)) => {}
            (_, MechanismKind::Laplace, PrivacyParameter::EpsilonPerQuery(_)) => {}
            (TransportType::WPrivacy, _, _) => {
                return Err(DpError::config(
                    "DP_wPrivacy needs the Laplace mechanism and epsilon_per_query",
                ))
            }
            (TransportType::Static, _, _) => {
                return Err(DpError::config(
                    "DP_static needs the Laplace mechanism and epsilon_per_query",
                ))
            }
        }

        if self.transport_type == TransportType::WPrivacy
            && !(self.decision_publication_ratio > 0.0 && self.decision_publication_ratio < 1.0)
        {
            return Err(DpError::config("decision_publication_ratio must lie in (0, 1)"));
        }
        if self.fpa_coefficients == Some(0) {
            return Err(DpError::config("fpa_coefficients must be >= 1"));
        }

        Ok(parameter)
    }
}
