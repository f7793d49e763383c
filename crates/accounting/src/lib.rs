//! Privacy accounting for differentially-private traffic shaping.
//!
//! Gaussian releases are tracked with Rényi DP and converted to
//! `(epsilon, delta)` on demand; Laplace releases use advanced composition.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calibrate;
pub mod composition;
pub mod rdp;

pub use calibrate::{solve_noise_multiplier, solve_noise_multiplier_with, SolverConfig};
pub use composition::{advanced_composition, epsilon_per_query_for_budget};
pub use rdp::{
    calculate_privacy_loss, compute_rdp, compute_total_rdp, default_alphas, rdp_at_order,
    rdp_to_dp, subsampled_rdp, subsampled_rdp_with, PrivacyLoss, RdpAccountant,
    RdpSeriesConfig, DEFAULT_SERIES_CUTOFF,
};

/// Common imports for privacy accounting.
pub mod prelude {
    pub use crate::{
        advanced_composition, calculate_privacy_loss, compute_rdp, compute_total_rdp,
        default_alphas, epsilon_per_query_for_budget, rdp_at_order, rdp_to_dp,
        solve_noise_multiplier, solve_noise_multiplier_with, subsampled_rdp, PrivacyLoss,
        RdpAccountant, RdpSeriesConfig, SolverConfig,
    };
}
