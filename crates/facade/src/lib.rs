//! Facade crate re-exporting stable APIs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use dp_transport_accounting as accounting;
pub use dp_transport_core as core;
pub use dp_transport_shaper as shaper;

pub use dp_transport_accounting::{
    advanced_composition, calculate_privacy_loss, compute_rdp, compute_total_rdp,
    default_alphas, epsilon_per_query_for_budget, rdp_at_order, rdp_to_dp,
    solve_noise_multiplier, solve_noise_multiplier_with, subsampled_rdp, subsampled_rdp_with,
    PrivacyLoss, RdpAccountant, RdpSeriesConfig, SolverConfig,
};
pub use dp_transport_core::prelude as core_prelude;
pub use dp_transport_core::{
    dataset_sensitivity, gaussian_noise, laplace_noise, zero_pad_columns, ByteMatrix, DpError,
    GaussianMechanism, Label, LaplaceMechanism, Mechanism, NoiseMechanism, Queue, QueueStatus,
    RdpGaussianMechanism, Result, TrafficMatrix,
};
pub use dp_transport_shaper::{
    constant_rate, fpa_failure_rate, norm_overhead, overhead, pacer, pacer_overhead,
    relative_overhead, shape_non_dp, stream_rng, wasserstein_overhead, AbsorptionState,
    Application, BudgetAbsorption, FourierPerturbation, MechanismKind, NonDpMethod,
    OverheadStats, PrivacyParameter, RunSummary, ShapedTraffic, SourceStatus, StreamOverhead,
    TransportConfig, TransportEngine, TransportType,
};

/// Convenience prelude covering the transport and its accounting.
pub mod prelude {
    pub use dp_transport_accounting::prelude::*;
    pub use dp_transport_core::prelude::*;
    pub use dp_transport_shaper::prelude::*;
}
