//! Differentially-private traffic shaping.
//!
//! [`TransportEngine`] replays per-stream byte counts through bounded queues
//! and announces DP-noised sizes in one of three modes: online queries every
//! `DP_step` ticks, per-tick budget absorption, or a one-shot Fourier
//! perturbation of the whole series.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod application;
pub mod baseline;
pub mod budget_absorption;
pub mod config;
pub mod engine;
pub mod fpa;
pub mod overhead;

pub use application::{Application, SourceStatus};
pub use baseline::{constant_rate, pacer, shape_non_dp, NonDpMethod};
pub use budget_absorption::{AbsorptionState, BudgetAbsorption};
pub use config::{MechanismKind, PrivacyParameter, TransportConfig, TransportType};
pub use engine::{stream_rng, RunSummary, ShapedTraffic, TransportEngine};
pub use fpa::{default_coefficients, rfft_bins, FourierPerturbation, FPA_CLIP_MAX};
pub use overhead::{
    fpa_failure_rate, norm_overhead, overhead, pacer_overhead, relative_overhead,
    wasserstein_overhead, OverheadStats, StreamOverhead,
};

/// Common imports for traffic shaping.
pub mod prelude {
    pub use crate::{
        constant_rate, fpa_failure_rate, norm_overhead, overhead, pacer, pacer_overhead,
        relative_overhead, shape_non_dp, wasserstein_overhead, AbsorptionState, Application,
        BudgetAbsorption, FourierPerturbation, MechanismKind, NonDpMethod, OverheadStats,
        PrivacyParameter, RunSummary, ShapedTraffic, SourceStatus, StreamOverhead,
        TransportConfig, TransportEngine, TransportType,
    };
}
