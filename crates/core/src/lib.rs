//! Core building blocks for differentially-private traffic shaping.
//!
//! This crate provides the pieces every transport mode shares: the per-stream
//! backlog queue, the noise mechanisms, and the labelled traffic matrix.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod noise;
pub mod queue;
pub mod traffic;

pub use error::{DpError, Result};
pub use noise::{
    gaussian_noise, laplace_noise, GaussianMechanism, LaplaceMechanism, Mechanism,
    NoiseMechanism, RdpGaussianMechanism,
};
pub use queue::{all_empty, Queue, QueueStatus};
pub use traffic::{dataset_sensitivity, zero_pad_columns, ByteMatrix, Label, TrafficMatrix};

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        all_empty, dataset_sensitivity, gaussian_noise, laplace_noise, zero_pad_columns,
        ByteMatrix, DpError, GaussianMechanism, Label, LaplaceMechanism, Mechanism,
        NoiseMechanism, Queue, QueueStatus, RdpGaussianMechanism, Result, TrafficMatrix,
    };
}
