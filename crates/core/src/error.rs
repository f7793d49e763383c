//! Error types for DP transport operations.

/// Errors that can occur while configuring or running the DP transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DpError {
    /// Invalid parameter provided.
    #[error("invalid parameter: {msg}")]
    InvalidParameters {
        /// Human-readable error description.
        msg: String,
    },

    /// Configuration error detected before a run starts.
    #[error("configuration error: {msg}")]
    ConfigError {
        /// Human-readable error description.
        msg: String,
    },

    /// Enqueueing would push a queue past its capacity.
    #[error("queue overflow: size {size} + {amount} exceeds capacity {max_size}")]
    QueueOverflow {
        /// Queue size before the rejected enqueue.
        size: f64,
        /// Amount that was rejected.
        amount: f64,
        /// Queue capacity.
        max_size: f64,
    },

    /// The noise-multiplier search could not meet the target epsilon.
    #[error(
        "target epsilon {target_epsilon} not achievable in search range [{lower}, {upper}]"
    )]
    NonConvergence {
        /// Requested epsilon.
        target_epsilon: f64,
        /// Lower end of the search bracket.
        lower: f64,
        /// Upper end of the search bracket.
        upper: f64,
    },

    /// Numerical computation error.
    #[error("numerical error: {msg}")]
    NumericalError {
        /// Human-readable error description.
        msg: String,
    },

    /// Queues were still holding real bytes after the drain limit.
    #[error("queues not drained after {intervals} intervals past source exhaustion")]
    DrainLimitExceeded {
        /// Number of decision intervals spent draining.
        intervals: usize,
    },

    /// Unsupported feature or configuration.
    #[error("unsupported feature: {msg}")]
    UnsupportedFeature {
        /// Human-readable error description.
        msg: String,
    },
}

/// Result type for DP transport operations.
pub type Result<T> = std::result::Result<T, DpError>;

impl DpError {
    /// Create an invalid parameter error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameters { msg: msg.into() }
    }

    /// Create a numerical error.
    pub fn numerical<S: Into<String>>(msg: S) -> Self {
        Self::NumericalError { msg: msg.into() }
    }

    /// Create a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError { msg: msg.into() }
    }

    /// Create an unsupported feature error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFeature { msg: msg.into() }
    }

    /// Whether this error is raised before a run starts.
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, Self::ConfigError { .. })
    }
}
