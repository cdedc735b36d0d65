//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::devices::DeviceId;
use crate::sim::algorithm::AlgorithmError;

/// Errors raised while setting up or running an optimization.
///
/// Everything except [`Error::Algorithm`] is a configuration error: fatal at
/// setup time and never retried.
#[derive(Debug, Error)]
pub enum Error {
    /// A device is listed as both active and passive in the grid topology.
    #[error("device {0} is both active and passive in the grid topology")]
    ActivePassiveCollision(DeviceId),

    /// The encoded solution does not match the summed part variable counts.
    #[error("solution width mismatch: parts require {expected} variables, solution has {actual}")]
    SolutionSizeMismatch {
        /// Width required by the problem parts.
        expected: usize,
        /// Width of the solution handed in.
        actual: usize,
    },

    /// The topology references a device that is not part of the problem.
    #[error("topology references unknown device {0}")]
    UnknownDevice(DeviceId),

    /// A device type required by the topology is missing.
    #[error("missing required device type: {0}")]
    MissingDeviceType(String),

    /// An exchange was attempted on a grid that was not initialized.
    #[error("{0} grid is not initialized")]
    GridNotInitialized(&'static str),

    /// The optimization has no problem parts.
    #[error("no problem parts to optimize")]
    EmptyProblem,

    /// The scenario configuration failed validation.
    #[error(
        "invalid scenario: {}",
        .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    InvalidConfig(Vec<ConfigError>),

    /// A search algorithm failed.
    #[error(transparent)]
    Algorithm(#[from] AlgorithmError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
