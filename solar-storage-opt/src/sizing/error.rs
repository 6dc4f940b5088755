//! Error taxonomy of the sizing engine.

use thiserror::Error;

/// Result type for sizing operations.
pub type Result<T> = std::result::Result<T, SizingError>;

/// Coarse class of a [`SizingError`], used by callers to decide on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InvalidConfiguration,
    SolverInfeasible,
    SolverUnbounded,
    SolverTimeout,
    SolverError,
    InternalConsistency,
    Cancelled,
    InvalidTransition,
}

/// Errors from building, solving and post-processing a sizing model.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SizingError {
    /// Input time series are malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A scenario parameter is outside its domain.
    #[error("invalid scenario parameter `{field}`: {reason}")]
    InvalidScenario { field: &'static str, reason: String },

    /// The engine configuration cannot be honored.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The constraints admit no solution.
    #[error("optimization problem is infeasible")]
    SolverInfeasible,

    /// The objective can grow without bound.
    #[error("optimization problem is unbounded")]
    SolverUnbounded,

    /// The time budget ran out.
    #[error("solver time limit exceeded after {elapsed_secs:.1}s (incumbent available: {incumbent})")]
    SolverTimeout { elapsed_secs: f64, incumbent: bool },

    /// The backend reported an error.
    #[error("solver failed: {0}")]
    SolverFailed(String),

    /// Recomputed NPV disagrees with the solver objective.
    #[error("NPV {recomputed} does not match solver objective {objective}")]
    InternalConsistency { objective: f64, recomputed: f64 },

    /// The task was cancelled between phases.
    #[error("task cancelled")]
    Cancelled,

    /// The progress state machine was driven out of order.
    #[error("invalid progress transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl SizingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SizingError::InvalidInput(_) | SizingError::InvalidScenario { .. } => {
                ErrorKind::InvalidInput
            }
            SizingError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            SizingError::SolverInfeasible => ErrorKind::SolverInfeasible,
            SizingError::SolverUnbounded => ErrorKind::SolverUnbounded,
            SizingError::SolverTimeout { .. } => ErrorKind::SolverTimeout,
            SizingError::SolverFailed(_) => ErrorKind::SolverError,
            SizingError::InternalConsistency { .. } => ErrorKind::InternalConsistency,
            SizingError::Cancelled => ErrorKind::Cancelled,
            SizingError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }

    pub(crate) fn scenario(field: &'static str, reason: impl Into<String>) -> Self {
        SizingError::InvalidScenario {
            field,
            reason: reason.into(),
        }
    }
}
