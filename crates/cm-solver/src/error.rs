//! Error types for solver operations.

use cm_core::CoreError;
use diffsol::error::{DiffsolError, OdeSolverError};
use thiserror::Error;

/// Errors that can occur during stiff integration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Invalid solver argument: {what}")]
    InvalidArg { what: String },

    #[error("Step size {h:e} fell below the minimum at t = {t}")]
    StepSizeTooSmall { t: f64, h: f64 },

    #[error("Maximum of {max_steps} steps reached at t = {t}")]
    MaxStepsExceeded { t: f64, max_steps: usize },

    #[error("Right-hand side failed at t = {t}: {message}")]
    Rhs { t: f64, message: String },

    #[error("Accepted state became non-finite at t = {t}")]
    NonFiniteState { t: f64 },

    #[error("BDF solver failed at t = {t}: {message}")]
    Backend { t: f64, message: String },
}

pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    /// Furthest time the integration reached before failing, when known.
    pub fn t_reached(&self) -> Option<f64> {
        match self {
            SolverError::StepSizeTooSmall { t, .. }
            | SolverError::MaxStepsExceeded { t, .. }
            | SolverError::Rhs { t, .. }
            | SolverError::NonFiniteState { t }
            | SolverError::Backend { t, .. } => Some(*t),
            SolverError::InvalidArg { .. } => None,
        }
    }

    /// Map a diffsol failure raised while stepping from the last accepted
    /// time `t` with current step size `h`.
    pub(crate) fn from_diffsol(err: DiffsolError, t: f64, h: f64) -> Self {
        match err {
            DiffsolError::OdeSolverError(OdeSolverError::StepSizeTooSmall { time }) => {
                SolverError::StepSizeTooSmall { t: time, h }
            }
            other => SolverError::Backend {
                t,
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for SolverError {
    fn from(e: CoreError) -> Self {
        SolverError::InvalidArg {
            what: e.to_string(),
        }
    }
}
