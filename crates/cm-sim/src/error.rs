//! Error types for simulation runs.

use cm_model::ModelError;
use cm_solver::SolverError;
use std::fmt;
use thiserror::Error;

/// Driver stage in which a run failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimStage {
    Setup,
    Integration,
    Reconstruction,
    Aggregation,
}

impl fmt::Display for SimStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimStage::Setup => "setup",
            SimStage::Integration => "integration",
            SimStage::Reconstruction => "reconstruction",
            SimStage::Aggregation => "aggregation",
        };
        f.write_str(name)
    }
}

/// Errors encountered while running a simulation.
///
/// Every variant is fatal for the run; nothing is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid simulation setup: {what}")]
    InvalidConfig { what: String },

    #[error("Malformed initial state: {what}")]
    InitialState { what: String },

    #[error("Model configuration error: {0}")]
    Model(#[from] ModelError),

    #[error("Integration failed (furthest time reached t = {t_reached}): {source}")]
    Integration { t_reached: f64, source: SolverError },

    #[error("Evaluator failed during {stage} at sample {sample} (t = {t}): {source}")]
    Evaluator {
        stage: SimStage,
        sample: usize,
        t: f64,
        source: ModelError,
    },

    #[error("Non-finite {slot} = {value} during {stage} at sample {sample} (t = {t})")]
    NonFinite {
        stage: SimStage,
        sample: usize,
        t: f64,
        slot: String,
        value: f64,
    },

    #[error("Aggregation failed: {what}")]
    Aggregation { what: String },
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Stage that produced the error.
    pub fn stage(&self) -> SimStage {
        match self {
            SimError::InvalidConfig { .. } | SimError::InitialState { .. } | SimError::Model(_) => {
                SimStage::Setup
            }
            SimError::Integration { .. } => SimStage::Integration,
            SimError::Evaluator { stage, .. } | SimError::NonFinite { stage, .. } => *stage,
            SimError::Aggregation { .. } => SimStage::Aggregation,
        }
    }

    /// Time at which the run failed, when one applies.
    pub fn failed_at(&self) -> Option<f64> {
        match self {
            SimError::Integration { t_reached, .. } => Some(*t_reached),
            SimError::Evaluator { t, .. } | SimError::NonFinite { t, .. } => Some(*t),
            _ => None,
        }
    }

    /// Sample index at which the run failed, for per-sample stages.
    pub fn failed_sample(&self) -> Option<usize> {
        match self {
            SimError::Evaluator { sample, .. } | SimError::NonFinite { sample, .. } => {
                Some(*sample)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_reported() {
        let err = SimError::Integration {
            t_reached: 1.5,
            source: SolverError::StepSizeTooSmall { t: 1.5, h: 1e-15 },
        };
        assert_eq!(err.stage(), SimStage::Integration);
        assert_eq!(err.failed_at(), Some(1.5));
        assert!(err.to_string().contains("1.5"));

        let err = SimError::NonFinite {
            stage: SimStage::Reconstruction,
            sample: 7,
            t: 0.25,
            slot: "i_Na".to_string(),
            value: f64::NAN,
        };
        assert_eq!(err.stage(), SimStage::Reconstruction);
        assert_eq!(err.failed_sample(), Some(7));
        assert!(err.to_string().contains("i_Na"));

        let err = SimError::from(ModelError::UnknownSlot {
            name: "i_Foo".to_string(),
        });
        assert_eq!(err.stage(), SimStage::Setup);
        assert_eq!(err.failed_at(), None);
    }
}
