//! Error types for the cm-app service layer.

use cm_sim::{SimError, SimStage};
use std::path::PathBuf;

/// Application error type shared by every front end.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("Failed to read scenario file: {path}")]
    ScenarioFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Scenario validation failed: {0}")]
    Validation(String),

    #[error("Runtime compilation failed: {0}")]
    Compile(String),

    #[error("Simulation failed in {stage} stage{}: {message}", location(.t, .sample))]
    Simulation {
        stage: SimStage,
        t: Option<f64>,
        sample: Option<usize>,
        message: String,
    },

    #[error("Results error: {0}")]
    Results(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn location(t: &Option<f64>, sample: &Option<usize>) -> String {
    match (*t, *sample) {
        (Some(t), Some(i)) => format!(" at sample {i} (t = {t} s)"),
        (Some(t), None) => format!(" at t = {t} s"),
        _ => String::new(),
    }
}

/// Result type for cm-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<cm_project::ProjectError> for AppError {
    fn from(err: cm_project::ProjectError) -> Self {
        match err {
            cm_project::ProjectError::Validation(e) => AppError::Validation(e.to_string()),
            other => AppError::Scenario(other.to_string()),
        }
    }
}

impl From<cm_model::ModelError> for AppError {
    fn from(err: cm_model::ModelError) -> Self {
        AppError::Compile(err.to_string())
    }
}

impl From<SimError> for AppError {
    fn from(err: SimError) -> Self {
        AppError::Simulation {
            stage: err.stage(),
            t: err.failed_at(),
            sample: err.failed_sample(),
            message: err.to_string(),
        }
    }
}

impl From<cm_results::ResultsError> for AppError {
    fn from(err: cm_results::ResultsError) -> Self {
        match err {
            cm_results::ResultsError::RunNotFound { run_id } => AppError::RunNotFound(run_id),
            other => AppError::Results(other.to_string()),
        }
    }
}
