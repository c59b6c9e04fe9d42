//! Error types for cell-model evaluation.

use thiserror::Error;

/// Errors raised by a cell-model evaluator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("State length mismatch: expected {expected}, got {actual}")]
    StateLength { expected: usize, actual: usize },

    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: String,
        value: f64,
        reason: &'static str,
    },

    #[error("Unknown slot name: {name}")]
    UnknownSlot { name: String },

    #[error("Invalid protocol: {what}")]
    InvalidProtocol { what: String },
}

pub type ModelResult<T> = Result<T, ModelError>;
