//! cm-results: run cache, sample storage, reference comparison and export.

pub mod export;
pub mod hash;
pub mod reference;
pub mod store;
pub mod types;

pub use export::{export_series_csv, write_series_csv};
pub use hash::compute_run_id;
pub use reference::{Comparison, ReferenceTrace, compare_membrane_potential, interpolate};
pub use store::{RunStore, SampleReader};
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{}:{line}: corrupt sample: {source}", path.display())]
    CorruptSample {
        path: std::path::PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Run id prefix {prefix} matches {matches} runs")]
    AmbiguousRunId { prefix: String, matches: usize },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },

    #[error("{source_name}:{line}: not a number: {field:?}")]
    Parse {
        source_name: String,
        line: usize,
        field: String,
    },

    #[error("Reference data error: {what}")]
    Reference { what: String },

    #[error("Export error: {what}")]
    Export { what: String },
}
