//! Shared application service layer for cardiomyo.
//!
//! Front ends go through this crate to load scenarios, run or reuse cached
//! simulations, and query stored results.

pub mod error;
pub mod progress;
pub mod query;
pub mod run_service;
pub mod runtime_compile;
pub mod scenario_service;

pub use error::{AppError, AppResult};
pub use progress::{IntegrationProgress, RunProgressEvent, RunStage};
pub use query::{
    RunSummary, compare_run, export_series, extract_series, get_run_summary, list_series_names,
    series_columns,
};
pub use run_service::{
    RunOptions, RunRequest, RunResponse, RunTimingSummary, SOLVER_VERSION, ensure_run,
    ensure_run_with_progress, execute_scenario, list_runs, load_run,
};
pub use runtime_compile::{ScenarioRuntime, compile_scenario};
pub use scenario_service::{
    ScenarioSummary, describe_scenario, load_scenario, save_scenario, validate_scenario,
};
