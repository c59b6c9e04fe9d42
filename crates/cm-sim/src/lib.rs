//! Simulation driver for single-cell cardiomyocyte models.
//!
//! Provides:
//! - stiff integration of any [`cm_model::CellModel`]
//! - diagnostic reconstruction at every accepted sample (optionally parallel)
//! - total-current aggregation over a named slot subset, plus `dVm/dt`
//! - voltage-clamp and irregular-pacing protocols
//! - stage-aware errors and a run summary

pub mod aggregate;
pub mod error;
pub mod integrate;
pub mod protocol;
pub mod reconstruct;
pub mod sim;
pub mod summary;

pub use aggregate::{AggregatedSeries, CurrentSelection, aggregate, slew_rate, total_current};
pub use error::{SimError, SimResult, SimStage};
pub use integrate::{
    check_initial_state, integrate, integrate_with_observer, integrate_with_progress,
};
pub use protocol::{
    ApDetector, IrregularPacing, PacedRun, PacingRecord, Protocol, integrate_irregular_pacing,
    integrate_voltage_clamp,
};
pub use reconstruct::{Reconstruction, reconstruct};
pub use sim::{SimOptions, SimProgress, SimRecord, run_sim, run_sim_with_progress};
pub use summary::TraceSummary;
