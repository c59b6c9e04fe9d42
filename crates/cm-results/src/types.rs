//! Result data types.

use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    pub run_id: RunId,
    pub scenario_name: String,
    pub model: String,
    pub timestamp: String,
    pub solver_version: String,
    pub t0_s: f64,
    pub t_end_s: f64,
    pub state_names: Vec<String>,
    pub diagnostic_names: Vec<String>,
    /// Diagnostic slots summed into `i_tot`
    pub current_selection: Vec<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Stimulus onsets chosen during an irregularly paced run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stimulations_s: Vec<f64>,
    pub stats: SolverStatsRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

fn default_protocol() -> String {
    "spontaneous".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SolverStatsRecord {
    pub steps: usize,
    pub rejected_steps: usize,
    pub rhs_evals: usize,
    pub jacobian_evals: usize,
    pub lu_decompositions: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub samples: usize,
    pub vm_min_v: f64,
    pub vm_max_v: f64,
    pub peak_i_tot: f64,
    pub max_upstroke_v_per_s: f64,
    /// Worst weighted gap between solver and reconstructed derivatives
    #[serde(default)]
    pub derivative_mismatch: f64,
}

/// One accepted sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleRecord {
    pub time_s: f64,
    pub state: Vec<f64>,
    pub diagnostics: Vec<f64>,
    pub i_tot: f64,
    pub dvm_dt: f64,
}
