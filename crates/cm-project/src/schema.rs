//! Scenario schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub model: ModelKind,
    #[serde(default)]
    pub initial_state: InitialStateDef,
    #[serde(default)]
    pub interval: IntervalDef,
    #[serde(default)]
    pub solver: SolverDef,
    #[serde(default)]
    pub drug: DrugDef,
    /// Conductance overrides by name (`g_na`, `g_kr`, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conductances: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "ProtocolDef::is_spontaneous")]
    pub protocol: ProtocolDef,
    /// Diagnostic slots summed into the total current; all physical currents
    /// when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currents: Option<Vec<String>>,
    #[serde(default)]
    pub output: OutputDef,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Paci2018,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InitialStateDef {
    Preset { name: String },
    Explicit { values: Vec<f64> },
}

impl Default for InitialStateDef {
    fn default() -> Self {
        InitialStateDef::Preset {
            name: "paci2018".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IntervalDef {
    #[serde(default)]
    pub t0_s: f64,
    #[serde(default = "default_t_end")]
    pub t_end_s: f64,
}

impl Default for IntervalDef {
    fn default() -> Self {
        Self {
            t0_s: 0.0,
            t_end_s: default_t_end(),
        }
    }
}

fn default_t_end() -> f64 {
    40.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SolverDef {
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    #[serde(default = "default_atol")]
    pub atol: f64,
    #[serde(default = "default_max_step")]
    pub max_step_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_step_s: Option<f64>,
    #[serde(default)]
    pub min_step_s: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for SolverDef {
    fn default() -> Self {
        Self {
            rtol: default_rtol(),
            atol: default_atol(),
            max_step_s: default_max_step(),
            first_step_s: None,
            min_step_s: 0.0,
            max_steps: default_max_steps(),
        }
    }
}

fn default_rtol() -> f64 {
    1e-3
}

fn default_atol() -> f64 {
    1e-6
}

fn default_max_step() -> f64 {
    1e-3
}

fn default_max_steps() -> usize {
    1_000_000
}

/// Conductance block factors and the time they take effect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DrugDef {
    #[serde(default = "default_application_time")]
    pub application_time_s: f64,
    #[serde(default = "unity")]
    pub i_na: f64,
    #[serde(default = "unity")]
    pub i_ca_l: f64,
    #[serde(default = "unity")]
    pub i_kr: f64,
    #[serde(default = "unity")]
    pub i_ks: f64,
}

impl Default for DrugDef {
    fn default() -> Self {
        Self {
            application_time_s: default_application_time(),
            i_na: 1.0,
            i_ca_l: 1.0,
            i_kr: 1.0,
            i_ks: 1.0,
        }
    }
}

fn default_application_time() -> f64 {
    10_000.0
}

fn unity() -> f64 {
    1.0
}

/// Periodic current pulse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StimulusDef {
    pub amplitude_a_per_f: f64,
    #[serde(default)]
    pub start_s: f64,
    pub period_s: f64,
    pub duration_s: f64,
}

/// How the membrane is driven during the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolDef {
    #[default]
    Spontaneous,
    /// Periodic stimulus built into the model
    Paced(StimulusDef),
    VoltageClamp { steps: Vec<ClampStepDef> },
    IrregularPacing(IrregularPacingDef),
}

impl ProtocolDef {
    pub fn is_spontaneous(&self) -> bool {
        matches!(self, ProtocolDef::Spontaneous)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolDef::Spontaneous => "spontaneous",
            ProtocolDef::Paced(_) => "paced",
            ProtocolDef::VoltageClamp { .. } => "voltage_clamp",
            ProtocolDef::IrregularPacing(_) => "irregular_pacing",
        }
    }
}

/// One command step of a clamp schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClampStepDef {
    pub duration_s: f64,
    pub voltage_v: f64,
}

/// Stimuli scheduled a fixed offset after each detected APD90.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IrregularPacingDef {
    pub offsets_s: Vec<f64>,
    #[serde(default = "default_pulse_amplitude")]
    pub amplitude_a_per_f: f64,
    #[serde(default = "default_pulse_duration")]
    pub duration_s: f64,
    #[serde(default = "default_ap_start_voltage")]
    pub ap_start_voltage_v: f64,
    #[serde(default)]
    pub peak_threshold_v: f64,
}

fn default_pulse_amplitude() -> f64 {
    5.5
}

fn default_pulse_duration() -> f64 {
    0.005
}

fn default_ap_start_voltage() -> f64 {
    -0.075
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OutputDef {
    #[serde(default = "default_true")]
    pub parallel_reconstruction: bool,
}

impl Default for OutputDef {
    fn default() -> Self {
        Self {
            parallel_reconstruction: true,
        }
    }
}

fn default_true() -> bool {
    true
}
