//! Scenario loading, saving, validation and introspection.

use cm_project::{InitialStateDef, Scenario};
use std::path::Path;

use crate::error::{AppError, AppResult};

/// Summary of a scenario for listing.
#[derive(Debug, Clone)]
pub struct ScenarioSummary {
    pub name: String,
    pub initial_state: String,
    pub t0_s: f64,
    pub t_end_s: f64,
    pub drug_active: bool,
    pub protocol: &'static str,
    pub conductance_overrides: usize,
}

/// Load and validate a scenario (`.json` as JSON, otherwise YAML).
pub fn load_scenario(path: &Path) -> AppResult<Scenario> {
    if !path.exists() {
        return Err(AppError::ScenarioFileRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    Ok(cm_project::load(path)?)
}

/// Save a scenario as YAML.
pub fn save_scenario(path: &Path, scenario: &Scenario) -> AppResult<()> {
    Ok(cm_project::save_yaml(path, scenario)?)
}

pub fn validate_scenario(scenario: &Scenario) -> AppResult<()> {
    cm_project::validate_scenario(scenario).map_err(|e| AppError::Validation(e.to_string()))
}

pub fn describe_scenario(scenario: &Scenario) -> ScenarioSummary {
    let initial_state = match &scenario.initial_state {
        InitialStateDef::Preset { name } => format!("preset {name}"),
        InitialStateDef::Explicit { values } => format!("explicit ({} values)", values.len()),
    };
    ScenarioSummary {
        name: scenario.name.clone(),
        initial_state,
        t0_s: scenario.interval.t0_s,
        t_end_s: scenario.interval.t_end_s,
        drug_active: scenario.drug.application_time_s < scenario.interval.t_end_s,
        protocol: scenario.protocol.name(),
        conductance_overrides: scenario.conductances.len(),
    }
}
