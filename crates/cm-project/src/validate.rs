//! Scenario validation logic.

use crate::schema::{
    ClampStepDef, DrugDef, InitialStateDef, IntervalDef, IrregularPacingDef, ProtocolDef, Scenario,
    SolverDef, StimulusDef,
};
use cm_model::{
    Conductances, DiagnosticSlot, ModelError, STATE_LEN, StatePreset, StateSlot, Stimulus,
    StimulusTrain, VoltageClamp, VoltageClampStep,
};
use std::collections::HashSet;

pub const LATEST_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown {kind}: {name}")]
    UnknownName { kind: &'static str, name: String },

    #[error("Duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_scenario(scenario: &Scenario) -> Result<(), ValidationError> {
    if scenario.version == 0 || scenario.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: scenario.version,
        });
    }
    if scenario.name.trim().is_empty() {
        return Err(invalid("name", "\"\"", "must not be empty"));
    }

    validate_initial_state(&scenario.initial_state)?;
    validate_interval(&scenario.interval)?;
    validate_solver(&scenario.solver, &scenario.interval)?;
    validate_drug(&scenario.drug)?;

    for (name, value) in &scenario.conductances {
        if !Conductances::NAMES.contains(&name.as_str()) {
            return Err(ValidationError::UnknownName {
                kind: "conductance",
                name: name.clone(),
            });
        }
        if !value.is_finite() || *value < 0.0 {
            return Err(invalid(
                format!("conductances.{name}"),
                value,
                "must be finite and non-negative",
            ));
        }
    }

    validate_protocol(&scenario.protocol)?;

    if let Some(currents) = &scenario.currents {
        let mut seen = HashSet::new();
        for name in currents {
            if DiagnosticSlot::from_name(name).is_err() {
                return Err(ValidationError::UnknownName {
                    kind: "current",
                    name: name.clone(),
                });
            }
            if !seen.insert(name) {
                return Err(ValidationError::Duplicate {
                    kind: "current",
                    name: name.clone(),
                });
            }
        }
    }

    Ok(())
}

fn validate_initial_state(state: &InitialStateDef) -> Result<(), ValidationError> {
    match state {
        InitialStateDef::Preset { name } => {
            if StatePreset::from_name(name).is_none() {
                return Err(ValidationError::UnknownName {
                    kind: "state preset",
                    name: name.clone(),
                });
            }
        }
        InitialStateDef::Explicit { values } => {
            if values.len() != STATE_LEN {
                return Err(invalid(
                    "initial_state.values",
                    format!("{} values", values.len()),
                    "expected one value per state slot (23)",
                ));
            }
            for (slot, value) in StateSlot::ALL.iter().zip(values) {
                if !value.is_finite() {
                    return Err(invalid(
                        format!("initial_state.{}", slot.name()),
                        value,
                        "must be finite",
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_interval(interval: &IntervalDef) -> Result<(), ValidationError> {
    if !interval.t0_s.is_finite() {
        return Err(invalid("interval.t0_s", interval.t0_s, "must be finite"));
    }
    if !interval.t_end_s.is_finite() || interval.t_end_s <= interval.t0_s {
        return Err(invalid(
            "interval.t_end_s",
            interval.t_end_s,
            "must be finite and greater than t0_s",
        ));
    }
    Ok(())
}

fn validate_solver(solver: &SolverDef, interval: &IntervalDef) -> Result<(), ValidationError> {
    if !solver.rtol.is_finite() || solver.rtol <= 0.0 {
        return Err(invalid("solver.rtol", solver.rtol, "must be positive"));
    }
    if !solver.atol.is_finite() || solver.atol <= 0.0 {
        return Err(invalid("solver.atol", solver.atol, "must be positive"));
    }
    if solver.max_step_s.is_nan() || solver.max_step_s <= 0.0 {
        return Err(invalid("solver.max_step_s", solver.max_step_s, "must be positive"));
    }
    if !solver.min_step_s.is_finite()
        || solver.min_step_s < 0.0
        || solver.min_step_s > solver.max_step_s
    {
        return Err(invalid(
            "solver.min_step_s",
            solver.min_step_s,
            "must be non-negative and not above max_step_s",
        ));
    }
    if let Some(h) = solver.first_step_s {
        let span = interval.t_end_s - interval.t0_s;
        if !h.is_finite() || h <= 0.0 || h > span {
            return Err(invalid(
                "solver.first_step_s",
                h,
                "must be positive and within the interval",
            ));
        }
    }
    if solver.max_steps == 0 {
        return Err(invalid("solver.max_steps", 0, "must be positive"));
    }
    Ok(())
}

fn validate_drug(drug: &DrugDef) -> Result<(), ValidationError> {
    if !drug.application_time_s.is_finite() {
        return Err(invalid(
            "drug.application_time_s",
            drug.application_time_s,
            "must be finite",
        ));
    }
    for (name, value) in [
        ("i_na", drug.i_na),
        ("i_ca_l", drug.i_ca_l),
        ("i_kr", drug.i_kr),
        ("i_ks", drug.i_ks),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(
                format!("drug.{name}"),
                value,
                "block factor must be finite and non-negative",
            ));
        }
    }
    Ok(())
}

/// Report a model-side parameter error under its scenario field path.
fn model_error(prefix: &str, err: ModelError) -> ValidationError {
    match err {
        ModelError::InvalidParameter {
            name,
            value,
            reason,
        } => invalid(format!("{prefix}.{name}"), value, reason),
        other => invalid(prefix, "-", &other.to_string()),
    }
}

fn validate_protocol(protocol: &ProtocolDef) -> Result<(), ValidationError> {
    match protocol {
        ProtocolDef::Spontaneous => Ok(()),
        ProtocolDef::Paced(s) => validate_stimulus(s),
        ProtocolDef::VoltageClamp { steps } => {
            clamp_schedule(steps).map_err(|e| model_error("protocol", e))?;
            Ok(())
        }
        ProtocolDef::IrregularPacing(p) => validate_irregular_pacing(p),
    }
}

fn validate_stimulus(s: &StimulusDef) -> Result<(), ValidationError> {
    Stimulus::new(s.amplitude_a_per_f, s.start_s, s.period_s, s.duration_s)
        .map_err(|e| model_error("protocol", e))?;
    Ok(())
}

fn validate_irregular_pacing(p: &IrregularPacingDef) -> Result<(), ValidationError> {
    for (i, offset) in p.offsets_s.iter().enumerate() {
        if !offset.is_finite() || *offset < 0.0 {
            return Err(invalid(
                format!("protocol.offsets_s[{i}]"),
                offset,
                "must be finite and non-negative",
            ));
        }
    }
    for (name, value) in [
        ("ap_start_voltage_v", p.ap_start_voltage_v),
        ("peak_threshold_v", p.peak_threshold_v),
    ] {
        if !value.is_finite() {
            return Err(invalid(format!("protocol.{name}"), value, "must be finite"));
        }
    }
    StimulusTrain::new(p.amplitude_a_per_f, p.duration_s)
        .map_err(|e| model_error("protocol", e))?;
    Ok(())
}

/// Build the clamp schedule a `voltage_clamp` protocol describes.
pub fn clamp_schedule(steps: &[ClampStepDef]) -> Result<VoltageClamp, ModelError> {
    VoltageClamp::new(
        steps
            .iter()
            .map(|s| VoltageClampStep {
                duration_s: s.duration_s,
                voltage_v: s.voltage_v,
            })
            .collect(),
    )
}
