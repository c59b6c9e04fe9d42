//! Scenario to runtime compilation: builds the model, initial state and
//! simulation options a run needs.

use cm_model::{BlockScales, Conductances, DrugBlock, Paci2018, StatePreset, Stimulus};
use cm_project::{InitialStateDef, ModelKind, ProtocolDef, Scenario};
use cm_sim::{CurrentSelection, IrregularPacing, Protocol, SimOptions};
use cm_solver::BdfOptions;

use crate::error::{AppError, AppResult};

/// Everything needed to run a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioRuntime {
    pub model: Paci2018,
    pub y0: Vec<f64>,
    pub options: SimOptions,
}

pub fn compile_scenario(scenario: &Scenario) -> AppResult<ScenarioRuntime> {
    cm_project::validate_scenario(scenario).map_err(|e| AppError::Validation(e.to_string()))?;

    let model = match scenario.model {
        ModelKind::Paci2018 => build_paci2018(scenario)?,
    };

    let y0 = match &scenario.initial_state {
        InitialStateDef::Preset { name } => StatePreset::from_name(name)
            .ok_or_else(|| AppError::Compile(format!("unknown state preset {name}")))?
            .values()
            .to_vec(),
        InitialStateDef::Explicit { values } => values.clone(),
    };

    let drug = &scenario.drug;
    let drug = DrugBlock::new(
        drug.application_time_s,
        BlockScales {
            i_na: drug.i_na,
            i_ca_l: drug.i_ca_l,
            i_kr: drug.i_kr,
            i_ks: drug.i_ks,
        },
    )?;

    let selection = match &scenario.currents {
        Some(names) => CurrentSelection::from_names(names.iter().cloned())
            .map_err(|e| AppError::Compile(e.to_string()))?,
        None => CurrentSelection::default(),
    };

    let solver = BdfOptions {
        rtol: scenario.solver.rtol,
        atol: scenario.solver.atol,
        max_step: scenario.solver.max_step_s,
        first_step: scenario.solver.first_step_s,
        min_step: scenario.solver.min_step_s,
        max_steps: scenario.solver.max_steps,
    };

    let protocol = match &scenario.protocol {
        ProtocolDef::Spontaneous | ProtocolDef::Paced(_) => Protocol::Spontaneous,
        ProtocolDef::VoltageClamp { steps } => Protocol::VoltageClamp(
            cm_project::validate::clamp_schedule(steps)?,
        ),
        ProtocolDef::IrregularPacing(p) => Protocol::IrregularPacing(IrregularPacing {
            offsets_s: p.offsets_s.clone(),
            amplitude_a_per_f: p.amplitude_a_per_f,
            duration_s: p.duration_s,
            ap_start_voltage_v: p.ap_start_voltage_v,
            peak_threshold_v: p.peak_threshold_v,
        }),
    };

    Ok(ScenarioRuntime {
        model,
        y0,
        options: SimOptions {
            t0: scenario.interval.t0_s,
            t_end: scenario.interval.t_end_s,
            solver,
            drug,
            selection,
            parallel_reconstruction: scenario.output.parallel_reconstruction,
            protocol,
        },
    })
}

fn build_paci2018(scenario: &Scenario) -> AppResult<Paci2018> {
    let conductances = Conductances::with_overrides(
        scenario
            .conductances
            .iter()
            .map(|(name, value)| (name.as_str(), *value)),
    )?;
    // Periodic pacing lives in the model; the other protocols are driven by
    // the simulation.
    let stimulus = match &scenario.protocol {
        ProtocolDef::Paced(s) => Some(Stimulus::new(
            s.amplitude_a_per_f,
            s.start_s,
            s.period_s,
            s.duration_s,
        )?),
        _ => None,
    };
    Ok(Paci2018::new(conductances, stimulus))
}
