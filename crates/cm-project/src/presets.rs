//! Built-in scenarios.

use crate::schema::{
    ClampStepDef, DrugDef, InitialStateDef, IntervalDef, ModelKind, OutputDef, ProtocolDef,
    Scenario, SolverDef, StimulusDef,
};
use crate::validate::LATEST_VERSION;
use std::collections::BTreeMap;

/// 40 s of spontaneous beating from the limit-cycle state, no block.
pub fn spontaneous_scenario() -> Scenario {
    Scenario {
        version: LATEST_VERSION,
        name: "Spontaneous beating".to_string(),
        description: None,
        model: ModelKind::Paci2018,
        initial_state: InitialStateDef::default(),
        interval: IntervalDef::default(),
        solver: SolverDef::default(),
        drug: DrugDef::default(),
        conductances: BTreeMap::new(),
        protocol: ProtocolDef::Spontaneous,
        currents: None,
        output: OutputDef::default(),
    }
}

/// Half block of I_Kr applied at 20 s.
pub fn ikr_block_scenario() -> Scenario {
    Scenario {
        name: "I_Kr block".to_string(),
        drug: DrugDef {
            application_time_s: 20.0,
            i_kr: 0.5,
            ..DrugDef::default()
        },
        ..spontaneous_scenario()
    }
}

/// 1 Hz pacing from the resting state.
pub fn paced_scenario() -> Scenario {
    Scenario {
        name: "Paced 1 Hz".to_string(),
        initial_state: InitialStateDef::Preset {
            name: "resting".to_string(),
        },
        interval: IntervalDef {
            t0_s: 0.0,
            t_end_s: 10.0,
        },
        protocol: ProtocolDef::Paced(StimulusDef {
            amplitude_a_per_f: 5.5,
            start_s: 0.1,
            period_s: 1.0,
            duration_s: 0.002,
        }),
        ..spontaneous_scenario()
    }
}

/// Sodium activation family: hold at -80 mV, hyperpolarize, then step
/// through depolarizing test potentials with a return to holding between.
pub fn voltage_clamp_scenario() -> Scenario {
    let mut steps = vec![
        ClampStepDef {
            duration_s: 0.5,
            voltage_v: -0.08,
        },
        ClampStepDef {
            duration_s: 0.1,
            voltage_v: -0.12,
        },
    ];
    for mv in [-60.0, -40.0, -20.0, 0.0, 20.0] {
        steps.push(ClampStepDef {
            duration_s: 0.05,
            voltage_v: mv * 1e-3,
        });
        steps.push(ClampStepDef {
            duration_s: 0.2,
            voltage_v: -0.08,
        });
    }
    Scenario {
        name: "Voltage clamp steps".to_string(),
        interval: IntervalDef {
            t0_s: 0.0,
            t_end_s: 1.85,
        },
        protocol: ProtocolDef::VoltageClamp { steps },
        ..spontaneous_scenario()
    }
}

/// Built-in scenario by id.
pub fn builtin(id: &str) -> Option<Scenario> {
    match id {
        "spontaneous" => Some(spontaneous_scenario()),
        "ikr-block" => Some(ikr_block_scenario()),
        "paced" => Some(paced_scenario()),
        "voltage-clamp" => Some(voltage_clamp_scenario()),
        _ => None,
    }
}

pub const BUILTIN_IDS: [&str; 4] = ["spontaneous", "ikr-block", "paced", "voltage-clamp"];
