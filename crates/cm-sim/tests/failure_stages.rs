//! Failures are fatal and name the stage, time and sample involved.

mod common;

use cm_sim::{CurrentSelection, SimError, SimOptions, SimStage, run_sim};
use common::RelaxationCell;

fn options() -> SimOptions {
    SimOptions {
        t_end: 1.0,
        selection: CurrentSelection::from_names(["i_Na", "i_K"]).unwrap(),
        ..SimOptions::default()
    }
}

#[test]
fn wrong_state_length_fails_in_setup() {
    let err = run_sim(&RelaxationCell::default(), &[0.0, 1.0, 2.0], &options()).unwrap_err();
    assert_eq!(err.stage(), SimStage::Setup);
    assert!(matches!(err, SimError::InitialState { .. }));
}

#[test]
fn non_finite_initial_slot_fails_in_setup() {
    let err = run_sim(&RelaxationCell::default(), &[f64::NAN, 1.0], &options()).unwrap_err();
    assert_eq!(err.stage(), SimStage::Setup);
    assert!(err.to_string().contains("Vm"));
}

#[test]
fn unknown_current_fails_in_setup() {
    let opts = SimOptions {
        selection: CurrentSelection::from_names(["i_Na", "i_CaL"]).unwrap(),
        ..options()
    };
    let err = run_sim(&RelaxationCell::default(), &[-0.02, 1.0], &opts).unwrap_err();
    assert_eq!(err.stage(), SimStage::Setup);
}

#[test]
fn non_finite_derivative_stops_integration() {
    let model = RelaxationCell {
        poison_derivative_after: 0.2,
        ..RelaxationCell::default()
    };
    let err = run_sim(&model, &[-0.02, 1.0], &options()).unwrap_err();
    assert_eq!(err.stage(), SimStage::Integration);
    let t = err.failed_at().unwrap();
    assert!(t <= 0.2 && t > 0.1, "furthest time reached {t}");
}

#[test]
fn non_finite_diagnostic_names_sample_and_slot() {
    let model = RelaxationCell {
        poison_diagnostics_after: 0.3,
        ..RelaxationCell::default()
    };
    let err = run_sim(&model, &[-0.02, 1.0], &options()).unwrap_err();
    assert_eq!(err.stage(), SimStage::Reconstruction);
    match err {
        SimError::NonFinite { sample, t, slot, .. } => {
            assert_eq!(slot, "i_K");
            assert!(t > 0.3);
            assert!(sample > 0);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn invalid_interval_fails_in_setup() {
    let opts = SimOptions {
        t0: 1.0,
        t_end: 1.0,
        ..options()
    };
    let err = run_sim(&RelaxationCell::default(), &[-0.02, 1.0], &opts).unwrap_err();
    assert_eq!(err.stage(), SimStage::Setup);
}
