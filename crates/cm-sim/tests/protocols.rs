//! Voltage-clamp and irregular-pacing runs through the whole driver.

mod common;

use cm_model::{DiagnosticSlot, Paci2018, StatePreset, VoltageClamp, VoltageClampStep};
use cm_sim::{
    CurrentSelection, IrregularPacing, Protocol, SimError, SimOptions, SimProgress, SimStage,
    run_sim, run_sim_with_progress,
};
use cm_solver::{BdfOptions, SolverError};
use common::RelaxationCell;

fn step(duration_s: f64, voltage_v: f64) -> VoltageClampStep {
    VoltageClampStep {
        duration_s,
        voltage_v,
    }
}

fn activation_schedule() -> VoltageClamp {
    VoltageClamp::new(vec![
        step(0.1, -0.08),
        step(0.1, -0.12),
        step(0.05, -0.04),
        step(0.05, 0.02),
    ])
    .unwrap()
}

fn relaxation_options(protocol: Protocol) -> SimOptions {
    SimOptions {
        t_end: 0.4,
        selection: CurrentSelection::from_names(["i_Na", "i_K"]).unwrap(),
        protocol,
        ..SimOptions::default()
    }
}

#[test]
fn paci_clamp_follows_command_voltage() {
    let clamp = activation_schedule();
    let model = Paci2018::default();
    let y0 = StatePreset::Paci2018.values();
    let opts = SimOptions {
        t_end: 0.3,
        protocol: Protocol::VoltageClamp(clamp.clone()),
        ..SimOptions::default()
    };
    let record = run_sim(&model, &y0, &opts).unwrap();

    assert_eq!(record.t[0], 0.0);
    assert_eq!(*record.t.last().unwrap(), 0.3);
    let vm = record.vm();
    assert_eq!(vm[0], -0.08);
    for i in 1..record.len() {
        // Boundary samples report the outgoing step.
        let expected = clamp.voltage_at(record.t[i] - 1e-12);
        assert_eq!(vm[i], expected, "sample {i} at t = {}", record.t[i]);
        assert!(record.t[i] > record.t[i - 1]);
    }

    // Clamp currents are recorded at every sample.
    assert!(record.series.i_tot.iter().all(|v| v.is_finite()));
    let i_cal = record
        .reconstruction
        .series(DiagnosticSlot::ICaL.name())
        .unwrap();
    let min_in = |lo: f64, hi: f64| {
        record
            .t
            .iter()
            .zip(i_cal)
            .filter(|(t, _)| **t > lo && **t < hi)
            .fold(f64::INFINITY, |m, (_, v)| m.min(*v))
    };
    assert!(
        min_in(0.25, 0.3) < min_in(0.0, 0.1),
        "L-type calcium current should activate at +20 mV"
    );
    assert!(record.derivative_mismatch <= 1.0);
    assert!(record.pacing.is_none());
}

#[test]
fn clamp_segments_stitch_into_one_record() {
    let clamp = VoltageClamp::new(vec![step(0.1, -0.05), step(0.1, 0.01)]).unwrap();
    let model = RelaxationCell::default();
    let opts = relaxation_options(Protocol::VoltageClamp(clamp));

    let mut steps = Vec::new();
    let mut cb = |p: SimProgress| {
        if let SimProgress::Integrating(step) = p {
            assert_eq!(step.t_end, 0.4);
            steps.push(step.step);
        }
    };
    let record =
        run_sim_with_progress(&model, &[-0.02, 1.0], &opts, Some(&mut cb as &mut dyn FnMut(SimProgress)))
            .unwrap();

    assert_eq!(record.stats.steps, record.len() - 1);
    assert_eq!(steps, (1..record.len()).collect::<Vec<_>>());
    let vm = record.vm();
    for (t, v) in record.t.iter().zip(&vm).skip(1) {
        let expected = if *t <= 0.1 { -0.05 } else { 0.01 };
        assert_eq!(*v, expected, "t = {t}");
    }
    // The last step holds past the end of the schedule.
    assert_eq!(*vm.last().unwrap(), 0.01);
    // dVm/dt is zero inside each step.
    for (i, t) in record.t.iter().enumerate().skip(2) {
        if (*t - 0.1).abs() > 1e-9 && (record.t[i - 1] - 0.1).abs() > 1e-9 {
            assert_eq!(record.series.dvm_dt[i], 0.0, "t = {t}");
        }
    }
}

#[test]
fn clamp_step_budget_spans_segments() {
    let clamp = VoltageClamp::new(vec![step(0.1, -0.05), step(0.3, 0.01)]).unwrap();
    let opts = SimOptions {
        solver: BdfOptions {
            max_step: 1e-3,
            max_steps: 150,
            ..BdfOptions::default()
        },
        ..relaxation_options(Protocol::VoltageClamp(clamp))
    };
    let err = run_sim(&RelaxationCell::default(), &[-0.02, 1.0], &opts).unwrap_err();
    assert_eq!(err.stage(), SimStage::Integration);
    match err {
        SimError::Integration {
            t_reached, source, ..
        } => {
            assert!(matches!(source, SolverError::MaxStepsExceeded { .. }));
            assert!(t_reached > 0.1 && t_reached < 0.2, "t_reached = {t_reached}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn irregular_pacing_without_action_potentials_runs_free() {
    let model = RelaxationCell::default();
    let pacing = IrregularPacing {
        offsets_s: vec![0.1, 0.2],
        ..IrregularPacing::default()
    };
    let paced = run_sim(
        &model,
        &[-0.02, 1.0],
        &relaxation_options(Protocol::IrregularPacing(pacing)),
    )
    .unwrap();
    let free = run_sim(&model, &[-0.02, 1.0], &relaxation_options(Protocol::Spontaneous)).unwrap();

    let record = paced.pacing.as_ref().unwrap();
    assert!(record.peaks.is_empty());
    assert!(record.stimulations.is_empty());
    assert_eq!(paced.t, free.t);
    assert_eq!(paced.y, free.y);
}

#[test]
fn paci_irregular_pacing_schedules_stimuli_after_apd90() {
    let model = Paci2018::default();
    let y0 = StatePreset::Paci2018.values();
    let pacing = IrregularPacing {
        offsets_s: vec![0.6, 0.4],
        ..IrregularPacing::default()
    };
    let opts = SimOptions {
        t_end: 5.0,
        protocol: Protocol::IrregularPacing(pacing.clone()),
        ..SimOptions::default()
    };
    let record = run_sim(&model, &y0, &opts).unwrap();
    let pacing_record = record.pacing.as_ref().unwrap();

    assert!(!pacing_record.peaks.is_empty(), "no action potential in 5 s");
    assert!(!pacing_record.stimulations.is_empty());
    assert!(pacing_record.stimulations.len() <= pacing.offsets_s.len());
    for (k, onset) in pacing_record.stimulations.iter().enumerate() {
        let apd90 = pacing_record.apd90_ends[k];
        assert!((onset - (apd90 + pacing.offsets_s[k])).abs() < 1e-12);
        assert!(record.t.contains(&apd90), "APD90 at an accepted sample");
    }

    // The stimulus shows up in the diagnostics right after each onset.
    let i_stim = record
        .reconstruction
        .series(DiagnosticSlot::Istim.name())
        .unwrap();
    for onset in &pacing_record.stimulations {
        let inside = record
            .t
            .iter()
            .zip(i_stim)
            .filter(|(t, _)| **t > *onset && **t <= onset + pacing.duration_s);
        for (t, i) in inside {
            assert_eq!(*i, pacing.amplitude_a_per_f, "t = {t}");
        }
    }
    for w in record.t.windows(2) {
        assert!(w[1] > w[0]);
    }
    assert_eq!(record.stats.steps, record.len() - 1);
    assert!(record.derivative_mismatch <= 1.0);
}
