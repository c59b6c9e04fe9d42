//! Simulation runner: integration, reconstruction and aggregation in sequence.

use crate::aggregate::{AggregatedSeries, CurrentSelection, aggregate};
use crate::error::{SimError, SimResult};
use crate::integrate::{check_initial_state, integrate_with_progress};
use crate::protocol::{
    PacingRecord, Protocol, integrate_irregular_pacing, integrate_voltage_clamp,
};
use crate::reconstruct::{Reconstruction, reconstruct};
use crate::summary::TraceSummary;
use cm_model::{CellModel, DrugBlock, StateSlot, TrainPaced, VoltageClamped};
use cm_solver::{BdfOptions, SolverStats, StepProgress, Trajectory};
use tracing::{debug, info, warn};

/// Options for simulation runs.
#[derive(Clone, Debug, PartialEq)]
pub struct SimOptions {
    /// Start time (seconds)
    pub t0: f64,
    /// Final simulation time (seconds)
    pub t_end: f64,
    /// Stiff integrator settings
    pub solver: BdfOptions,
    /// Drug block applied from its application time on
    pub drug: DrugBlock,
    /// Diagnostic slots summed into the total current
    pub selection: CurrentSelection,
    /// Evaluate reconstruction samples on the rayon pool
    pub parallel_reconstruction: bool,
    /// Membrane protocol
    pub protocol: Protocol,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            t0: 0.0,
            t_end: 40.0,
            solver: BdfOptions {
                max_step: 1e-3,
                ..BdfOptions::default()
            },
            drug: DrugBlock::none(),
            selection: CurrentSelection::default(),
            parallel_reconstruction: true,
            protocol: Protocol::Spontaneous,
        }
    }
}

/// Progress of a run, stage by stage.
#[derive(Clone, Copy, Debug)]
pub enum SimProgress {
    Integrating(StepProgress),
    Reconstructing { samples: usize },
    Aggregating { samples: usize },
}

/// Everything one run produces, indexed by accepted sample.
#[derive(Clone, Debug)]
pub struct SimRecord {
    pub model: String,
    /// Accepted sample times (seconds)
    pub t: Vec<f64>,
    /// Accepted states
    pub y: Vec<Vec<f64>>,
    pub state_names: Vec<&'static str>,
    pub reconstruction: Reconstruction,
    pub series: AggregatedSeries,
    pub stats: SolverStats,
    /// Worst reconstructed-derivative mismatch in the solver's error metric
    pub derivative_mismatch: f64,
    /// Landmarks of an irregularly paced run
    pub pacing: Option<PacingRecord>,
}

impl SimRecord {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Time series of a named state slot.
    pub fn state_series(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.state_names.iter().position(|n| *n == name)?;
        Some(self.y.iter().map(|y| y[index]).collect())
    }

    /// Membrane potential (V).
    pub fn vm(&self) -> Vec<f64> {
        self.state_series(StateSlot::Vm.name()).unwrap_or_default()
    }

    pub fn summary(&self) -> Option<TraceSummary> {
        TraceSummary::from_series(&self.t, &self.vm(), &self.series)
    }
}

/// Run a simulation of `model` from `y0`.
pub fn run_sim<M: CellModel + ?Sized>(
    model: &M,
    y0: &[f64],
    opts: &SimOptions,
) -> SimResult<SimRecord> {
    run_sim_with_progress(model, y0, opts, None)
}

/// Run a simulation, reporting progress through an optional callback.
pub fn run_sim_with_progress<M: CellModel + ?Sized>(
    model: &M,
    y0: &[f64],
    opts: &SimOptions,
    mut progress: Option<&mut dyn FnMut(SimProgress)>,
) -> SimResult<SimRecord> {
    check_initial_state(model, y0)?;
    let drug = DrugBlock::new(opts.drug.application_time, opts.drug.scales)?;
    let scales = drug.scales;
    if [scales.i_na, scales.i_ca_l, scales.i_kr, scales.i_ks]
        .iter()
        .any(|s| *s > 1.0)
    {
        warn!(?scales, "block factor above 1 enhances the current");
    }
    let vm_index = model
        .state_names()
        .iter()
        .position(|n| *n == StateSlot::Vm.name())
        .ok_or_else(|| SimError::InvalidConfig {
            what: format!("{} has no {} state slot", model.name(), StateSlot::Vm.name()),
        })?;
    opts.selection
        .resolve(model.diagnostic_names())
        .map_err(|e| SimError::InvalidConfig {
            what: e.to_string(),
        })?;

    info!(
        model = model.name(),
        protocol = opts.protocol.name(),
        t0 = opts.t0,
        t_end = opts.t_end,
        currents = opts.selection.len(),
        "simulation started"
    );

    let mut forward = |p: StepProgress| {
        if let Some(cb) = progress.as_deref_mut() {
            cb(SimProgress::Integrating(p));
        }
    };
    let on_step = Some(&mut forward as &mut dyn FnMut(StepProgress));
    let (t0, t_end, solver) = (opts.t0, opts.t_end, &opts.solver);

    let record = match &opts.protocol {
        Protocol::Spontaneous => {
            let trajectory = integrate_with_progress(model, y0, t0, t_end, &drug, solver, on_step)?;
            finish(model, trajectory, None, vm_index, &drug, opts, &mut progress)?
        }
        Protocol::VoltageClamp(clamp) => {
            let trajectory =
                integrate_voltage_clamp(model, clamp, y0, t0, t_end, &drug, solver, on_step)?;
            let clamped = VoltageClamped::new(model)?;
            finish(&clamped, trajectory, None, vm_index, &drug, opts, &mut progress)?
        }
        Protocol::IrregularPacing(pacing) => {
            let run =
                integrate_irregular_pacing(model, pacing, y0, t0, t_end, &drug, solver, on_step)?;
            info!(
                peaks = run.record.peaks.len(),
                stimulations = run.record.stimulations.len(),
                "irregular pacing finished"
            );
            let paced = TrainPaced::new(model, run.train)?;
            finish(&paced, run.trajectory, Some(run.record), vm_index, &drug, opts, &mut progress)?
        }
    };

    info!(
        samples = record.len(),
        steps = record.stats.steps,
        "simulation finished"
    );
    Ok(record)
}

/// Reconstruction and aggregation over an integrated trajectory, evaluated
/// with the model the protocol integrated.
fn finish<M: CellModel + ?Sized>(
    evaluator: &M,
    trajectory: Trajectory,
    pacing: Option<PacingRecord>,
    vm_index: usize,
    drug: &DrugBlock,
    opts: &SimOptions,
    progress: &mut Option<&mut dyn FnMut(SimProgress)>,
) -> SimResult<SimRecord> {
    let samples = trajectory.len();
    if let Some(cb) = progress.as_deref_mut() {
        cb(SimProgress::Reconstructing { samples });
    }
    let reconstruction = reconstruct(evaluator, &trajectory, drug, opts.parallel_reconstruction)?;

    let worst = reconstruction
        .derivative_mismatch(&trajectory, opts.solver.rtol, opts.solver.atol)
        .into_iter()
        .fold(0.0, f64::max);
    if worst > 1.0 {
        warn!(worst, "reconstructed derivative departs from accepted steps");
    } else {
        debug!(worst, "derivative mismatch against accepted steps");
    }

    if let Some(cb) = progress.as_deref_mut() {
        cb(SimProgress::Aggregating { samples });
    }
    let y: Vec<Vec<f64>> = trajectory.y.iter().map(|v| v.as_slice().to_vec()).collect();
    let vm: Vec<f64> = y.iter().map(|v| v[vm_index]).collect();
    let series = aggregate(
        &trajectory.t,
        &vm,
        &reconstruction.names,
        &reconstruction.diagnostics,
        &opts.selection,
    )?;

    Ok(SimRecord {
        model: evaluator.name().to_string(),
        t: trajectory.t,
        y,
        state_names: evaluator.state_names().to_vec(),
        reconstruction,
        series,
        stats: trajectory.stats,
        derivative_mismatch: worst,
        pacing,
    })
}
