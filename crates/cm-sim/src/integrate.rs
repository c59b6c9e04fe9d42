//! Stiff integration of a cell model.

use crate::error::{SimError, SimResult};
use cm_core::first_non_finite;
use cm_model::{CellModel, DrugBlock};
use cm_solver::{BdfOptions, SolverError, StepControl, StepObserver, StepProgress, Trajectory};
use nalgebra::DVector;
use tracing::info;

/// Check an initial state against the model layout before any integration.
pub fn check_initial_state<M: CellModel + ?Sized>(model: &M, y0: &[f64]) -> SimResult<()> {
    if y0.len() != model.state_len() {
        return Err(SimError::InitialState {
            what: format!(
                "{} expects {} state values, got {}",
                model.name(),
                model.state_len(),
                y0.len()
            ),
        });
    }
    if let Some(i) = first_non_finite(y0) {
        let slot = model.state_names().get(i).copied().unwrap_or("?");
        return Err(SimError::InitialState {
            what: format!("slot {i} ({slot}) is {}", y0[i]),
        });
    }
    Ok(())
}

/// Integrate `model` from `(t0, y0)` to `t_end` under `block`.
pub fn integrate<M: CellModel + ?Sized>(
    model: &M,
    y0: &[f64],
    t0: f64,
    t_end: f64,
    block: &DrugBlock,
    solver: &BdfOptions,
) -> SimResult<Trajectory> {
    integrate_with_progress(model, y0, t0, t_end, block, solver, None)
}

/// Same as [`integrate`], streaming solver progress after each accepted step.
///
/// On failure the error carries the time of the last accepted sample.
#[allow(clippy::too_many_arguments)]
pub fn integrate_with_progress<M: CellModel + ?Sized>(
    model: &M,
    y0: &[f64],
    t0: f64,
    t_end: f64,
    block: &DrugBlock,
    solver: &BdfOptions,
    mut progress: Option<&mut dyn FnMut(StepProgress)>,
) -> SimResult<Trajectory> {
    let mut forward = |p: &StepProgress, _y: &DVector<f64>| {
        if let Some(cb) = progress.as_deref_mut() {
            cb(*p);
        }
        StepControl::Continue
    };
    let observer: StepObserver<'_> = &mut forward;
    integrate_with_observer(model, y0, t0, t_end, block, solver, Some(observer))
}

/// Same as [`integrate`], handing every accepted step and its state to
/// `observer`, which may end the run early.
#[allow(clippy::too_many_arguments)]
pub fn integrate_with_observer<M: CellModel + ?Sized>(
    model: &M,
    y0: &[f64],
    t0: f64,
    t_end: f64,
    block: &DrugBlock,
    solver: &BdfOptions,
    mut observer: Option<StepObserver<'_>>,
) -> SimResult<Trajectory> {
    check_initial_state(model, y0)?;
    if !t0.is_finite() || !t_end.is_finite() || t_end <= t0 {
        return Err(SimError::InvalidConfig {
            what: format!("interval [{t0}, {t_end}] must be finite and increasing"),
        });
    }
    solver.validate().map_err(|e| SimError::InvalidConfig {
        what: e.to_string(),
    })?;

    let rhs = |t: f64, y: &DVector<f64>| -> Result<DVector<f64>, SolverError> {
        model
            .derivative(t, y.as_slice(), block)
            .map(DVector::from_vec)
            .map_err(|e| SolverError::Rhs {
                t,
                message: e.to_string(),
            })
    };

    info!(
        model = model.name(),
        t0,
        t_end,
        block_active_from = block.application_time,
        max_step = solver.max_step,
        "integration started"
    );

    let mut t_reached = t0;
    let mut on_step = |p: &StepProgress, y: &DVector<f64>| {
        t_reached = p.t;
        match observer.as_deref_mut() {
            Some(observe) => observe(p, y),
            None => StepControl::Continue,
        }
    };

    let on_step: StepObserver<'_> = &mut on_step;
    let result = cm_solver::integrate_with_observer(
        rhs,
        t0,
        DVector::from_column_slice(y0),
        t_end,
        solver,
        Some(on_step),
    );

    match result {
        Ok(trajectory) => {
            info!(
                samples = trajectory.len(),
                steps = trajectory.stats.steps,
                rejected = trajectory.stats.rejected_steps,
                "integration finished"
            );
            Ok(trajectory)
        }
        Err(source) => Err(SimError::Integration { t_reached, source }),
    }
}
