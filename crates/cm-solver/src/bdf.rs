//! Variable-order, variable-step BDF integration on diffsol.
//!
//! The right-hand side is wrapped into a diffsol problem whose Jacobian is
//! built from finite-difference Jacobian-vector products. The driver loop
//! takes one accepted step at a time and records every sample. The step-size
//! cap is a moving stop time at `t + max_step`: diffsol shortens the next step
//! to land on it without discarding the solution history.

use crate::error::{SolverError, SolverResult};
use crate::jacobian::finite_difference_jvp;
use crate::trajectory::{SolverStats, Trajectory};
use cm_core::{ensure_finite, weighted_rms_norm};
use diffsol::{NalgebraLU, OdeBuilder, OdeSolverMethod, OdeSolverStopReason};
use nalgebra::{DMatrix, DVector};
use std::cell::{Cell, RefCell};
use tracing::{debug, info, trace};

type M = DMatrix<f64>;
type LS = NalgebraLU<f64>;

/// Integrator configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct BdfOptions {
    /// Relative tolerance on the local error
    pub rtol: f64,
    /// Absolute tolerance on the local error
    pub atol: f64,
    /// Upper bound on the step size (s)
    pub max_step: f64,
    /// Initial step size (s); selected automatically when `None`
    pub first_step: Option<f64>,
    /// Lower bound on the proposed step size (s); diffsol's own floor always
    /// applies as well
    pub min_step: f64,
    /// Maximum number of accepted steps (safety limit)
    pub max_steps: usize,
}

impl Default for BdfOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            atol: 1e-6,
            max_step: f64::INFINITY,
            first_step: None,
            min_step: 0.0,
            max_steps: 1_000_000,
        }
    }
}

impl BdfOptions {
    pub fn validate(&self) -> SolverResult<()> {
        let invalid = |what: &str| {
            Err(SolverError::InvalidArg {
                what: what.to_string(),
            })
        };
        if ensure_finite(self.rtol, "rtol")? <= 0.0 {
            return invalid("rtol must be positive");
        }
        if ensure_finite(self.atol, "atol")? <= 0.0 {
            return invalid("atol must be positive");
        }
        if self.max_step.is_nan() || self.max_step <= 0.0 {
            return invalid("max_step must be positive");
        }
        if !self.min_step.is_finite() || self.min_step < 0.0 {
            return invalid("min_step must be finite and non-negative");
        }
        if self.min_step > self.max_step {
            return invalid("min_step must not exceed max_step");
        }
        if let Some(h) = self.first_step
            && (!h.is_finite() || h <= 0.0)
        {
            return invalid("first_step must be finite and positive");
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be positive");
        }
        Ok(())
    }
}

/// Snapshot passed to step observers after each accepted step.
#[derive(Clone, Copy, Debug)]
pub struct StepProgress {
    pub t: f64,
    pub t_end: f64,
    pub step: usize,
    /// Step that produced this sample
    pub h: f64,
    pub rejected_steps: usize,
}

impl StepProgress {
    pub fn fraction_complete(&self, t0: f64) -> f64 {
        let span = self.t_end - t0;
        if span > 0.0 {
            ((self.t - t0) / span).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }
}

/// Observer verdict after an accepted step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepControl {
    Continue,
    /// End the integration at the sample just accepted.
    Stop,
}

/// Observer called with each accepted step and its state.
pub type StepObserver<'a> = &'a mut dyn FnMut(&StepProgress, &DVector<f64>) -> StepControl;

/// A fallible right-hand side seen through diffsol's infallible callbacks.
///
/// The first error is parked and the output filled with NaN, which fails the
/// step in progress; the driver loop then reports the parked error.
struct RhsAdapter<'a, F> {
    rhs: &'a F,
    floor: f64,
    failure: RefCell<Option<SolverError>>,
    base: RefCell<Option<(f64, DVector<f64>, DVector<f64>)>>,
    rhs_evals: Cell<usize>,
    jvp_evals: Cell<usize>,
}

impl<'a, F> RhsAdapter<'a, F>
where
    F: Fn(f64, &DVector<f64>) -> SolverResult<DVector<f64>>,
{
    fn new(rhs: &'a F, floor: f64) -> Self {
        Self {
            rhs,
            floor,
            failure: RefCell::new(None),
            base: RefCell::new(None),
            rhs_evals: Cell::new(0),
            jvp_evals: Cell::new(0),
        }
    }

    fn call(&self, t: f64, x: &DVector<f64>) -> SolverResult<DVector<f64>> {
        self.rhs_evals.set(self.rhs_evals.get() + 1);
        let f = (self.rhs)(t, x)?;
        if f.len() != x.len() {
            return Err(SolverError::Rhs {
                t,
                message: format!("derivative has {} components, expected {}", f.len(), x.len()),
            });
        }
        Ok(f)
    }

    fn park(&self, err: SolverError, out: &mut DVector<f64>) {
        let mut failure = self.failure.borrow_mut();
        if failure.is_none() {
            *failure = Some(err);
        }
        out.fill(f64::NAN);
    }

    fn take_failure(&self) -> Option<SolverError> {
        self.failure.borrow_mut().take()
    }

    fn eval_into(&self, t: f64, x: &DVector<f64>, out: &mut DVector<f64>) {
        match self.call(t, x) {
            Ok(f) => out.copy_from(&f),
            Err(e) => self.park(e, out),
        }
    }

    /// `f(t, x)`, reusing the last base point while diffsol walks the
    /// columns of one Jacobian.
    fn base_value(&self, t: f64, x: &DVector<f64>) -> SolverResult<DVector<f64>> {
        if let Some((bt, bx, bf)) = self.base.borrow().as_ref()
            && *bt == t
            && bx == x
        {
            return Ok(bf.clone());
        }
        let f = self.call(t, x)?;
        *self.base.borrow_mut() = Some((t, x.clone(), f.clone()));
        Ok(f)
    }

    fn jvp_into(&self, t: f64, x: &DVector<f64>, v: &DVector<f64>, out: &mut DVector<f64>) {
        self.jvp_evals.set(self.jvp_evals.get() + 1);
        let product = self
            .base_value(t, x)
            .and_then(|f_x| finite_difference_jvp(x, &f_x, v, |xp| self.call(t, xp), self.floor));
        match product {
            Ok(jv) => out.copy_from(&jv),
            Err(e) => self.park(e, out),
        }
    }
}

/// Integrate from `t0` to `t_end`, recording every accepted step.
pub fn integrate<F>(
    rhs: F,
    t0: f64,
    y0: DVector<f64>,
    t_end: f64,
    opts: &BdfOptions,
) -> SolverResult<Trajectory>
where
    F: Fn(f64, &DVector<f64>) -> SolverResult<DVector<f64>>,
{
    integrate_with_observer(rhs, t0, y0, t_end, opts, None)
}

/// Integrate and hand each accepted step to `observer`.
///
/// When the observer answers [`StepControl::Stop`] the trajectory ends at that
/// sample and is returned as a success; `t_last()` then tells how far it got.
pub fn integrate_with_observer<F>(
    rhs: F,
    t0: f64,
    y0: DVector<f64>,
    t_end: f64,
    opts: &BdfOptions,
    mut observer: Option<StepObserver<'_>>,
) -> SolverResult<Trajectory>
where
    F: Fn(f64, &DVector<f64>) -> SolverResult<DVector<f64>>,
{
    opts.validate()?;
    if !t0.is_finite() || !t_end.is_finite() || t_end <= t0 {
        return Err(SolverError::InvalidArg {
            what: format!("integration interval [{t0}, {t_end}] must be finite and increasing"),
        });
    }
    if y0.is_empty() {
        return Err(SolverError::InvalidArg {
            what: "initial state is empty".to_string(),
        });
    }
    if let Some(i) = y0.iter().position(|v| !v.is_finite()) {
        return Err(SolverError::InvalidArg {
            what: format!("initial state component {i} is not finite"),
        });
    }

    let adapter = RhsAdapter::new(&rhs, opts.atol);
    let f0 = adapter.call(t0, &y0)?;
    if f0.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::Rhs {
            t: t0,
            message: "non-finite derivative at the initial state".to_string(),
        });
    }
    let h0 = match opts.first_step {
        Some(h) => h,
        None => select_initial_step(|t, y| adapter.call(t, y), t0, &y0, &f0, t_end, opts)?,
    }
    .min(t_end - t0)
    .min(opts.max_step);

    let start = y0.clone();
    let problem = OdeBuilder::<M>::new()
        .t0(t0)
        .h0(h0)
        .rtol(opts.rtol)
        .atol(vec![opts.atol; y0.len()])
        .rhs_implicit(
            |x: &DVector<f64>, _p: &DVector<f64>, t: f64, y: &mut DVector<f64>| {
                adapter.eval_into(t, x, y)
            },
            |x: &DVector<f64>, _p: &DVector<f64>, t: f64, v: &DVector<f64>, y: &mut DVector<f64>| {
                adapter.jvp_into(t, x, v, y)
            },
        )
        .init(move |_p: &DVector<f64>, _t: f64| start.clone())
        .build()
        .map_err(|e| SolverError::from_diffsol(e, t0, h0))?;
    let mut solver = problem
        .bdf::<LS>()
        .map_err(|e| SolverError::from_diffsol(e, t0, h0))?;

    info!(
        t0,
        t_end,
        n = y0.len(),
        h0,
        rtol = opts.rtol,
        atol = opts.atol,
        max_step = opts.max_step,
        "bdf integration started"
    );

    let mut trajectory = Trajectory::default();
    trajectory.push(t0, y0, f0, 0.0);

    let mut t_prev = t0;
    let mut stop = f64::NAN;
    let mut steps = 0;
    while t_prev < t_end {
        if steps >= opts.max_steps {
            return Err(SolverError::MaxStepsExceeded {
                t: t_prev,
                max_steps: opts.max_steps,
            });
        }
        let next_stop = (t_prev + opts.max_step).min(t_end);
        if next_stop != stop {
            solver
                .set_stop_time(next_stop)
                .map_err(|e| SolverError::from_diffsol(e, t_prev, solver.state().h))?;
            stop = next_stop;
        }

        let outcome = solver.step();
        if let Some(err) = adapter.take_failure() {
            return Err(err);
        }
        let reason =
            outcome.map_err(|e| SolverError::from_diffsol(e, t_prev, solver.state().h))?;

        let state = solver.state();
        let t = match reason {
            OdeSolverStopReason::TstopReached => stop,
            _ => state.t,
        };
        let y = state.y.clone();
        let h_next = state.h;
        if t <= t_prev {
            return Err(SolverError::Backend {
                t: t_prev,
                message: format!("solver did not advance past t = {t_prev}"),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::NonFiniteState { t });
        }
        if matches!(reason, OdeSolverStopReason::InternalTimestep) && h_next < opts.min_step {
            return Err(SolverError::StepSizeTooSmall { t, h: h_next });
        }

        let dydt = adapter.call(t, &y)?;
        if dydt.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::Rhs {
                t,
                message: "non-finite derivative at an accepted state".to_string(),
            });
        }
        steps += 1;
        let h = t - t_prev;
        trace!(t, h, "step accepted");
        trajectory.push(t, y, dydt, h);
        t_prev = t;

        if let Some(observe) = observer.as_deref_mut() {
            let stats = solver.get_statistics();
            let progress = StepProgress {
                t,
                t_end,
                step: steps,
                h,
                rejected_steps: stats.number_of_error_test_failures
                    + stats.number_of_nonlinear_solver_fails,
            };
            let last = &trajectory.y[trajectory.y.len() - 1];
            if observe(&progress, last) == StepControl::Stop {
                debug!(t, "integration stopped by observer");
                break;
            }
        }
    }

    let stats = solver.get_statistics();
    trajectory.stats = SolverStats {
        steps,
        rejected_steps: stats.number_of_error_test_failures
            + stats.number_of_nonlinear_solver_fails,
        rhs_evals: adapter.rhs_evals.get(),
        jacobian_evals: adapter.jvp_evals.get(),
        lu_decompositions: stats.number_of_linear_solver_setups,
    };
    info!(
        steps = trajectory.stats.steps,
        rejected = trajectory.stats.rejected_steps,
        rhs_evals = trajectory.stats.rhs_evals,
        jacobian_evals = trajectory.stats.jacobian_evals,
        "bdf integration finished"
    );
    Ok(trajectory)
}

/// Empirical first step for a first-order start (Hairer, Nørsett & Wanner).
fn select_initial_step<F>(
    rhs: F,
    t0: f64,
    y0: &DVector<f64>,
    f0: &DVector<f64>,
    t_bound: f64,
    opts: &BdfOptions,
) -> SolverResult<f64>
where
    F: Fn(f64, &DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let interval = t_bound - t0;
    let scale = y0.map(|v| opts.atol + v.abs() * opts.rtol);
    let d0 = weighted_rms_norm(y0.as_slice(), scale.as_slice());
    let d1 = weighted_rms_norm(f0.as_slice(), scale.as_slice());

    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };
    let h0 = h0.min(interval);

    let y1 = y0 + f0 * h0;
    let f1 = rhs(t0 + h0, &y1)?;
    let df = f1 - f0;
    let d2 = weighted_rms_norm(df.as_slice(), scale.as_slice()) / h0;

    let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
        1e-6_f64.max(h0 * 1e-3)
    } else {
        (0.01 / d1.max(d2)).sqrt()
    };

    Ok((100.0 * h0).min(h1).min(interval).min(opts.max_step))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay(_t: f64, y: &DVector<f64>) -> SolverResult<DVector<f64>> {
        Ok(-y)
    }

    #[test]
    fn exponential_decay_matches_exact_solution() {
        let opts = BdfOptions {
            rtol: 1e-6,
            atol: 1e-9,
            ..BdfOptions::default()
        };
        let traj = integrate(decay, 0.0, DVector::from_element(1, 1.0), 1.0, &opts).unwrap();
        let y_end = traj.y.last().unwrap()[0];
        assert_eq!(traj.t_last(), Some(1.0));
        assert!((y_end - (-1.0f64).exp()).abs() < 1e-4, "y(1) = {y_end}");
    }

    #[test]
    fn stiff_linear_problem_takes_few_steps() {
        // y' = -1000 (y - cos t); explicit methods need h < 2e-3 here.
        let rhs = |t: f64, y: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_element(1, -1000.0 * (y[0] - t.cos())))
        };
        let traj = integrate(rhs, 0.0, DVector::from_element(1, 0.0), 1.0, &BdfOptions::default())
            .unwrap();
        let t1: f64 = 1.0;
        let expected = (1.0e6 * t1.cos() + 1.0e3 * t1.sin()) / (1.0e6 + 1.0);
        let y_end = traj.y.last().unwrap()[0];
        assert!((y_end - expected).abs() < 1e-3, "y(1) = {y_end}, expected {expected}");
        assert!(traj.stats.steps < 500, "took {} steps", traj.stats.steps);
    }

    #[test]
    fn time_is_strictly_increasing_and_max_step_is_honored() {
        let opts = BdfOptions {
            max_step: 0.01,
            ..BdfOptions::default()
        };
        let traj = integrate(decay, 0.0, DVector::from_element(2, 1.0), 0.5, &opts).unwrap();
        assert_eq!(traj.t[0], 0.0);
        assert_eq!(traj.t_last(), Some(0.5));
        for w in traj.t.windows(2) {
            assert!(w[1] > w[0]);
            assert!(w[1] - w[0] <= 0.01 * (1.0 + 1e-9));
        }
        assert_eq!(traj.y.len(), traj.t.len());
        assert_eq!(traj.dydt.len(), traj.t.len());
        assert_eq!(traj.h.len(), traj.t.len());
        assert_eq!(traj.h[0], 0.0);
        assert_eq!(traj.stats.steps, traj.len() - 1);
    }

    #[test]
    fn recorded_derivative_is_rhs_at_accepted_state() {
        // Two decoupled time scales: fast -500, slow -0.5.
        let rhs = |_t: f64, y: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_vec(vec![-500.0 * y[0] + y[1], -0.5 * y[1]]))
        };
        let traj = integrate(
            rhs,
            0.0,
            DVector::from_vec(vec![1.0, 1.0]),
            2.0,
            &BdfOptions::default(),
        )
        .unwrap();
        for (i, (t, y)) in traj.t.iter().zip(&traj.y).enumerate() {
            let f = rhs(*t, y).unwrap();
            assert_eq!(f, traj.dydt[i], "sample {i}");
        }
        // Backward differences agree with the recorded derivative to the
        // order of the local error.
        for i in 1..traj.len() {
            let h = traj.h[i];
            let diff = (&traj.y[i] - &traj.y[i - 1]) / h - &traj.dydt[i];
            assert!(diff.amax() * h < 0.1, "sample {i}");
        }
    }

    #[test]
    fn blow_up_reports_time_reached() {
        // y' = y^2 with y(0) = 1 is singular at t = 1.
        let rhs = |_t: f64, y: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(y.map(|v| v * v))
        };
        let opts = BdfOptions {
            max_steps: 100_000,
            ..BdfOptions::default()
        };
        let err = integrate(rhs, 0.0, DVector::from_element(1, 1.0), 2.0, &opts).unwrap_err();
        let t = err.t_reached().expect("failure should carry the time reached");
        assert!(t > 0.5 && t < 1.5, "failed at t = {t}");
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let y0 = DVector::from_element(1, 1.0);
        assert!(integrate(decay, 1.0, y0.clone(), 1.0, &BdfOptions::default()).is_err());
        let bad = BdfOptions {
            rtol: 0.0,
            ..BdfOptions::default()
        };
        assert!(integrate(decay, 0.0, y0.clone(), 1.0, &bad).is_err());
        let nan_atol = BdfOptions {
            atol: f64::NAN,
            ..BdfOptions::default()
        };
        assert!(matches!(
            nan_atol.validate(),
            Err(SolverError::InvalidArg { what }) if what.contains("atol")
        ));
        let nan_state = DVector::from_element(1, f64::NAN);
        assert!(integrate(decay, 0.0, nan_state, 1.0, &BdfOptions::default()).is_err());
    }

    #[test]
    fn rhs_errors_propagate() {
        let rhs = |t: f64, y: &DVector<f64>| -> SolverResult<DVector<f64>> {
            if t > 0.25 {
                Err(SolverError::Rhs {
                    t,
                    message: "model rejected state".to_string(),
                })
            } else {
                Ok(-y)
            }
        };
        let err = integrate(rhs, 0.0, DVector::from_element(1, 1.0), 1.0, &BdfOptions::default())
            .unwrap_err();
        assert!(matches!(err, SolverError::Rhs { .. }));
        assert!(err.t_reached().unwrap() > 0.25);
    }

    #[test]
    fn step_limit_is_enforced() {
        let opts = BdfOptions {
            max_step: 1e-3,
            max_steps: 10,
            ..BdfOptions::default()
        };
        let err = integrate(decay, 0.0, DVector::from_element(1, 1.0), 1.0, &opts).unwrap_err();
        assert!(matches!(err, SolverError::MaxStepsExceeded { max_steps: 10, .. }));
        assert!(err.t_reached().unwrap() <= 10.0 * 1e-3 * (1.0 + 1e-9));
    }

    #[test]
    fn observer_sees_every_step_and_can_stop() {
        let opts = BdfOptions {
            max_step: 0.01,
            ..BdfOptions::default()
        };
        let mut seen = Vec::new();
        let mut observe = |p: &StepProgress, y: &DVector<f64>| {
            seen.push((p.step, p.t, y[0]));
            if p.t >= 0.3 {
                StepControl::Stop
            } else {
                StepControl::Continue
            }
        };
        let observer: StepObserver<'_> = &mut observe;
        let traj = integrate_with_observer(
            decay,
            0.0,
            DVector::from_element(1, 1.0),
            1.0,
            &opts,
            Some(observer),
        )
        .unwrap();
        let t_last = traj.t_last().unwrap();
        assert!((0.3..0.32).contains(&t_last), "stopped at {t_last}");
        assert_eq!(seen.len(), traj.len() - 1);
        for (k, (step, t, y)) in seen.iter().enumerate() {
            assert_eq!(*step, k + 1);
            assert_eq!(*t, traj.t[k + 1]);
            assert_eq!(*y, traj.y[k + 1][0]);
        }
    }
}
