//! Replaying accepted samples through the evaluator.
//!
//! The integrator keeps only states, so currents and reversal potentials are
//! recovered afterwards by evaluating the model once per accepted sample, at
//! exactly the accepted `(t_i, y_i)`.

use crate::error::{SimError, SimResult, SimStage};
use cm_core::{first_non_finite, weighted_rms_norm};
use cm_model::{CellModel, DrugBlock, Evaluation, ModelError, ModelResult};
use cm_solver::Trajectory;
use rayon::prelude::*;
use tracing::info;

/// Evaluator outputs at every accepted sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconstruction {
    /// Diagnostic slot names, in slot order
    pub names: Vec<&'static str>,
    /// One sequence per diagnostic slot, indexed like the trajectory
    pub diagnostics: Vec<Vec<f64>>,
    /// Model derivative at each sample
    pub dydt: Vec<Vec<f64>>,
}

impl Reconstruction {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.dydt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dydt.is_empty()
    }

    /// Sequence for a named diagnostic slot.
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        let index = self.names.iter().position(|n| *n == name)?;
        self.diagnostics.get(index).map(Vec::as_slice)
    }

    /// Diagnostic vector of one sample, in slot order.
    pub fn sample(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.len() {
            return None;
        }
        Some(self.diagnostics.iter().map(|col| col[index]).collect())
    }

    /// Consistency of the reconstructed derivative `f_i` with the derivative
    /// `g_i` the corrector enforced at each accepted sample, in the solver's
    /// own error metric: the weighted RMS of `h_i (f_i - g_i)` against
    /// `atol + rtol |y_i|`, with `h_i` the step that produced sample `i`.
    ///
    /// Values at or below 1 are within the local error tolerance; the initial
    /// sample always scores 0.
    pub fn derivative_mismatch(&self, trajectory: &Trajectory, rtol: f64, atol: f64) -> Vec<f64> {
        self.dydt
            .iter()
            .zip(&trajectory.dydt)
            .zip(trajectory.y.iter().zip(&trajectory.h))
            .map(|((recon, accepted), (y, h))| {
                let scaled: Vec<f64> = recon
                    .iter()
                    .zip(accepted.iter())
                    .map(|(f, g)| h * (f - g))
                    .collect();
                let scale: Vec<f64> = y.iter().map(|v| atol + rtol * v.abs()).collect();
                weighted_rms_norm(&scaled, &scale)
            })
            .collect()
    }
}

/// Evaluate `model` at every sample of `trajectory`, the initial one included.
///
/// With `parallel` the samples are evaluated on the rayon pool; results are
/// gathered by index, so the output is identical to the sequential path. The
/// first failing sample (lowest index) is reported.
pub fn reconstruct<M: CellModel + ?Sized>(
    model: &M,
    trajectory: &Trajectory,
    block: &DrugBlock,
    parallel: bool,
) -> SimResult<Reconstruction> {
    let samples = trajectory.len();
    info!(model = model.name(), samples, parallel, "reconstruction started");

    let evaluate = |i: usize| -> ModelResult<Evaluation> {
        model.evaluate(trajectory.t[i], trajectory.y[i].as_slice(), block)
    };
    let evaluations: Vec<ModelResult<Evaluation>> = if parallel {
        (0..samples).into_par_iter().map(evaluate).collect()
    } else {
        (0..samples).map(evaluate).collect()
    };

    let n_diag = model.diagnostic_len();
    let n_state = model.state_len();
    let mut diagnostics = vec![Vec::with_capacity(samples); n_diag];
    let mut dydt = Vec::with_capacity(samples);

    for (i, evaluation) in evaluations.into_iter().enumerate() {
        let t = trajectory.t[i];
        let fault = |source: ModelError| SimError::Evaluator {
            stage: SimStage::Reconstruction,
            sample: i,
            t,
            source,
        };
        let evaluation = evaluation.map_err(fault)?;

        if evaluation.dydt.len() != n_state {
            return Err(fault(ModelError::StateLength {
                expected: n_state,
                actual: evaluation.dydt.len(),
            }));
        }
        if evaluation.diagnostics.len() != n_diag {
            return Err(fault(ModelError::StateLength {
                expected: n_diag,
                actual: evaluation.diagnostics.len(),
            }));
        }
        if let Some(k) = first_non_finite(&evaluation.dydt) {
            let slot = model.state_names().get(k).copied().unwrap_or("?");
            return Err(SimError::NonFinite {
                stage: SimStage::Reconstruction,
                sample: i,
                t,
                slot: format!("d{slot}/dt"),
                value: evaluation.dydt[k],
            });
        }
        if let Some(k) = first_non_finite(&evaluation.diagnostics) {
            let slot = model.diagnostic_names().get(k).copied().unwrap_or("?");
            return Err(SimError::NonFinite {
                stage: SimStage::Reconstruction,
                sample: i,
                t,
                slot: slot.to_string(),
                value: evaluation.diagnostics[k],
            });
        }

        for (column, value) in diagnostics.iter_mut().zip(&evaluation.diagnostics) {
            column.push(*value);
        }
        dydt.push(evaluation.dydt);
    }

    info!(samples, "reconstruction finished");
    Ok(Reconstruction {
        names: model.diagnostic_names().to_vec(),
        diagnostics,
        dydt,
    })
}
