//! Small cell models for driver tests.

#![allow(dead_code)]

use cm_model::{CellModel, DrugBlock, Evaluation, ModelError, ModelResult};

/// Two-state relaxation model whose decay rates are scaled by the block.
///
/// Diagnostics are `[i_Na, i_K, E_K]` where `i_Na` and `i_K` report the
/// effective block factors and `E_K` is a constant sentinel.
pub struct RelaxationCell {
    /// Time after which the diagnostics turn non-finite
    pub poison_diagnostics_after: f64,
    /// Time after which the derivative turns non-finite
    pub poison_derivative_after: f64,
}

impl Default for RelaxationCell {
    fn default() -> Self {
        Self {
            poison_diagnostics_after: f64::INFINITY,
            poison_derivative_after: f64::INFINITY,
        }
    }
}

pub const E_K_SENTINEL: f64 = -1.0e3;

impl CellModel for RelaxationCell {
    fn name(&self) -> &str {
        "relaxation"
    }

    fn state_len(&self) -> usize {
        2
    }

    fn diagnostic_len(&self) -> usize {
        3
    }

    fn state_names(&self) -> &[&'static str] {
        &["Vm", "c"]
    }

    fn diagnostic_names(&self) -> &[&'static str] {
        &["i_Na", "i_K", "E_K"]
    }

    fn evaluate(&self, t: f64, y: &[f64], block: &DrugBlock) -> ModelResult<Evaluation> {
        if y.len() != 2 {
            return Err(ModelError::StateLength {
                expected: 2,
                actual: y.len(),
            });
        }
        let scales = block.effective_scales(t);
        let mut dydt = vec![
            -50.0 * scales.i_na * (y[0] + 0.07),
            -0.5 * scales.i_kr * y[1],
        ];
        if t > self.poison_derivative_after {
            dydt[0] = f64::NAN;
        }
        let mut diagnostics = vec![scales.i_na, scales.i_kr, E_K_SENTINEL];
        if t > self.poison_diagnostics_after {
            diagnostics[1] = f64::INFINITY;
        }
        Ok(Evaluation { dydt, diagnostics })
    }
}
