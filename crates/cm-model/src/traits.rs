//! The cell-model capability consumed by the simulation driver.

use crate::drug::DrugBlock;
use crate::error::ModelResult;

/// Output of one evaluator call.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// State derivative, same length and slot order as the state.
    pub dydt: Vec<f64>,
    /// Instantaneous diagnostic quantities (currents, reversal potentials).
    pub diagnostics: Vec<f64>,
}

/// A cell model: `(t, y, drug block) -> (dy/dt, diagnostics)`.
///
/// Implementations must be pure and deterministic. The integrator evaluates trial
/// times out of order and the reconstructor replays accepted samples later, so
/// an evaluator must not carry anything from one call to the next.
pub trait CellModel: Send + Sync {
    /// Model name for logging and run manifests.
    fn name(&self) -> &str;

    /// Number of state variables.
    fn state_len(&self) -> usize;

    /// Number of diagnostic quantities.
    fn diagnostic_len(&self) -> usize;

    /// Names of the state slots, in slot order.
    fn state_names(&self) -> &[&'static str];

    /// Names of the diagnostic slots, in slot order.
    fn diagnostic_names(&self) -> &[&'static str];

    /// Evaluate derivative and diagnostics at `(t, y)`.
    fn evaluate(&self, t: f64, y: &[f64], block: &DrugBlock) -> ModelResult<Evaluation>;

    /// Evaluate only the derivative.
    ///
    /// Default implementation discards the diagnostics of [`CellModel::evaluate`].
    fn derivative(&self, t: f64, y: &[f64], block: &DrugBlock) -> ModelResult<Vec<f64>> {
        self.evaluate(t, y, block).map(|e| e.dydt)
    }
}
