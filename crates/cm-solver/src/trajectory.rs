//! Accepted integration samples.

use nalgebra::DVector;

/// Counters collected while integrating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Accepted steps
    pub steps: usize,
    /// Step attempts rejected by the error test or a failed corrector
    pub rejected_steps: usize,
    /// Right-hand side evaluations (difference quotients included)
    pub rhs_evals: usize,
    /// Jacobian-vector products requested by the solver
    pub jacobian_evals: usize,
    /// Linear solver setups (Jacobian factorizations)
    pub lu_decompositions: usize,
}

/// Ordered accepted samples `(t_i, y_i)` with strictly increasing time.
///
/// `dydt[i]` is the derivative the corrector enforces at sample `i`: the
/// right-hand side at the accepted `(t_i, y_i)`, evaluated by the same
/// function the solver stepped with. `h[i]` is the step that produced sample
/// `i` (zero for the initial sample).
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    pub t: Vec<f64>,
    pub y: Vec<DVector<f64>>,
    pub dydt: Vec<DVector<f64>>,
    pub h: Vec<f64>,
    pub stats: SolverStats,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub(crate) fn push(&mut self, t: f64, y: DVector<f64>, dydt: DVector<f64>, h: f64) {
        self.t.push(t);
        self.y.push(y);
        self.dydt.push(dydt);
        self.h.push(h);
    }

    /// Append `other`, which must start where this trajectory ends.
    ///
    /// The first sample of `other` duplicates the last one here and is
    /// dropped; counters are summed.
    pub fn extend_from(&mut self, other: Trajectory) {
        let skip = usize::from(!self.is_empty() && other.t.first() == self.t.last());
        self.t.extend(other.t.into_iter().skip(skip));
        self.y.extend(other.y.into_iter().skip(skip));
        self.dydt.extend(other.dydt.into_iter().skip(skip));
        self.h.extend(other.h.into_iter().skip(skip));
        self.stats.steps += other.stats.steps;
        self.stats.rejected_steps += other.stats.rejected_steps;
        self.stats.rhs_evals += other.stats.rhs_evals;
        self.stats.jacobian_evals += other.stats.jacobian_evals;
        self.stats.lu_decompositions += other.stats.lu_decompositions;
    }

    /// Final time reached.
    pub fn t_last(&self) -> Option<f64> {
        self.t.last().copied()
    }

    /// Time series of one state component.
    pub fn component(&self, index: usize) -> Vec<f64> {
        self.y.iter().map(|y| y[index]).collect()
    }
}
