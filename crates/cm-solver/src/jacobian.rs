//! Finite-difference Jacobian-vector products.

use crate::error::SolverResult;
use nalgebra::DVector;

/// Approximate `J(x) v` by a forward difference of `f` along `v`.
///
/// `f_x` must be `f(x)`. The increment follows the components `v` touches:
/// for a unit vector `e_j` the state moves by `sqrt(EPSILON) * max(|x_j|, floor)`,
/// so dense Jacobian columns come out scaled per component. The floor keeps
/// the perturbation meaningful for components sitting at zero.
pub fn finite_difference_jvp<F>(
    x: &DVector<f64>,
    f_x: &DVector<f64>,
    v: &DVector<f64>,
    f: F,
    floor: f64,
) -> SolverResult<DVector<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let v_sum: f64 = v.iter().map(|vi| vi.abs()).sum();
    if v_sum == 0.0 {
        return Ok(DVector::zeros(f_x.len()));
    }
    let x_scale = x
        .iter()
        .zip(v.iter())
        .map(|(xi, vi)| xi.abs() * vi.abs())
        .sum::<f64>()
        / v_sum;
    let eps = f64::EPSILON.sqrt() * x_scale.max(floor) / v.amax();

    let x_perturbed = x + v * eps;
    let f_perturbed = f(&x_perturbed)?;
    Ok((f_perturbed - f_x) / eps)
}
