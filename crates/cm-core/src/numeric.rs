use crate::CoreError;

/// Floating point type used throughout system
pub type Real = f64;

/// Absolute/relative tolerance pair.
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Index of the first non-finite entry, if any.
pub fn first_non_finite(values: &[Real]) -> Option<usize> {
    values.iter().position(|v| !v.is_finite())
}

/// RMS norm of `values[i] / scale[i]`.
///
/// This is the error measure used by the step-size controller: a value of 1
/// means the vector sits exactly on the mixed absolute/relative tolerance.
pub fn weighted_rms_norm(values: &[Real], scale: &[Real]) -> Real {
    debug_assert_eq!(values.len(), scale.len());
    if values.is_empty() {
        return 0.0;
    }
    let sum_sq: Real = values
        .iter()
        .zip(scale)
        .map(|(v, s)| {
            let r = v / s;
            r * r
        })
        .sum();
    (sum_sq / values.len() as Real).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        };
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn first_non_finite_finds_infinity() {
        assert_eq!(first_non_finite(&[1.0, 2.0]), None);
        assert_eq!(first_non_finite(&[1.0, Real::INFINITY, Real::NAN]), Some(1));
    }

    #[test]
    fn weighted_norm_is_one_on_tolerance_boundary() {
        let scale = [1e-6, 2e-3, 0.5];
        let values = scale;
        assert!((weighted_rms_norm(&values, &scale) - 1.0).abs() < 1e-14);
    }
}
