//! Finite-difference validation of the backward passes.
//!
//! For an upstream gradient `G`, every backward pass computes the gradient of the scalar
//! objective `L(x) = <G, f(x)>`. This module estimates the same gradient by central
//! differences, one element at a time, and reports the worst disagreement.

use ndarray::{ArrayD, ArrayView1, ArrayView2, ArrayViewD, Dimension};
use serde::Serialize;
use tracing::instrument;

use crate::{
    butterfly::{butterfly_factor_multiply, butterfly_factor_multiply_backward},
    errors::{FactorError, FactorResult},
    permutation::{
        permutation_factor_even_odd_multiply, permutation_factor_even_odd_multiply_backward,
        permutation_factor_reverse_multiply, permutation_factor_reverse_multiply_backward,
    },
    scalar::Scalar,
};

/// Worst disagreement between an analytic gradient and its finite-difference estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GradCheckReport {
    pub max_abs_error: f64,
    pub max_rel_error: f64,
    pub num_checked: usize,
}

impl GradCheckReport {
    /// Whether the gradient agrees to `tol`, either absolutely or relatively.
    #[must_use]
    pub fn passes(&self, tol: f64) -> bool {
        self.max_abs_error <= tol || self.max_rel_error <= tol
    }

    fn record(&mut self, analytic: f64, numeric: f64) {
        let abs = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs());
        let rel = if scale > 0.0 { abs / scale } else { 0.0 };
        self.max_abs_error = self.max_abs_error.max(abs);
        self.max_rel_error = self.max_rel_error.max(rel);
        self.num_checked += 1;
    }
}

/// Reports for the parameter and the input gradient of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FactorGradCheck {
    pub parameters: GradCheckReport,
    pub input: GradCheckReport,
}

impl FactorGradCheck {
    #[must_use]
    pub fn passes(&self, tol: f64) -> bool {
        self.parameters.passes(tol) && self.input.passes(tol)
    }
}

#[inline]
fn to_f64<T: Scalar>(value: T) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// `<G, y>` accumulated in double precision.
fn objective<T: Scalar>(grad: &ArrayViewD<'_, T>, output: &ArrayD<T>) -> FactorResult<f64> {
    if grad.shape() != output.shape() {
        return Err(FactorError::InvalidShape {
            op: "check_gradient",
            what: "grad",
            expected: output.shape().to_vec(),
            found: grad.shape().to_vec(),
        });
    }
    Ok(grad
        .iter()
        .zip(output.iter())
        .map(|(&g, &y)| to_f64(g) * to_f64(y))
        .sum())
}

/// Compare `analytic`, the claimed gradient of `<grad, forward(x)>` with respect to `x`,
/// against central differences with step `eps`.
///
/// # Errors
/// [`FactorError::InvalidShape`] if `analytic` does not have the shape of `x` or `grad`
/// does not have the shape of the forward output. Errors of `forward` are propagated.
pub fn check_gradient<T, F>(
    x: ArrayViewD<'_, T>,
    analytic: ArrayViewD<'_, T>,
    grad: ArrayViewD<'_, T>,
    eps: f64,
    forward: F,
) -> FactorResult<GradCheckReport>
where
    T: Scalar,
    F: Fn(ArrayViewD<'_, T>) -> FactorResult<ArrayD<T>>,
{
    if analytic.shape() != x.shape() {
        return Err(FactorError::InvalidShape {
            op: "check_gradient",
            what: "analytic gradient",
            expected: x.shape().to_vec(),
            found: analytic.shape().to_vec(),
        });
    }

    let step = T::from_f64(eps);
    let mut probe = x.to_owned();
    let mut report = GradCheckReport::default();

    for ((index, &value), &expected) in x.indexed_iter().zip(analytic.iter()) {
        let index = index.slice();

        probe[index] = value + step;
        let upper = objective(&grad, &forward(probe.view())?)?;
        let hi = probe[index];

        probe[index] = value - step;
        let lower = objective(&grad, &forward(probe.view())?)?;
        let lo = probe[index];

        probe[index] = value;
        report.record(to_f64(expected), (upper - lower) / (to_f64(hi) - to_f64(lo)));
    }
    Ok(report)
}

/// Check both gradients of the butterfly factor multiply (real or complex).
///
/// # Errors
/// Propagates shape and rank errors of the butterfly operations.
#[instrument(skip_all, fields(shape = ?input.shape()))]
pub fn check_butterfly<T: Scalar>(
    grad: ArrayViewD<'_, T>,
    coefficients: ArrayViewD<'_, T>,
    input: ArrayViewD<'_, T>,
    eps: f64,
) -> FactorResult<FactorGradCheck> {
    let (d_coefficients, d_input) =
        butterfly_factor_multiply_backward(grad.view(), coefficients.view(), input.view())?;

    let parameters = check_gradient(
        coefficients.view(),
        d_coefficients.view(),
        grad.view(),
        eps,
        |c| butterfly_factor_multiply(c, input.view()),
    )?;
    let input = check_gradient(input.view(), d_input.view(), grad.view(), eps, |x| {
        butterfly_factor_multiply(coefficients.view(), x)
    })?;
    Ok(FactorGradCheck { parameters, input })
}

/// Check both gradients of the even/odd permutation factor.
///
/// # Errors
/// Propagates shape errors of the permutation operations.
#[instrument(skip_all, fields(batch = input.nrows(), n = input.ncols()))]
pub fn check_even_odd<T: Scalar>(
    grad: ArrayView2<'_, T>,
    p: ArrayView1<'_, T>,
    input: ArrayView2<'_, T>,
    eps: f64,
) -> FactorResult<FactorGradCheck> {
    let (d_p, d_input) = permutation_factor_even_odd_multiply_backward(grad, p, input)?;

    let parameters = check_gradient(
        p.into_dyn(),
        d_p.view().into_dyn(),
        grad.into_dyn(),
        eps,
        |p| Ok(permutation_factor_even_odd_multiply(p.into_dimensionality()?, input)?.into_dyn()),
    )?;
    let input = check_gradient(
        input.into_dyn(),
        d_input.view().into_dyn(),
        grad.into_dyn(),
        eps,
        |x| Ok(permutation_factor_even_odd_multiply(p, x.into_dimensionality()?)?.into_dyn()),
    )?;
    Ok(FactorGradCheck { parameters, input })
}

/// Check both gradients of the reverse permutation factor.
///
/// # Errors
/// Propagates shape errors of the permutation operations.
#[instrument(skip_all, fields(batch = input.nrows(), n = input.ncols()))]
pub fn check_reverse<T: Scalar>(
    grad: ArrayView2<'_, T>,
    p: ArrayView1<'_, T>,
    input: ArrayView2<'_, T>,
    eps: f64,
) -> FactorResult<FactorGradCheck> {
    let (d_p, d_input) = permutation_factor_reverse_multiply_backward(grad, p, input)?;

    let parameters = check_gradient(
        p.into_dyn(),
        d_p.view().into_dyn(),
        grad.into_dyn(),
        eps,
        |p| Ok(permutation_factor_reverse_multiply(p.into_dimensionality()?, input)?.into_dyn()),
    )?;
    let input = check_gradient(
        input.into_dyn(),
        d_input.view().into_dyn(),
        grad.into_dyn(),
        eps,
        |x| Ok(permutation_factor_reverse_multiply(p, x.into_dimensionality()?)?.into_dyn()),
    )?;
    Ok(FactorGradCheck { parameters, input })
}
