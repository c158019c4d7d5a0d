//! Permutation factors: a learnable blend between each input row and a fixed
//! permutation of it.
//!
//! Inputs are `[batch, n]` with `n` even. The mixing weights are shared by every row,
//! so their gradients are sums over the whole batch. Weights are used as given: values
//! outside `[0, 1]` extrapolate the blend.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::instrument;

use crate::{
    errors::{FactorError, FactorResult},
    scalar::Scalar,
};

mod even_odd;
mod reverse;

/// Check the weight length, the row parity and, for backward calls, the gradient shape.
fn check_args<T>(
    op: &'static str,
    weights: usize,
    p: &ArrayView1<'_, T>,
    input: &ArrayView2<'_, T>,
    grad: Option<&ArrayView2<'_, T>>,
) -> FactorResult<()> {
    if p.len() != weights {
        return Err(FactorError::InvalidShape {
            op,
            what: "p",
            expected: vec![weights],
            found: p.shape().to_vec(),
        });
    }
    let n = input.ncols();
    if n % 2 != 0 {
        return Err(FactorError::OddLength { op, n });
    }
    match grad {
        Some(grad) if grad.shape() != input.shape() => Err(FactorError::InvalidShape {
            op,
            what: "grad",
            expected: input.shape().to_vec(),
            found: grad.shape().to_vec(),
        }),
        _ => Ok(()),
    }
}

/// Even/odd permutation factor.
///
/// With `half = n / 2`, each row is folded into two halves and blended with its
/// even/odd deinterleaved counterpart:
///
/// ```text
///     output[b, k·half + i] = (1 - p) · input[b, k·half + i] + p · input[b, 2i + k]
/// ```
///
/// `p` has shape `(1,)`.
///
/// # Errors
/// - [`FactorError::InvalidShape`] if `p` does not hold exactly one weight.
/// - [`FactorError::OddLength`] if `n` is odd.
#[instrument(skip_all, fields(batch = input.nrows(), n = input.ncols()), level = "debug")]
pub fn permutation_factor_even_odd_multiply<T: Scalar>(
    p: ArrayView1<'_, T>,
    input: ArrayView2<'_, T>,
) -> FactorResult<Array2<T>> {
    check_args("permutation_factor_even_odd_multiply", 1, &p, &input, None)?;
    Ok(even_odd::forward(p[0], input))
}

/// Backward pass of [`permutation_factor_even_odd_multiply`], returning `(d_p, d_input)`
/// with `d_p` of shape `(1,)`.
///
/// # Errors
/// Same as the forward pass, plus [`FactorError::InvalidShape`] if `grad` does not have
/// the shape of the input.
#[instrument(skip_all, fields(batch = input.nrows(), n = input.ncols()), level = "debug")]
pub fn permutation_factor_even_odd_multiply_backward<T: Scalar>(
    grad: ArrayView2<'_, T>,
    p: ArrayView1<'_, T>,
    input: ArrayView2<'_, T>,
) -> FactorResult<(Array1<T>, Array2<T>)> {
    check_args(
        "permutation_factor_even_odd_multiply_backward",
        1,
        &p,
        &input,
        Some(&grad),
    )?;
    let (d_p, d_input) = even_odd::backward(grad, p[0], input);
    Ok((Array1::from_elem(1, d_p), d_input))
}

/// Reverse permutation factor.
///
/// Each half `h` of a row is blended with its own reversal using the weight `p[h]`:
///
/// ```text
///     output[b, h, i] = (1 - p[h]) · input[b, h, i] + p[h] · input[b, h, half - 1 - i]
/// ```
///
/// in the folded `[batch, 2, half]` view. `p` has shape `(2,)`.
///
/// # Errors
/// - [`FactorError::InvalidShape`] if `p` does not hold exactly two weights.
/// - [`FactorError::OddLength`] if `n` is odd.
#[instrument(skip_all, fields(batch = input.nrows(), n = input.ncols()), level = "debug")]
pub fn permutation_factor_reverse_multiply<T: Scalar>(
    p: ArrayView1<'_, T>,
    input: ArrayView2<'_, T>,
) -> FactorResult<Array2<T>> {
    check_args("permutation_factor_reverse_multiply", 2, &p, &input, None)?;
    Ok(reverse::forward([p[0], p[1]], input))
}

/// Backward pass of [`permutation_factor_reverse_multiply`], returning `(d_p, d_input)`
/// with `d_p` of shape `(2,)`.
///
/// # Errors
/// Same as the forward pass, plus [`FactorError::InvalidShape`] if `grad` does not have
/// the shape of the input.
#[instrument(skip_all, fields(batch = input.nrows(), n = input.ncols()), level = "debug")]
pub fn permutation_factor_reverse_multiply_backward<T: Scalar>(
    grad: ArrayView2<'_, T>,
    p: ArrayView1<'_, T>,
    input: ArrayView2<'_, T>,
) -> FactorResult<(Array1<T>, Array2<T>)> {
    check_args(
        "permutation_factor_reverse_multiply_backward",
        2,
        &p,
        &input,
        Some(&grad),
    )?;
    let (d_p, d_input) = reverse::backward(grad, [p[0], p[1]], input);
    Ok((Array1::from(d_p.to_vec()), d_input))
}
