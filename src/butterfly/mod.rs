//! Butterfly factor multiply: a per-position 2×2 matrix applied to the two rows of every
//! batch entry.
//!
//! Real data is laid out as `[batch, 2, n]` with coefficients `[2, 2, n]`. Complex data
//! appends a trailing axis of length 2 holding `(re, im)`: `[batch, 2, n, 2]` and
//! `[2, 2, n, 2]`. The rank of the input selects between the two.

use ndarray::{ArrayD, ArrayViewD};
use tracing::instrument;

use crate::{
    errors::{FactorError, FactorResult},
    scalar::Scalar,
};

pub(crate) mod complex;
pub mod fast;
pub(crate) mod real;

/// Element layout of a butterfly call, selected by the input rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `[batch, 2, n]`.
    Real,
    /// `[batch, 2, n, 2]`.
    Complex,
}

/// Validate the shapes of a butterfly call and return its layout.
///
/// The input fixes `batch` and `n`; the coefficients must be `[2, 2, n]` (real) or
/// `[2, 2, n, 2]` (complex) to match.
fn check_layout(op: &'static str, coefficients: &[usize], input: &[usize]) -> FactorResult<Layout> {
    let layout = match input.len() {
        3 => Layout::Real,
        4 => Layout::Complex,
        rank => {
            return Err(FactorError::InvalidRank {
                op,
                expected: "3 or 4",
                rank,
            });
        }
    };

    let (batch, n) = (input[0], input[2]);
    let (mut expected_input, mut expected_coefficients) = (vec![batch, 2, n], vec![2, 2, n]);
    if layout == Layout::Complex {
        expected_input.push(2);
        expected_coefficients.push(2);
    }

    if input != expected_input.as_slice() {
        return Err(FactorError::InvalidShape {
            op,
            what: "input",
            expected: expected_input,
            found: input.to_vec(),
        });
    }
    if coefficients != expected_coefficients.as_slice() {
        return Err(FactorError::InvalidShape {
            op,
            what: "coefficients",
            expected: expected_coefficients,
            found: coefficients.to_vec(),
        });
    }
    Ok(layout)
}

/// Forward butterfly factor multiply.
///
/// For every batch index `b`, position `i` and output row `j`:
///
/// ```text
///     output[b, j, i] = coefficients[j, 0, i] · input[b, 0, i]
///                     + coefficients[j, 1, i] · input[b, 1, i]
/// ```
///
/// with real or complex (non-conjugated) products depending on the input rank.
///
/// # Errors
/// - [`FactorError::InvalidRank`] if the input rank is neither 3 nor 4.
/// - [`FactorError::InvalidShape`] if the coefficients do not match the input.
#[instrument(skip_all, fields(shape = ?input.shape()), level = "debug")]
pub fn butterfly_factor_multiply<T: Scalar>(
    coefficients: ArrayViewD<'_, T>,
    input: ArrayViewD<'_, T>,
) -> FactorResult<ArrayD<T>> {
    const OP: &str = "butterfly_factor_multiply";
    Ok(match check_layout(OP, coefficients.shape(), input.shape())? {
        Layout::Real => real::forward(
            coefficients.into_dimensionality()?,
            input.into_dimensionality()?,
        )
        .into_dyn(),
        Layout::Complex => complex::forward(
            coefficients.into_dimensionality()?,
            input.into_dimensionality()?,
        )
        .into_dyn(),
    })
}

/// Backward pass of [`butterfly_factor_multiply`].
///
/// Returns `(d_coefficients, d_input)`. The coefficients are shared by every batch row,
/// so `d_coefficients` is the sum of the per-row contributions. `d_input` uses the
/// transposed coefficients. In the complex case gradients follow the conjugate
/// convention: the input is conjugated in `d_coefficients` and the coefficients are
/// conjugated in `d_input`.
///
/// # Errors
/// Same as the forward pass, plus [`FactorError::InvalidShape`] if `grad` does not have
/// the shape of the input.
#[instrument(skip_all, fields(shape = ?input.shape()), level = "debug")]
pub fn butterfly_factor_multiply_backward<T: Scalar>(
    grad: ArrayViewD<'_, T>,
    coefficients: ArrayViewD<'_, T>,
    input: ArrayViewD<'_, T>,
) -> FactorResult<(ArrayD<T>, ArrayD<T>)> {
    const OP: &str = "butterfly_factor_multiply_backward";
    let layout = check_layout(OP, coefficients.shape(), input.shape())?;
    if grad.shape() != input.shape() {
        return Err(FactorError::InvalidShape {
            op: OP,
            what: "grad",
            expected: input.shape().to_vec(),
            found: grad.shape().to_vec(),
        });
    }

    Ok(match layout {
        Layout::Real => {
            let (d_c, d_x) = real::backward(
                grad.into_dimensionality()?,
                coefficients.into_dimensionality()?,
                input.into_dimensionality()?,
            );
            (d_c.into_dyn(), d_x.into_dyn())
        }
        Layout::Complex => {
            let (d_c, d_x) = complex::backward(
                grad.into_dimensionality()?,
                coefficients.into_dimensionality()?,
                input.into_dimensionality()?,
            );
            (d_c.into_dyn(), d_x.into_dyn())
        }
    })
}

/// Real forward butterfly through the vectorized kernel.
///
/// Single precision inputs whose length `n` is a multiple of [`fast::LANES`] run the
/// 8-lane kernel; everything else (including every `f64` input) runs the scalar kernel
/// and produces the same values. There is no dedicated backward: use
/// [`butterfly_factor_multiply_backward`].
///
/// # Errors
/// - [`FactorError::InvalidRank`] unless the input has rank 3.
/// - [`FactorError::InvalidShape`] if the coefficients do not match the input.
#[instrument(skip_all, fields(shape = ?input.shape(), dtype = %T::DTYPE), level = "debug")]
pub fn butterfly_factor_multiply_fast<T: Scalar>(
    coefficients: ArrayViewD<'_, T>,
    input: ArrayViewD<'_, T>,
) -> FactorResult<ArrayD<T>> {
    const OP: &str = "butterfly_factor_multiply_fast";
    if input.ndim() != 3 {
        return Err(FactorError::InvalidRank {
            op: OP,
            expected: "3",
            rank: input.ndim(),
        });
    }
    check_layout(OP, coefficients.shape(), input.shape())?;
    let output = T::butterfly_fast(
        coefficients.into_dimensionality()?,
        input.into_dimensionality()?,
    );
    Ok(output.into_dyn())
}
