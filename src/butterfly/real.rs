//! Real-valued butterfly kernels over `[batch, 2, n]` arrays.

use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut2};

use crate::{
    scalar::Scalar,
    utils::{fold_rows, map_rows},
};

/// Apply the per-position 2×2 coefficients to every batch row.
///
/// ```text
///     y[b, j, i] = c[j, 0, i] · x[b, 0, i] + c[j, 1, i] · x[b, 1, i]
/// ```
pub(crate) fn forward<T: Scalar>(
    coefficients: ArrayView3<'_, T>,
    input: ArrayView3<'_, T>,
) -> Array3<T> {
    let mut output = Array3::zeros(input.raw_dim());
    map_rows(output.view_mut(), input, |x, y| {
        forward_row(&coefficients, x, y);
    });
    output
}

/// Single batch row of [`forward`]; `x` and `y` are `[2, n]`.
#[inline]
pub(crate) fn forward_row<T: Scalar>(
    c: &ArrayView3<'_, T>,
    x: ArrayView2<'_, T>,
    mut y: ArrayViewMut2<'_, T>,
) {
    for i in 0..x.ncols() {
        let (x0, x1) = (x[[0, i]], x[[1, i]]);
        for j in 0..2 {
            y[[j, i]] = c[[j, 0, i]] * x0 + c[[j, 1, i]] * x1;
        }
    }
}

/// Gradients of [`forward`] with respect to the coefficients and the input.
///
/// The coefficient gradient is summed over the batch:
///
/// ```text
///     dc[j, k, i] = Σ_b g[b, j, i] · x[b, k, i]
///     dx[b, j, i] = c[0, j, i] · g[b, 0, i] + c[1, j, i] · g[b, 1, i]
/// ```
///
/// Note the transposed coefficient index in `dx`: it is the adjoint of the forward map.
pub(crate) fn backward<T: Scalar>(
    grad: ArrayView3<'_, T>,
    coefficients: ArrayView3<'_, T>,
    input: ArrayView3<'_, T>,
) -> (Array3<T>, Array3<T>) {
    let mut d_input = Array3::zeros(input.raw_dim());
    let d_coefficients = fold_rows(
        d_input.view_mut(),
        grad,
        input,
        || Array3::<T>::zeros(coefficients.raw_dim()),
        |d_c, g, x, mut d_x| {
            for i in 0..x.ncols() {
                let (x0, x1) = (x[[0, i]], x[[1, i]]);
                let (g0, g1) = (g[[0, i]], g[[1, i]]);
                for j in 0..2 {
                    let g_j = g[[j, i]];
                    d_c[[j, 0, i]] += g_j * x0;
                    d_c[[j, 1, i]] += g_j * x1;
                    d_x[[j, i]] = coefficients[[0, j, i]] * g0 + coefficients[[1, j, i]] * g1;
                }
            }
        },
        |mut a, b| {
            a += &b;
            a
        },
    );
    (d_coefficients, d_input)
}
