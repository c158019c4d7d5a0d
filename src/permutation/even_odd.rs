//! Even/odd permutation factor kernels over `[batch, n]` rows.
//!
//! A row is viewed as two folded halves of length `n / 2`. Position `k · n/2 + i` of
//! the folded view is paired with element `2i + k` of the row, so at `p = 1` the factor
//! gathers the even elements into the first half and the odd ones into the second.

use ndarray::{Array2, ArrayView2};

use crate::{
    scalar::Scalar,
    utils::{fold_rows, map_rows},
};

/// Row index read by folded position `(k, i)`.
#[inline]
const fn permuted(half: usize, k: usize, i: usize) -> (usize, usize) {
    (k * half + i, 2 * i + k)
}

pub(crate) fn forward<T: Scalar>(p: T, input: ArrayView2<'_, T>) -> Array2<T> {
    let q = T::one() - p;
    let mut output = Array2::zeros(input.raw_dim());
    map_rows(output.view_mut(), input, |x, mut y| {
        let half = x.len() / 2;
        for k in 0..2 {
            for i in 0..half {
                let (folded, source) = permuted(half, k, i);
                y[folded] = q * x[folded] + p * x[source];
            }
        }
    });
    output
}

/// Returns `(d_p, d_input)`.
///
/// The pairing is a perfect shuffle and not its own inverse for `n > 4`, so `d_input`
/// scatters the gradient back along the inverse mapping:
///
/// ```text
///     d_p           = Σ (x[2i + k] - x[k·n/2 + i]) · g[k·n/2 + i]
///     d_x[2i + k]   = (1 - p) · g[2i + k] + p · g[k·n/2 + i]
/// ```
pub(crate) fn backward<T: Scalar>(
    grad: ArrayView2<'_, T>,
    p: T,
    input: ArrayView2<'_, T>,
) -> (T, Array2<T>) {
    let q = T::one() - p;
    let mut d_input = Array2::zeros(input.raw_dim());
    let d_p = fold_rows(
        d_input.view_mut(),
        grad,
        input,
        || T::zero(),
        |d_p, g, x, mut d_x| {
            let half = x.len() / 2;
            for k in 0..2 {
                for i in 0..half {
                    let (folded, source) = permuted(half, k, i);
                    *d_p += (x[source] - x[folded]) * g[folded];
                    d_x[source] = q * g[source] + p * g[folded];
                }
            }
        },
        |a, b| a + b,
    );
    (d_p, d_input)
}
