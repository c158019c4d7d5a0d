//! Reverse permutation factor kernels over `[batch, n]` rows.
//!
//! Each half of a row is blended with its own reversal, with an independent weight per
//! half. Reversal is an involution, so the adjoint reuses the same pairing.

use itertools::izip;
use ndarray::{Array2, ArrayView2, Axis};

use crate::{
    scalar::Scalar,
    utils::{fold_rows, map_rows},
};

pub(crate) fn forward<T: Scalar>(p: [T; 2], input: ArrayView2<'_, T>) -> Array2<T> {
    let mut output = Array2::zeros(input.raw_dim());
    map_rows(output.view_mut(), input, |x, y| {
        let half = x.len() / 2;
        let (x0, x1) = x.split_at(Axis(0), half);
        let (y0, y1) = y.split_at(Axis(0), half);

        for (p, x, mut y) in izip!(p, [x0, x1], [y0, y1]) {
            let q = T::one() - p;
            for (y, &a, &b) in izip!(y.iter_mut(), x.iter(), x.iter().rev()) {
                *y = q * a + p * b;
            }
        }
    });
    output
}

/// Returns `([d_p0, d_p1], d_input)`:
///
/// ```text
///     d_p[h]       = Σ (x[h, n/2 - 1 - i] - x[h, i]) · g[h, i]
///     d_x[h, i]    = (1 - p[h]) · g[h, i] + p[h] · g[h, n/2 - 1 - i]
/// ```
pub(crate) fn backward<T: Scalar>(
    grad: ArrayView2<'_, T>,
    p: [T; 2],
    input: ArrayView2<'_, T>,
) -> ([T; 2], Array2<T>) {
    let mut d_input = Array2::zeros(input.raw_dim());
    let d_p = fold_rows(
        d_input.view_mut(),
        grad,
        input,
        || [T::zero(); 2],
        |d_p, g, x, d_x| {
            let half = x.len() / 2;
            let (g0, g1) = g.split_at(Axis(0), half);
            let (x0, x1) = x.split_at(Axis(0), half);
            let (d_x0, d_x1) = d_x.split_at(Axis(0), half);

            for (d_p, p, g, x, mut d_x) in
                izip!(d_p.iter_mut(), p, [g0, g1], [x0, x1], [d_x0, d_x1])
            {
                let q = T::one() - p;
                for (d_x, &g, &g_rev, &x, &x_rev) in
                    izip!(d_x.iter_mut(), g.iter(), g.iter().rev(), x.iter(), x.iter().rev())
                {
                    *d_p += (x_rev - x) * g;
                    *d_x = q * g + p * g_rev;
                }
            }
        },
        |[a0, a1]: [T; 2], [b0, b1]: [T; 2]| [a0 + b0, a1 + b1],
    );
    (d_p, d_input)
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, array};

    use super::*;

    #[test]
    fn test_full_weights_reverse_each_half() {
        let x = array![[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [6.0, 5.0, 4.0, 3.0, 2.0, 1.0]];
        assert_eq!(
            forward([1.0, 1.0], x.view()),
            array![[3.0, 2.0, 1.0, 6.0, 5.0, 4.0], [4.0, 5.0, 6.0, 1.0, 2.0, 3.0]]
        );
    }

    #[test]
    fn test_weights_are_independent_per_half() {
        let x = array![[1.0, 2.0, 3.0, 4.0]];
        assert_eq!(forward([1.0, 0.0], x.view()), array![[2.0, 1.0, 3.0, 4.0]]);
        assert_eq!(forward([0.0, 1.0], x.view()), array![[1.0, 2.0, 4.0, 3.0]]);
        assert_eq!(forward([0.5, 0.25], x.view()), array![[1.5, 1.5, 3.25, 3.75]]);
    }

    #[test]
    fn test_backward_single_row() {
        let x = array![[1.0, 3.0, 10.0, 20.0]];
        let g = array![[1.0, 2.0, 1.0, -1.0]];

        let (d_p, d_x) = backward(g.view(), [0.5, 0.0], x.view());

        // First half: (3 - 1)·1 + (1 - 3)·2 = -2. Second half: (20 - 10)·1 + (10 - 20)·(-1) = 20.
        assert_eq!(d_p, [-2.0, 20.0]);
        assert_eq!(d_x, array![[1.5, 1.5, 1.0, -1.0]]);
    }

    #[test]
    fn test_backward_sums_over_batch() {
        let x_row = Array::from_shape_fn((1, 10), |(_, j)| (3 * j % 7) as f64);
        let g_row = Array::from_shape_fn((1, 10), |(_, j)| 2.0 - j as f64);
        let (d_p_single, d_x_single) = backward(g_row.view(), [0.5, -1.0], x_row.view());

        let batch = 6;
        let x = x_row.broadcast((batch, 10)).unwrap().to_owned();
        let g = g_row.broadcast((batch, 10)).unwrap().to_owned();
        let (d_p, d_x) = backward(g.view(), [0.5, -1.0], x.view());

        assert_eq!(d_p, d_p_single.map(|v| v * batch as f64));
        for row in d_x.outer_iter() {
            assert_eq!(row, d_x_single.row(0));
        }
    }
}
