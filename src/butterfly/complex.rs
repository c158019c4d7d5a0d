//! Complex butterfly kernels over `[batch, 2, n, 2]` arrays.
//!
//! The trailing axis holds `(re, im)`. Values are lifted into [`Complex`] so the
//! arithmetic reads as the complex formulas it implements.

use ndarray::{Array4, ArrayView3, ArrayView4, ArrayViewMut3};
use num_complex::Complex;

use crate::{
    scalar::Scalar,
    utils::{fold_rows, map_rows},
};

#[inline]
fn coefficient<T: Scalar>(c: &ArrayView4<'_, T>, j: usize, k: usize, i: usize) -> Complex<T> {
    Complex::new(c[[j, k, i, 0]], c[[j, k, i, 1]])
}

#[inline]
fn element<T: Scalar>(x: &ArrayView3<'_, T>, k: usize, i: usize) -> Complex<T> {
    Complex::new(x[[k, i, 0]], x[[k, i, 1]])
}

#[inline]
fn store<T: Scalar>(y: &mut ArrayViewMut3<'_, T>, j: usize, i: usize, value: Complex<T>) {
    y[[j, i, 0]] = value.re;
    y[[j, i, 1]] = value.im;
}

/// Complex counterpart of the real forward pass, without any conjugation:
///
/// ```text
///     y[b, j, i] = c[j, 0, i] · x[b, 0, i] + c[j, 1, i] · x[b, 1, i]
/// ```
pub(crate) fn forward<T: Scalar>(
    coefficients: ArrayView4<'_, T>,
    input: ArrayView4<'_, T>,
) -> Array4<T> {
    let mut output = Array4::zeros(input.raw_dim());
    map_rows(output.view_mut(), input, |x, mut y| {
        for i in 0..x.len_of(ndarray::Axis(1)) {
            let (x0, x1) = (element(&x, 0, i), element(&x, 1, i));
            for j in 0..2 {
                let value = coefficient(&coefficients, j, 0, i) * x0
                    + coefficient(&coefficients, j, 1, i) * x1;
                store(&mut y, j, i, value);
            }
        }
    });
    output
}

/// Gradients of the complex forward pass.
///
/// Gradients are taken with respect to the conjugate variable, so the input is
/// conjugated in the coefficient gradient and the coefficients are conjugated in the
/// input gradient:
///
/// ```text
///     dc[j, k, i] = Σ_b g[b, j, i] · conj(x[b, k, i])
///     dx[b, j, i] = conj(c[0, j, i]) · g[b, 0, i] + conj(c[1, j, i]) · g[b, 1, i]
/// ```
pub(crate) fn backward<T: Scalar>(
    grad: ArrayView4<'_, T>,
    coefficients: ArrayView4<'_, T>,
    input: ArrayView4<'_, T>,
) -> (Array4<T>, Array4<T>) {
    let mut d_input = Array4::zeros(input.raw_dim());
    let d_coefficients = fold_rows(
        d_input.view_mut(),
        grad,
        input,
        || Array4::<T>::zeros(coefficients.raw_dim()),
        |d_c, g, x, mut d_x| {
            for i in 0..x.len_of(ndarray::Axis(1)) {
                let x_conj = [element(&x, 0, i).conj(), element(&x, 1, i).conj()];
                let (g0, g1) = (element(&g, 0, i), element(&g, 1, i));
                for j in 0..2 {
                    let g_j = element(&g, j, i);
                    for (k, x_k) in x_conj.iter().enumerate() {
                        let contribution = g_j * x_k;
                        d_c[[j, k, i, 0]] += contribution.re;
                        d_c[[j, k, i, 1]] += contribution.im;
                    }
                    let value = coefficient(&coefficients, 0, j, i).conj() * g0
                        + coefficient(&coefficients, 1, j, i).conj() * g1;
                    store(&mut d_x, j, i, value);
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

#[cfg(test)]
mod tests {
    use ndarray::{Array, array};

    use super::*;

    /// Build `[.., 2]` arrays from complex literals.
    fn split<D: ndarray::Dimension>(z: &Array<Complex<f64>, D>) -> ndarray::ArrayD<f64> {
        let mut shape = z.shape().to_vec();
        shape.push(2);
        ndarray::ArrayD::from_shape_vec(
            shape,
            z.iter().flat_map(|v| [v.re, v.im]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_forward_is_complex_matrix_vector_product() {
        let i = Complex::new(0.0, 1.0);
        let one = Complex::new(1.0, 0.0);
        // [[i, 1], [1, -i]] at the only position.
        let c = split(&array![[[i], [one]], [[one], [-i]]]);
        let x = split(&array![[[Complex::new(1.0, 2.0)], [Complex::new(3.0, -1.0)]]]);

        let y = forward(
            c.view().into_dimensionality().unwrap(),
            x.view().into_dimensionality().unwrap(),
        );

        // y0 = i(1 + 2i) + (3 - i) = 1
        // y1 = (1 + 2i) - i(3 - i) = 0 - i
        let expected = split(&array![[[Complex::new(1.0, 0.0)], [Complex::new(0.0, -1.0)]]]);
        assert_eq!(y.into_dyn(), expected);
    }

    #[test]
    fn test_backward_conjugates_input_for_coefficients() {
        let zero = Complex::new(0.0, 0.0);
        let one = Complex::new(1.0, 0.0);
        let c = split(&array![[[one], [zero]], [[zero], [one]]]);
        let x = split(&array![[[Complex::new(2.0, 3.0)], [Complex::new(-1.0, 4.0)]]]);
        let g = split(&array![[[Complex::new(1.0, 1.0)], [Complex::new(0.0, 2.0)]]]);

        let (d_c, d_x) = backward(
            g.view().into_dimensionality().unwrap(),
            c.view().into_dimensionality().unwrap(),
            x.view().into_dimensionality().unwrap(),
        );

        // dc[j, k] = g_j · conj(x_k)
        let g0 = Complex::new(1.0, 1.0);
        let g1 = Complex::new(0.0, 2.0);
        let x0c = Complex::new(2.0, -3.0);
        let x1c = Complex::new(-1.0, -4.0);
        let expected_d_c = split(&array![[[g0 * x0c], [g0 * x1c]], [[g1 * x0c], [g1 * x1c]]]);
        assert_eq!(d_c.into_dyn(), expected_d_c);

        // Identity coefficients pass the gradient through.
        assert_eq!(d_x.into_dyn(), g);
    }

    #[test]
    fn test_backward_conjugates_coefficients_for_input() {
        let zero = Complex::new(0.0, 0.0);
        let c01 = Complex::new(0.5, -2.0);
        let c10 = Complex::new(3.0, 1.0);
        let c = split(&array![[[zero], [c01]], [[c10], [zero]]]);
        let x = split(&array![[[zero], [zero]]]);
        let g0 = Complex::new(1.0, -1.0);
        let g1 = Complex::new(2.0, 0.5);
        let g = split(&array![[[g0], [g1]]]);

        let (_, d_x) = backward(
            g.view().into_dimensionality().unwrap(),
            c.view().into_dimensionality().unwrap(),
            x.view().into_dimensionality().unwrap(),
        );

        // dx0 = conj(c00) g0 + conj(c10) g1, dx1 = conj(c01) g0 + conj(c11) g1
        let expected = split(&array![[[c10.conj() * g1], [c01.conj() * g0]]]);
        assert_eq!(d_x.into_dyn(), expected);
    }

    #[test]
    fn test_backward_matches_spelled_out_formulas() {
        let c = Array::from_shape_fn((2, 2, 3, 2), |(j, k, i, r)| {
            (j as f64 - k as f64) * 0.5 + i as f64 - r as f64 * 1.5
        });
        let x = Array::from_shape_fn((2, 2, 3, 2), |(b, k, i, r)| {
            (b + 1) as f64 * (k as f64 - 0.5) + (i * r) as f64
        });
        let g = Array::from_shape_fn((2, 2, 3, 2), |(b, j, i, r)| {
            (b as f64 - j as f64) + 0.25 * (i + r) as f64
        });

        let (d_c, d_x) = backward(g.view(), c.view(), x.view());

        let mut expected_d_c = Array4::<f64>::zeros((2, 2, 3, 2));
        let mut expected_d_x = Array4::<f64>::zeros((2, 2, 3, 2));
        for b in 0..2 {
            for i in 0..3 {
                for j in 0..2 {
                    for k in 0..2 {
                        expected_d_c[[j, k, i, 0]] += g[[b, j, i, 0]] * x[[b, k, i, 0]]
                            + g[[b, j, i, 1]] * x[[b, k, i, 1]];
                        expected_d_c[[j, k, i, 1]] += -g[[b, j, i, 0]] * x[[b, k, i, 1]]
                            + g[[b, j, i, 1]] * x[[b, k, i, 0]];
                    }
                    expected_d_x[[b, j, i, 0]] = c[[0, j, i, 0]] * g[[b, 0, i, 0]]
                        + c[[0, j, i, 1]] * g[[b, 0, i, 1]]
                        + c[[1, j, i, 0]] * g[[b, 1, i, 0]]
                        + c[[1, j, i, 1]] * g[[b, 1, i, 1]];
                    expected_d_x[[b, j, i, 1]] = c[[0, j, i, 0]] * g[[b, 0, i, 1]]
                        - c[[0, j, i, 1]] * g[[b, 0, i, 0]]
                        + c[[1, j, i, 0]] * g[[b, 1, i, 1]]
                        - c[[1, j, i, 1]] * g[[b, 1, i, 0]];
                }
            }
        }

        for (a, e) in d_c.iter().zip(expected_d_c.iter()) {
            assert!((a - e).abs() < 1e-12, "{a} != {e}");
        }
        for (a, e) in d_x.iter().zip(expected_d_x.iter()) {
            assert!((a - e).abs() < 1e-12, "{a} != {e}");
        }
    }
}
