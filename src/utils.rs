use ndarray::{ArrayD, ArrayView, ArrayViewMut, IxDyn, RemoveAxis};
use rand::Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::scalar::Scalar;

/// Computes the optimal workload size for `T` to fit in L1 cache (32 KB).
///
/// Ensures efficient memory access by dividing the cache size by `T`'s size.
/// The result represents how many elements of `T` can be processed per thread.
pub const fn workload_size<T: Sized>() -> usize {
    const L1_CACHE_SIZE: usize = 1 << 15; // 32 KB
    L1_CACHE_SIZE / size_of::<T>()
}

/// Whether a problem of `len` elements is worth splitting across workers.
#[inline]
const fn is_parallel_workload<T>(len: usize) -> bool {
    cfg!(feature = "parallel") && len > workload_size::<T>()
}

/// Apply `row` to every pair of (input row, output row) along the leading batch axis.
///
/// Rows are independent, so large problems are spread over the rayon pool.
pub(crate) fn map_rows<T, D, F>(
    mut output: ArrayViewMut<'_, T, D>,
    input: ArrayView<'_, T, D>,
    row: F,
) where
    T: Scalar,
    D: RemoveAxis,
    F: Fn(ArrayView<'_, T, D::Smaller>, ArrayViewMut<'_, T, D::Smaller>) + Send + Sync,
{
    debug_assert_eq!(output.shape(), input.shape());

    #[cfg(feature = "parallel")]
    if is_parallel_workload::<T>(output.len()) {
        output
            .outer_iter_mut()
            .into_par_iter()
            .zip(input.outer_iter().into_par_iter())
            .for_each(|(out_row, in_row)| row(in_row, out_row));
        return;
    }

    output
        .outer_iter_mut()
        .zip(input.outer_iter())
        .for_each(|(out_row, in_row)| row(in_row, out_row));
}

/// Backward counterpart of [`map_rows`].
///
/// `row` receives (upstream gradient row, input row, input gradient row) and adds the
/// row's contribution to a parameter gradient accumulator. Each worker folds into its
/// own accumulator built by `identity`; partial accumulators are merged with `merge`.
pub(crate) fn fold_rows<T, D, A, I, F, M>(
    mut d_input: ArrayViewMut<'_, T, D>,
    grad: ArrayView<'_, T, D>,
    input: ArrayView<'_, T, D>,
    identity: I,
    row: F,
    merge: M,
) -> A
where
    T: Scalar,
    D: RemoveAxis,
    A: Send,
    I: Fn() -> A + Send + Sync,
    F: Fn(
            &mut A,
            ArrayView<'_, T, D::Smaller>,
            ArrayView<'_, T, D::Smaller>,
            ArrayViewMut<'_, T, D::Smaller>,
        ) + Send
        + Sync,
    M: Fn(A, A) -> A + Send + Sync,
{
    debug_assert_eq!(d_input.shape(), input.shape());
    debug_assert_eq!(grad.shape(), input.shape());

    #[cfg(feature = "parallel")]
    if is_parallel_workload::<T>(d_input.len()) {
        return d_input
            .outer_iter_mut()
            .into_par_iter()
            .zip(grad.outer_iter().into_par_iter())
            .zip(input.outer_iter().into_par_iter())
            .fold(&identity, |mut acc, ((d_row, g_row), in_row)| {
                row(&mut acc, g_row, in_row, d_row);
                acc
            })
            .reduce(&identity, &merge);
    }

    #[cfg(not(feature = "parallel"))]
    let _ = merge;

    let mut acc = identity();
    d_input
        .outer_iter_mut()
        .zip(grad.outer_iter())
        .zip(input.outer_iter())
        .for_each(|((d_row, g_row), in_row)| row(&mut acc, g_row, in_row, d_row));
    acc
}

/// Sample an array of the given shape with entries uniform in `[-1, 1)`.
pub fn random_array<T: Scalar, R: Rng>(rng: &mut R, shape: &[usize]) -> ArrayD<T> {
    ArrayD::from_shape_simple_fn(IxDyn(shape), || T::from_f64(rng.random_range(-1.0..1.0)))
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn test_workload_size() {
        assert_eq!(workload_size::<f32>(), 8192);
        assert_eq!(workload_size::<f64>(), 4096);
    }

    #[test]
    fn test_map_rows_visits_every_row_once() {
        let input = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let mut output = Array2::<f64>::zeros((3, 2));
        map_rows(output.view_mut(), input.view(), |x, mut y| {
            y.assign(&x);
            y.mapv_inplace(|v| v * 2.0);
        });
        assert_eq!(output, array![[2.0, 4.0], [6.0, 8.0], [10.0, 12.0]]);
    }

    #[test]
    fn test_fold_rows_large_batch_matches_serial_sum() {
        // Large enough to be split across workers when the feature is enabled.
        let batch = 4 * workload_size::<f64>();
        let input = Array2::from_shape_fn((batch, 2), |(b, k)| (b % 7 + k) as f64);
        let grad = Array2::from_elem((batch, 2), 1.0);
        let mut d_input = Array2::<f64>::zeros((batch, 2));

        let total = fold_rows(
            d_input.view_mut(),
            grad.view(),
            input.view(),
            || 0.0,
            |acc, g, x, mut dx| {
                *acc += x.sum();
                dx.assign(&g);
            },
            |a, b| a + b,
        );

        let expected: f64 = input.iter().sum();
        assert_eq!(total, expected);
        assert!(d_input.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_random_array_shape_and_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = random_array::<f32, _>(&mut rng, &[3, 2, 5]);
        assert_eq!(a.shape(), &[3, 2, 5]);
        assert!(a.iter().all(|v| (-1.0..1.0).contains(v)));
    }
}
