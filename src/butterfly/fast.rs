//! Vectorized single-precision butterfly forward pass.
//!
//! Processes [`LANES`] consecutive positions per iteration directly on raw strided memory.
//! The lane arithmetic is a multiply followed by an add (no fused multiply-add), so every
//! output is bit-identical to the scalar kernel in [`super::real`].

use ndarray::{Array3, ArrayView3};
use tracing::debug;

use super::real;

/// Number of `f32` lanes per vector.
pub const LANES: usize = 8;

/// Byte alignment of one vector of [`LANES`] floats.
pub const VECTOR_ALIGN: usize = LANES * size_of::<f32>();

/// Route a real `[batch, 2, n]` forward pass to the 8-lane kernel when possible.
///
/// The vector kernel runs when:
/// - `n` is a multiple of [`LANES`],
/// - positions are contiguous (stride 1) in the coefficients and the input,
/// - the CPU supports AVX.
///
/// Every other case runs the scalar kernel. When all row base pointers are aligned to
/// [`VECTOR_ALIGN`] aligned loads and stores are used, otherwise unaligned ones.
pub(crate) fn forward_f32(
    coefficients: ArrayView3<'_, f32>,
    input: ArrayView3<'_, f32>,
) -> Array3<f32> {
    let n = input.dim().2;
    if n % LANES != 0 {
        debug!(n, "length not a multiple of the lane count, using scalar kernel");
        return real::forward(coefficients, input);
    }
    if input.is_empty() {
        return Array3::zeros(input.raw_dim());
    }
    if coefficients.strides()[2] != 1 || input.strides()[2] != 1 {
        debug!("positions are not contiguous, using scalar kernel");
        return real::forward(coefficients, input);
    }

    #[cfg(target_arch = "x86_64")]
    if std::arch::is_x86_feature_detected!("avx") {
        return avx::forward(coefficients, input);
    }

    debug!("no vector unit available, using scalar kernel");
    real::forward(coefficients, input)
}

/// Whether `ptr` sits on a vector boundary and every step along the first `outer_axes`
/// strides keeps it there.
fn is_vector_aligned(ptr: *const f32, strides: &[isize], outer_axes: usize) -> bool {
    (ptr as usize) % VECTOR_ALIGN == 0
        && strides[..outer_axes].iter().all(|&s| s % LANES as isize == 0)
}

#[cfg(target_arch = "x86_64")]
mod avx {
    use core::arch::x86_64::{
        __m256, _mm256_add_ps, _mm256_load_ps, _mm256_loadu_ps, _mm256_mul_ps, _mm256_store_ps,
        _mm256_storeu_ps,
    };

    use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut2};
    use tracing::debug;

    use super::{LANES, is_vector_aligned};
    use crate::utils::map_rows;

    pub(super) fn forward(
        coefficients: ArrayView3<'_, f32>,
        input: ArrayView3<'_, f32>,
    ) -> Array3<f32> {
        let mut output = Array3::zeros(input.raw_dim());

        let aligned = is_vector_aligned(coefficients.as_ptr(), coefficients.strides(), 2)
            && is_vector_aligned(input.as_ptr(), input.strides(), 2)
            && is_vector_aligned(output.as_ptr(), output.strides(), 2);
        debug!(aligned, "running avx kernel");

        map_rows(output.view_mut(), input, |x, y| {
            // SAFETY: AVX support was detected by the caller, positions are contiguous and
            // `n` is a multiple of `LANES`. Aligned access is only chosen when every row
            // offset keeps the vector alignment.
            unsafe {
                if aligned {
                    row::<true>(&coefficients, x, y);
                } else {
                    row::<false>(&coefficients, x, y);
                }
            }
        });
        output
    }

    #[inline]
    #[target_feature(enable = "avx")]
    unsafe fn load<const ALIGNED: bool>(ptr: *const f32) -> __m256 {
        unsafe {
            if ALIGNED {
                _mm256_load_ps(ptr)
            } else {
                _mm256_loadu_ps(ptr)
            }
        }
    }

    #[inline]
    #[target_feature(enable = "avx")]
    unsafe fn store<const ALIGNED: bool>(ptr: *mut f32, value: __m256) {
        unsafe {
            if ALIGNED {
                _mm256_store_ps(ptr, value);
            } else {
                _mm256_storeu_ps(ptr, value);
            }
        }
    }

    /// One batch row: `x` and `y` are `[2, n]` with unit position stride.
    #[target_feature(enable = "avx")]
    unsafe fn row<const ALIGNED: bool>(
        coefficients: &ArrayView3<'_, f32>,
        x: ArrayView2<'_, f32>,
        mut y: ArrayViewMut2<'_, f32>,
    ) {
        let n = x.ncols();
        let c_strides = coefficients.strides();
        let x_row_stride = x.strides()[0];
        let y_row_stride = y.strides()[0];

        unsafe {
            let c00 = coefficients.as_ptr();
            let c01 = c00.offset(c_strides[1]);
            let c10 = c00.offset(c_strides[0]);
            let c11 = c10.offset(c_strides[1]);
            let x0 = x.as_ptr();
            let x1 = x0.offset(x_row_stride);
            let y0 = y.as_mut_ptr();
            let y1 = y0.offset(y_row_stride);

            for i in (0..n).step_by(LANES) {
                let coef00 = load::<ALIGNED>(c00.add(i));
                let coef01 = load::<ALIGNED>(c01.add(i));
                let coef10 = load::<ALIGNED>(c10.add(i));
                let coef11 = load::<ALIGNED>(c11.add(i));
                let input0 = load::<ALIGNED>(x0.add(i));
                let input1 = load::<ALIGNED>(x1.add(i));

                let output0 =
                    _mm256_add_ps(_mm256_mul_ps(coef00, input0), _mm256_mul_ps(coef01, input1));
                let output1 =
                    _mm256_add_ps(_mm256_mul_ps(coef10, input0), _mm256_mul_ps(coef11, input1));

                store::<ALIGNED>(y0.add(i), output0);
                store::<ALIGNED>(y1.add(i), output1);
            }
        }
    }
}
