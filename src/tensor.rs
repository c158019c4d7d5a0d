//! Type-erased host tensors and element-type dispatch.
//!
//! Callers that hold arrays of a runtime-determined element type wrap them in [`Tensor`]
//! and call the functions of this module, which select the `f32` or `f64` kernel from
//! the element type of the input.

use ndarray::{Array, ArrayD, ArrayView, ArrayViewD, Dimension, Ix1, Ix2};

use crate::{
    butterfly,
    errors::{FactorError, FactorResult},
    permutation,
    scalar::{DType, Scalar},
};

/// Host array of any supported element type.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
}

impl Tensor {
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::F32(a) => a.shape(),
            Self::F64(a) => a.shape(),
            Self::I32(a) => a.shape(),
            Self::I64(a) => a.shape(),
        }
    }
}

macro_rules! impl_from_array {
    ($($elem:ty => $variant:ident),* $(,)?) => {
        $(
            impl<D: Dimension> From<Array<$elem, D>> for Tensor {
                fn from(array: Array<$elem, D>) -> Self {
                    Self::$variant(array.into_dyn())
                }
            }
        )*
    };
}

impl_from_array!(f32 => F32, f64 => F64, i32 => I32, i64 => I64);

/// Floating element types that can be borrowed out of a [`Tensor`].
pub trait TensorElement: Scalar {
    fn as_view(tensor: &Tensor) -> Option<ArrayViewD<'_, Self>>;
}

impl TensorElement for f32 {
    fn as_view(tensor: &Tensor) -> Option<ArrayViewD<'_, Self>> {
        match tensor {
            Tensor::F32(a) => Some(a.view()),
            _ => None,
        }
    }
}

impl TensorElement for f64 {
    fn as_view(tensor: &Tensor) -> Option<ArrayViewD<'_, Self>> {
        match tensor {
            Tensor::F64(a) => Some(a.view()),
            _ => None,
        }
    }
}

/// Run `$body` with `$t` bound to the element type of `$lead`.
macro_rules! dispatch_floating {
    ($op:expr, $lead:expr, |$t:ident| $body:block) => {
        match $lead.dtype() {
            DType::F32 => {
                type $t = f32;
                $body
            }
            DType::F64 => {
                type $t = f64;
                $body
            }
            dtype => Err(FactorError::UnsupportedPrecision { op: $op, dtype }),
        }
    };
}

/// Borrow `tensor` as an array of `T`.
fn view<'a, T: TensorElement>(
    op: &'static str,
    tensor: &'a Tensor,
) -> FactorResult<ArrayViewD<'a, T>> {
    let dtype = tensor.dtype();
    if !dtype.is_floating() {
        return Err(FactorError::UnsupportedPrecision { op, dtype });
    }
    T::as_view(tensor).ok_or(FactorError::DTypeMismatch {
        op,
        expected: T::DTYPE,
        found: dtype,
    })
}

/// Borrow `tensor` as an array of `T` with the fixed rank of `D`.
fn fixed_view<'a, T: TensorElement, D: Dimension>(
    op: &'static str,
    tensor: &'a Tensor,
    expected: &'static str,
) -> FactorResult<ArrayView<'a, T, D>> {
    let array = view::<T>(op, tensor)?;
    if D::NDIM.is_some_and(|rank| rank != array.ndim()) {
        return Err(FactorError::InvalidRank {
            op,
            expected,
            rank: array.ndim(),
        });
    }
    Ok(array.into_dimensionality()?)
}

/// See [`butterfly::butterfly_factor_multiply`].
pub fn butterfly_factor_multiply(coefficients: &Tensor, input: &Tensor) -> FactorResult<Tensor> {
    const OP: &str = "butterfly_factor_multiply";
    dispatch_floating!(OP, input, |T| {
        let output = butterfly::butterfly_factor_multiply::<T>(
            view(OP, coefficients)?,
            view(OP, input)?,
        )?;
        Ok(output.into())
    })
}

/// See [`butterfly::butterfly_factor_multiply_backward`].
pub fn butterfly_factor_multiply_backward(
    grad: &Tensor,
    coefficients: &Tensor,
    input: &Tensor,
) -> FactorResult<(Tensor, Tensor)> {
    const OP: &str = "butterfly_factor_multiply_backward";
    dispatch_floating!(OP, input, |T| {
        let (d_coefficients, d_input) = butterfly::butterfly_factor_multiply_backward::<T>(
            view(OP, grad)?,
            view(OP, coefficients)?,
            view(OP, input)?,
        )?;
        Ok((d_coefficients.into(), d_input.into()))
    })
}

/// See [`butterfly::butterfly_factor_multiply_fast`].
pub fn butterfly_factor_multiply_fast(
    coefficients: &Tensor,
    input: &Tensor,
) -> FactorResult<Tensor> {
    const OP: &str = "butterfly_factor_multiply_fast";
    dispatch_floating!(OP, input, |T| {
        let output = butterfly::butterfly_factor_multiply_fast::<T>(
            view(OP, coefficients)?,
            view(OP, input)?,
        )?;
        Ok(output.into())
    })
}

/// See [`permutation::permutation_factor_even_odd_multiply`].
pub fn permutation_factor_even_odd_multiply(p: &Tensor, input: &Tensor) -> FactorResult<Tensor> {
    const OP: &str = "permutation_factor_even_odd_multiply";
    dispatch_floating!(OP, input, |T| {
        let output = permutation::permutation_factor_even_odd_multiply::<T>(
            fixed_view::<_, Ix1>(OP, p, "1")?,
            fixed_view::<_, Ix2>(OP, input, "2")?,
        )?;
        Ok(output.into())
    })
}

/// See [`permutation::permutation_factor_even_odd_multiply_backward`].
pub fn permutation_factor_even_odd_multiply_backward(
    grad: &Tensor,
    p: &Tensor,
    input: &Tensor,
) -> FactorResult<(Tensor, Tensor)> {
    const OP: &str = "permutation_factor_even_odd_multiply_backward";
    dispatch_floating!(OP, input, |T| {
        let (d_p, d_input) = permutation::permutation_factor_even_odd_multiply_backward::<T>(
            fixed_view::<_, Ix2>(OP, grad, "2")?,
            fixed_view::<_, Ix1>(OP, p, "1")?,
            fixed_view::<_, Ix2>(OP, input, "2")?,
        )?;
        Ok((d_p.into(), d_input.into()))
    })
}

/// See [`permutation::permutation_factor_reverse_multiply`].
pub fn permutation_factor_reverse_multiply(p: &Tensor, input: &Tensor) -> FactorResult<Tensor> {
    const OP: &str = "permutation_factor_reverse_multiply";
    dispatch_floating!(OP, input, |T| {
        let output = permutation::permutation_factor_reverse_multiply::<T>(
            fixed_view::<_, Ix1>(OP, p, "1")?,
            fixed_view::<_, Ix2>(OP, input, "2")?,
        )?;
        Ok(output.into())
    })
}

/// See [`permutation::permutation_factor_reverse_multiply_backward`].
pub fn permutation_factor_reverse_multiply_backward(
    grad: &Tensor,
    p: &Tensor,
    input: &Tensor,
) -> FactorResult<(Tensor, Tensor)> {
    const OP: &str = "permutation_factor_reverse_multiply_backward";
    dispatch_floating!(OP, input, |T| {
        let (d_p, d_input) = permutation::permutation_factor_reverse_multiply_backward::<T>(
            fixed_view::<_, Ix2>(OP, grad, "2")?,
            fixed_view::<_, Ix1>(OP, p, "1")?,
            fixed_view::<_, Ix2>(OP, input, "2")?,
        )?;
        Ok((d_p.into(), d_input.into()))
    })
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, array};

    use super::*;

    #[test]
    fn test_dtype_and_shape() {
        let t: Tensor = Array::<i64, _>::zeros((3, 4)).into();
        assert_eq!(t.dtype(), DType::I64);
        assert_eq!(t.shape(), &[3, 4]);
    }

    #[test]
    fn test_dispatch_matches_typed_calls() {
        let c = array![[[1.0, 2.0], [0.5, -1.0]], [[0.0, 1.0], [3.0, 0.25]]];
        let x = array![[[1.0, 4.0], [2.0, -2.0]]];

        let typed = butterfly::butterfly_factor_multiply(c.view().into_dyn(), x.view().into_dyn())
            .unwrap();
        let erased = butterfly_factor_multiply(&c.clone().into(), &x.clone().into()).unwrap();
        assert_eq!(erased, Tensor::F64(typed));

        let c32 = c.mapv(|v| v as f32);
        let x32 = x.mapv(|v| v as f32);
        let erased = butterfly_factor_multiply_fast(&c32.into(), &x32.into()).unwrap();
        assert_eq!(erased.dtype(), DType::F32);
    }

    #[test]
    fn test_integer_tensors_are_unsupported() {
        let c: Tensor = Array::<i32, _>::zeros((2, 2, 4)).into();
        let x: Tensor = Array::<i32, _>::zeros((1, 2, 4)).into();
        assert!(matches!(
            butterfly_factor_multiply(&c, &x),
            Err(FactorError::UnsupportedPrecision { dtype: DType::I32, .. })
        ));

        let p: Tensor = array![1i64].into();
        let x: Tensor = Array::<i64, _>::zeros((1, 4)).into();
        assert!(matches!(
            permutation_factor_even_odd_multiply(&p, &x),
            Err(FactorError::UnsupportedPrecision { dtype: DType::I64, .. })
        ));

        // Integer weights next to a floating input.
        let x: Tensor = Array::<f64, _>::zeros((1, 4)).into();
        assert!(matches!(
            permutation_factor_even_odd_multiply(&p, &x),
            Err(FactorError::UnsupportedPrecision { dtype: DType::I64, .. })
        ));
    }

    #[test]
    fn test_mixed_precision_is_rejected() {
        let c: Tensor = Array::<f32, _>::zeros((2, 2, 4)).into();
        let x: Tensor = Array::<f64, _>::zeros((3, 2, 4)).into();
        assert!(matches!(
            butterfly_factor_multiply(&c, &x),
            Err(FactorError::DTypeMismatch {
                expected: DType::F64,
                found: DType::F32,
                ..
            })
        ));

        let g: Tensor = Array::<f32, _>::zeros((3, 2, 4)).into();
        let c: Tensor = Array::<f64, _>::zeros((2, 2, 4)).into();
        assert!(matches!(
            butterfly_factor_multiply_backward(&g, &c, &x),
            Err(FactorError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_permutation_rank_is_checked() {
        let p: Tensor = array![0.5f32, 0.5].into();
        let x: Tensor = Array::<f32, _>::zeros((2, 2, 4)).into();
        assert!(matches!(
            permutation_factor_reverse_multiply(&p, &x),
            Err(FactorError::InvalidRank { expected: "2", rank: 3, .. })
        ));
    }

    #[test]
    fn test_permutation_roundtrip_through_tensors() {
        let x = array![[1.0f32, 2.0, 3.0, 4.0]];
        let p: Tensor = array![1.0f32, 1.0].into();
        let y = permutation_factor_reverse_multiply(&p, &x.clone().into()).unwrap();
        assert_eq!(y, Tensor::from(array![[2.0f32, 1.0, 4.0, 3.0]]));

        let (d_p, d_x) = permutation_factor_reverse_multiply_backward(&y, &p, &x.into()).unwrap();
        assert_eq!(d_p.shape(), &[2]);
        assert_eq!(d_x, Tensor::from(array![[1.0f32, 2.0, 3.0, 4.0]]));

        let p: Tensor = array![0.0f64].into();
        let x: Tensor = array![[1.0, 2.0]].into();
        let (d_p, d_x) = permutation_factor_even_odd_multiply_backward(&x, &p, &x).unwrap();
        assert_eq!(d_p, Tensor::from(array![0.0]));
        assert_eq!(d_x, x);
    }
}
