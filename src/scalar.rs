//! Element types accepted by the kernels.

use core::{
    fmt::{Debug, Display},
    ops::{AddAssign, SubAssign},
    str::FromStr,
};

use ndarray::{Array3, ArrayView3};
use num_traits::Float;
use serde::Serialize;

use crate::butterfly::{fast, real};

/// Element type tag of a host array.
///
/// Only the floating types are computed on; the integer tags exist so that
/// dispatch over host tensors can reject them with a precise error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
}

impl DType {
    /// Whether the kernels are implemented for this element type.
    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I32 => "i32",
            Self::I64 => "i64",
        })
    }
}

impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            "i32" => Ok(Self::I32),
            "i64" => Ok(Self::I64),
            _ => Err(format!("Invalid element type: {s}")),
        }
    }
}

/// Floating point element type of every kernel in this crate.
///
/// Formulas are written once against this trait, so `f32` and `f64` share the exact
/// same arithmetic and differ only in precision.
pub trait Scalar:
    Float + AddAssign + SubAssign + Debug + Display + Default + Send + Sync + 'static
{
    /// Tag reported in errors and by the host tensor dispatch.
    const DTYPE: DType;

    /// Lossy conversion used to build fixtures and scalar constants.
    fn from_f64(value: f64) -> Self;

    /// Real butterfly forward pass over `[batch, 2, n]` through the widest kernel
    /// available for this element type.
    ///
    /// The default routes to the scalar kernel.
    fn butterfly_fast(
        coefficients: ArrayView3<'_, Self>,
        input: ArrayView3<'_, Self>,
    ) -> Array3<Self> {
        real::forward(coefficients, input)
    }
}

impl Scalar for f32 {
    const DTYPE: DType = DType::F32;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as Self
    }

    fn butterfly_fast(
        coefficients: ArrayView3<'_, Self>,
        input: ArrayView3<'_, Self>,
    ) -> Array3<Self> {
        fast::forward_f32(coefficients, input)
    }
}

impl Scalar for f64 {
    const DTYPE: DType = DType::F64;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}
