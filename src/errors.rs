//! Error types for the factor multiply kernels.
//!
//! Every error is a contract violation detected before any output is written.

use ndarray::ShapeError;
use thiserror::Error;

use crate::scalar::DType;

/// Top-level error type for all factor operations.
#[derive(Error, Debug, Clone)]
pub enum FactorError {
    /// Butterfly input has a rank the operation does not handle.
    #[error("{op} requires input dimension {expected}, got {rank}")]
    InvalidRank {
        op: &'static str,
        expected: &'static str,
        rank: usize,
    },

    /// Shapes of the arguments do not agree with each other.
    #[error("{op}: expected {what} of shape {expected:?}, got {found:?}")]
    InvalidShape {
        op: &'static str,
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A permutation factor received a row of odd length.
    #[error("{op} requires an even row length, got {n}")]
    OddLength { op: &'static str, n: usize },

    /// The element type is outside the supported floating set.
    #[error("{op} is not implemented for element type {dtype}")]
    UnsupportedPrecision { op: &'static str, dtype: DType },

    /// Two arguments of one call carry different floating precisions.
    #[error("{op}: expected element type {expected}, got {found}")]
    DTypeMismatch {
        op: &'static str,
        expected: DType,
        found: DType,
    },

    /// Conversion between array dimensionalities failed.
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Shorthand result type used throughout the crate.
pub type FactorResult<T> = Result<T, FactorError>;
