pub mod butterfly;
pub mod errors;
pub mod gradcheck;
pub mod permutation;
pub mod scalar;
pub mod tensor;
pub mod utils;

pub use butterfly::{
    butterfly_factor_multiply, butterfly_factor_multiply_backward, butterfly_factor_multiply_fast,
};
pub use errors::{FactorError, FactorResult};
pub use permutation::{
    permutation_factor_even_odd_multiply, permutation_factor_even_odd_multiply_backward,
    permutation_factor_reverse_multiply, permutation_factor_reverse_multiply_backward,
};
pub use scalar::{DType, Scalar};
pub use tensor::Tensor;
