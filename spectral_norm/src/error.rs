//! Construction-time errors.
//!
//! Every layer constructor validates its inputs up front and returns one of
//! these. Nothing here is raised during a forward pass: numerical edge cases
//! are absorbed by `eps`, and shape mismatches between an input and a weight
//! are left to burn's own kernels.

use std::fmt;

use burn::tensor::TensorData;

/// Invalid layer or estimator configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum SpectralNormError {
    /// A tensor handed to a constructor has the wrong number of dimensions.
    InvalidRank {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A tensor has the right rank but an incompatible extent.
    ShapeMismatch {
        tensor: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// A count (iterations, stride, dilation, dimension) must be positive.
    InvalidCount {
        field: &'static str,
        value: usize,
    },
    /// `eps` must be finite and strictly positive.
    InvalidEpsilon {
        value: f64,
    },
}

impl fmt::Display for SpectralNormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpectralNormError::InvalidRank { tensor, expected, actual } => {
                write!(f, "{} must have rank {}, got rank {}", tensor, expected, actual)
            }
            SpectralNormError::ShapeMismatch { tensor, expected, actual } => {
                write!(f, "{} must have shape {:?}, got {:?}", tensor, expected, actual)
            }
            SpectralNormError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            SpectralNormError::InvalidEpsilon { value } => {
                write!(f, "eps must be finite and > 0, got {}", value)
            }
        }
    }
}

impl std::error::Error for SpectralNormError {}

/// Check the rank of dynamically shaped data before it becomes a typed tensor.
pub(crate) fn check_rank(
    tensor: &'static str,
    data: &TensorData,
    expected: usize,
) -> Result<(), SpectralNormError> {
    let actual = data.shape.len();
    if actual != expected {
        return Err(SpectralNormError::InvalidRank { tensor, expected, actual });
    }
    Ok(())
}

/// Reject zero-sized extents, which would leave a singular vector empty.
pub(crate) fn check_dims(tensor: &'static str, dims: &[usize]) -> Result<(), SpectralNormError> {
    match dims.iter().find(|&&d| d == 0) {
        Some(&value) => Err(SpectralNormError::InvalidCount { field: tensor, value }),
        None => Ok(()),
    }
}

/// Bias must be one entry per output unit.
pub(crate) fn check_bias_len(bias_len: usize, out_dim: usize) -> Result<(), SpectralNormError> {
    if bias_len != out_dim {
        return Err(SpectralNormError::ShapeMismatch {
            tensor: "bias",
            expected: vec![out_dim],
            actual: vec![bias_len],
        });
    }
    Ok(())
}
