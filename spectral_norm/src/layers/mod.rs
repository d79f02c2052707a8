//! Spectrally normalized layers.
//!
//! Every layer owns its weight, its bias and one [`SpectralNorm`](crate::estimator::SpectralNorm).
//! They differ only in how the weight is viewed as an `[out, in_flat]` matrix
//! and in the linear operation applied after normalization.
//!
//! | Layer | Weight | Matrix view |
//! |---|---|---|
//! | [`SpectralNormDense`] | `[in, out]` | transpose |
//! | [`SpectralNormLinear`] | `[out, in]` | identity |
//! | [`SpectralNormConv1d`] | `[k, c_in, c_out]` | reshape, transpose |
//! | [`SpectralNormConv2d`] | `[kh, kw, c_in, c_out]` | reshape, transpose |

pub mod conv1d;
pub mod conv2d;
pub mod dense;
pub mod linear;
pub mod padding;


pub use conv1d::{SpectralNormConv1d, SpectralNormConv1dConfig};
pub use conv2d::{SpectralNormConv2d, SpectralNormConv2dConfig};
pub use dense::{SpectralNormDense, SpectralNormDenseConfig};
pub use linear::{SpectralNormLinear, SpectralNormLinearConfig};
pub use padding::Padding;

use burn::prelude::*;
use burn::tensor::Distribution;

/// Glorot (Xavier) normal initialization.
pub(crate) fn glorot_normal<B: Backend, const D: usize>(
    shape: [usize; D],
    fan_in: usize,
    fan_out: usize,
    device: &B::Device,
) -> Tensor<B, D> {
    let std = (2.0 / (fan_in + fan_out) as f64).sqrt();
    Tensor::random(shape, Distribution::Normal(0.0, std), device)
}
