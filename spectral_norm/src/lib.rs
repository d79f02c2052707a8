//! # Spectral Norm: Lipschitz-bounded layers for Burn
//!
//! Dense, linear and convolution layers whose weight is divided by a running
//! estimate of its largest singular value before every use. The estimate comes
//! from one step of power iteration per training call, so the cost is two
//! matrix-vector products per layer per step.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  SpectralNormDense / Linear / Conv1d / Conv2d                │
//! │    weight ──view──▶ [out, in_flat] matrix                    │
//! │                        │                                     │
//! │                        ▼                                     │
//! │  SpectralNorm ── SpectralEstimator ── SingularVectorState    │
//! │                        │   (u, v refined in Training only)   │
//! │                        ▼                                     │
//! │    weight / σ ──▶ matmul or conv ──▶ + bias ──▶ activation   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spectral_norm::{Activation, Mode, SpectralNormDenseConfig};
//!
//! let mut dense = SpectralNormDenseConfig::new()
//!     .with_activation(Activation::LeakyRelu { negative_slope: 0.2 })
//!     .init_random::<B>(128, 64, &device)?;
//!
//! let y = dense.forward(x, Mode::Training);
//! println!("sigma = {}", dense.sigma());
//! ```

pub mod activation;
pub mod config;
pub mod error;
pub mod estimator;
pub mod layers;
pub mod mode;
pub mod shared;

pub use activation::Activation;
pub use config::{EstimatorConfig, RightVectorInit, DEFAULT_EPS, DEFAULT_N_POWER_ITERATIONS};
pub use error::SpectralNormError;
pub use estimator::{normalize, MatrixView, SingularVectorState, SpectralEstimator, SpectralNorm};
pub use layers::{
    Padding, SpectralNormConv1d, SpectralNormConv1dConfig, SpectralNormConv2d,
    SpectralNormConv2dConfig, SpectralNormDense, SpectralNormDenseConfig, SpectralNormLinear,
    SpectralNormLinearConfig,
};
pub use mode::Mode;
pub use shared::{shared_layer, SharedLayer};
