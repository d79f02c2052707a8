//! Dense layer with a spectrally normalized kernel.
//!
//! The kernel is stored input-major, `[d_input, d_output]`, so the forward pass
//! is `activation(x @ (W / σ) + b)`. The estimator works on `W^T`
//! (`[d_output, d_input]`), which gives `u` one entry per output unit and `v`
//! one entry per input feature.
//!
//! # Usage
//!
//! ```ignore
//! use spectral_norm::{Activation, Mode, SpectralNormDenseConfig};
//!
//! let mut dense = SpectralNormDenseConfig::new()
//!     .with_activation(Activation::Relu)
//!     .init(weight, bias)?;
//!
//! let y = dense.forward(x.clone(), Mode::Training);   // advances u, v
//! let y = dense.infer(x);                             // leaves u, v alone
//! ```

use burn::module::{Ignored, Module, Param};
use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use super::glorot_normal;
use crate::activation::Activation;
use crate::config::{EstimatorConfig, RightVectorInit};
use crate::error::{check_bias_len, check_dims, check_rank, SpectralNormError};
use crate::estimator::SpectralNorm;
use crate::mode::Mode;

/// Configuration for [`SpectralNormDense`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralNormDenseConfig {
    /// Applied after the bias. Default: identity.
    pub activation: Activation,
    /// Power-iteration settings.
    pub estimator: EstimatorConfig,
    /// Initial right singular vector. Default: zeros.
    pub v_init: RightVectorInit,
}

impl Default for SpectralNormDenseConfig {
    fn default() -> Self {
        Self {
            activation: Activation::Identity,
            estimator: EstimatorConfig::default(),
            v_init: RightVectorInit::Zeros,
        }
    }
}

impl SpectralNormDenseConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output activation.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Set number of power iterations.
    pub fn with_n_power_iterations(mut self, n: usize) -> Self {
        self.estimator.n_power_iterations = n;
        self
    }

    /// Set epsilon.
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.estimator.eps = eps;
        self
    }

    /// Set the right singular vector initialization.
    pub fn with_right_vector_init(mut self, v_init: RightVectorInit) -> Self {
        self.v_init = v_init;
        self
    }

    /// Build the layer around an existing kernel `[d_input, d_output]` and bias `[d_output]`.
    pub fn init<B: Backend>(
        &self,
        weight: Tensor<B, 2>,
        bias: Tensor<B, 1>,
    ) -> Result<SpectralNormDense<B>, SpectralNormError> {
        let [d_input, d_output] = weight.dims();
        check_dims("weight", &[d_input, d_output])?;
        check_bias_len(bias.dims()[0], d_output)?;

        let device = weight.device();
        let spectral = SpectralNorm::new(&self.estimator, d_output, d_input, self.v_init, &device)?;

        log::debug!(
            "SpectralNormDense {} -> {} ({:?}, {} sweep(s))",
            d_input,
            d_output,
            self.activation,
            self.estimator.n_power_iterations
        );

        Ok(SpectralNormDense {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(bias),
            spectral,
            activation: Ignored(self.activation),
        })
    }

    /// Build the layer from dynamically shaped data, checking ranks first.
    ///
    /// The kernel must be rank 2 and the bias rank 1.
    pub fn init_from_data<B: Backend>(
        &self,
        weight: TensorData,
        bias: TensorData,
        device: &B::Device,
    ) -> Result<SpectralNormDense<B>, SpectralNormError> {
        check_rank("weight", &weight, 2)?;
        check_rank("bias", &bias, 1)?;
        self.init(Tensor::from_data(weight, device), Tensor::from_data(bias, device))
    }

    /// Build the layer with a Glorot-normal kernel and zero bias.
    pub fn init_random<B: Backend>(
        &self,
        d_input: usize,
        d_output: usize,
        device: &B::Device,
    ) -> Result<SpectralNormDense<B>, SpectralNormError> {
        check_dims("weight", &[d_input, d_output])?;
        let weight = glorot_normal([d_input, d_output], d_input, d_output, device);
        self.init(weight, Tensor::zeros([d_output], device))
    }
}

/// `[d_input, d_output]` kernel viewed as `[d_output, d_input]`.
fn kernel_matrix<B: Backend>(weight: Tensor<B, 2>) -> Tensor<B, 2> {
    weight.transpose()
}

/// Dense layer whose kernel is divided by its estimated spectral norm.
#[derive(Module, Debug)]
pub struct SpectralNormDense<B: Backend> {
    /// Kernel of shape [d_input, d_output]
    pub weight: Param<Tensor<B, 2>>,
    /// Bias of shape [d_output]
    pub bias: Param<Tensor<B, 1>>,
    spectral: SpectralNorm<B>,
    activation: Ignored<Activation>,
}

impl<B: Backend> SpectralNormDense<B> {
    /// Forward pass for `[batch, d_input]` input.
    ///
    /// In [`Mode::Training`] the singular vectors advance before σ is taken.
    ///
    /// # Numerics
    ///
    /// With the default [`RightVectorInit::Zeros`], σ is exactly 0 until the
    /// first [`Mode::Training`] call, so an inference call on a freshly built
    /// layer returns non-finite values. Train once first, or build with
    /// [`RightVectorInit::Normal`].
    pub fn forward(&mut self, input: Tensor<B, 2>, mode: Mode) -> Tensor<B, 2> {
        let weight = self.spectral.normalize_weight(self.weight.val(), kernel_matrix, mode);
        self.project(input, weight)
    }

    /// Inference forward pass; never mutates the layer.
    ///
    /// # Numerics
    ///
    /// Shares the σ = 0 caveat of [`forward`](Self::forward): a layer built
    /// with zero `v` and never trained yields non-finite output.
    pub fn infer(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.project(input, self.normalized_weight())
    }

    fn project(&self, input: Tensor<B, 2>, weight: Tensor<B, 2>) -> Tensor<B, 2> {
        let output = input.matmul(weight) + self.bias.val().unsqueeze_dim(0);
        self.activation.apply(output)
    }

    /// Kernel divided by the current σ estimate.
    pub fn normalized_weight(&self) -> Tensor<B, 2> {
        self.spectral.normalize_weight_frozen(self.weight.val(), kernel_matrix)
    }

    /// Current σ estimate.
    pub fn sigma(&self) -> f32 {
        self.spectral.sigma(self.weight.val(), kernel_matrix)
    }

    /// Left singular vector, `[d_output, 1]`.
    pub fn u(&self) -> Tensor<B, 2> {
        self.spectral.state().u()
    }

    /// Right singular vector, `[1, d_input]`.
    pub fn v(&self) -> Tensor<B, 2> {
        self.spectral.state().v()
    }

    /// Output activation.
    pub fn activation(&self) -> Activation {
        self.activation.0
    }

    /// Get input dimension.
    pub fn d_input(&self) -> usize {
        self.weight.dims()[0]
    }

    /// Get output dimension.
    pub fn d_output(&self) -> usize {
        self.weight.dims()[1]
    }
}
