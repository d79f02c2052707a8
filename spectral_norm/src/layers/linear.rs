//! Spectrally normalized linear layer in burn's weight convention.
//!
//! Weight is `[d_output, d_input]` and the forward pass is
//! `x @ (W / σ)^T + b`. The weight already is the `[out, in]` matrix the
//! estimator expects, so no reshape is needed. Unlike the dense and
//! convolution variants, `v` starts as a random unit vector and the bias is
//! optional.
//!
//! # Usage
//!
//! ```ignore
//! use spectral_norm::{Mode, SpectralNormLinear, SpectralNormLinearConfig};
//!
//! let config = SpectralNormLinearConfig::new(64, 64)
//!     .with_n_power_iterations(1);  // Usually 1 is sufficient
//! let mut linear: SpectralNormLinear<Backend> = config.init(&device)?;
//!
//! let output = linear.forward(input, Mode::Training);
//! ```
//!
//! # References
//!
//! - "Spectral Normalization for Generative Adversarial Networks" (Miyato et al., 2018)

use burn::module::{Module, Param};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::glorot_normal;
use crate::config::{EstimatorConfig, RightVectorInit};
use crate::error::{check_bias_len, check_dims, SpectralNormError};
use crate::estimator::SpectralNorm;
use crate::mode::Mode;

/// Configuration for SpectralNormLinear layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralNormLinearConfig {
    /// Number of input features.
    pub d_input: usize,
    /// Number of output features.
    pub d_output: usize,
    /// Whether to include a bias term.
    pub bias: bool,
    /// Power-iteration settings.
    pub estimator: EstimatorConfig,
    /// Initial right singular vector. Default: random unit vector.
    pub v_init: RightVectorInit,
}

impl SpectralNormLinearConfig {
    /// Create a new configuration.
    pub fn new(d_input: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_output,
            bias: true,
            estimator: EstimatorConfig::default(),
            v_init: RightVectorInit::Normal,
        }
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

    /// Set whether to include bias.
    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Set the right singular vector initialization.
    pub fn with_right_vector_init(mut self, v_init: RightVectorInit) -> Self {
        self.v_init = v_init;
        self
    }

    /// Initialize the layer with a Glorot-normal weight and zero bias.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SpectralNormLinear<B>, SpectralNormError> {
        check_dims("weight", &[self.d_output, self.d_input])?;
        let weight = glorot_normal([self.d_output, self.d_input], self.d_input, self.d_output, device);
        let bias = self.bias.then(|| Tensor::zeros([self.d_output], device));
        self.init_with(weight, bias)
    }

    /// Initialize the layer around an existing weight `[d_output, d_input]`.
    pub fn init_with<B: Backend>(
        &self,
        weight: Tensor<B, 2>,
        bias: Option<Tensor<B, 1>>,
    ) -> Result<SpectralNormLinear<B>, SpectralNormError> {
        let [d_output, d_input] = weight.dims();
        if [d_output, d_input] != [self.d_output, self.d_input] {
            return Err(SpectralNormError::ShapeMismatch {
                tensor: "weight",
                expected: vec![self.d_output, self.d_input],
                actual: vec![d_output, d_input],
            });
        }
        check_dims("weight", &[d_output, d_input])?;
        if let Some(bias) = &bias {
            check_bias_len(bias.dims()[0], d_output)?;
        }

        let device = weight.device();
        let spectral = SpectralNorm::new(&self.estimator, d_output, d_input, self.v_init, &device)?;

        log::debug!(
            "SpectralNormLinear {} -> {} (bias: {}, {} sweep(s))",
            d_input,
            d_output,
            bias.is_some(),
            self.estimator.n_power_iterations
        );

        Ok(SpectralNormLinear {
            weight: Param::from_tensor(weight),
            bias: bias.map(Param::from_tensor),
            spectral,
        })
    }
}

fn weight_matrix<B: Backend>(weight: Tensor<B, 2>) -> Tensor<B, 2> {
    weight
}

/// Linear layer with spectral normalization.
///
/// The weights are divided by their estimated spectral norm (largest
/// singular value) before each forward pass.
#[derive(Module, Debug)]
pub struct SpectralNormLinear<B: Backend> {
    /// Weight matrix of shape [d_output, d_input]
    pub weight: Param<Tensor<B, 2>>,
    /// Optional bias of shape [d_output]
    pub bias: Option<Param<Tensor<B, 1>>>,
    spectral: SpectralNorm<B>,
}

impl<B: Backend> SpectralNormLinear<B> {
    /// Forward pass with spectrally normalized weights.
    pub fn forward(&mut self, input: Tensor<B, 2>, mode: Mode) -> Tensor<B, 2> {
        let weight = self.spectral.normalize_weight(self.weight.val(), weight_matrix, mode);
        self.project(input, weight)
    }

    /// Inference forward pass; never mutates the layer.
    pub fn infer(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.project(input, self.normalized_weight())
    }

    /// Forward pass for 3D input (batched sequences).
    ///
    /// # Arguments
    /// * `input` - Tensor of shape [batch_size, seq_len, d_input]
    ///
    /// # Returns
    /// Tensor of shape [batch_size, seq_len, d_output]
    pub fn forward_3d(&mut self, input: Tensor<B, 3>, mode: Mode) -> Tensor<B, 3> {
        let [batch, seq, d_input] = input.dims();
        let output = self.forward(input.reshape([batch * seq, d_input]), mode);
        output.reshape([batch, seq, self.d_output()])
    }

    fn project(&self, input: Tensor<B, 2>, weight: Tensor<B, 2>) -> Tensor<B, 2> {
        // Linear: output = input @ weight^T + bias
        let output = input.matmul(weight.transpose());

        match &self.bias {
            Some(bias) => output + bias.val().unsqueeze_dim(0),
            None => output,
        }
    }

    /// Get the spectrally normalized weight matrix.
    pub fn normalized_weight(&self) -> Tensor<B, 2> {
        self.spectral.normalize_weight_frozen(self.weight.val(), weight_matrix)
    }

    /// Get the current estimated spectral norm.
    pub fn sigma(&self) -> f32 {
        self.spectral.sigma(self.weight.val(), weight_matrix)
    }

    /// Left singular vector, `[d_output, 1]`.
    pub fn u(&self) -> Tensor<B, 2> {
        self.spectral.state().u()
    }

    /// Right singular vector, `[1, d_input]`.
    pub fn v(&self) -> Tensor<B, 2> {
        self.spectral.state().v()
    }

    /// Get input dimension.
    pub fn d_input(&self) -> usize {
        self.weight.dims()[1]
    }

    /// Get output dimension.
    pub fn d_output(&self) -> usize {
        self.weight.dims()[0]
    }
}
