//! 2-D convolution with a spectrally normalized filter.
//!
//! Channels-last throughout: input `[batch, height, width, c_in]`, filter
//! `[kh, kw, c_in, c_out]`, output `[batch, out_h, out_w, c_out]`. The filter
//! is viewed as `[c_out, kh * kw * c_in]` for the estimator, and converted to
//! burn's channels-first kernel layout only for the convolution itself.

use burn::module::{Ignored, Module, Param};
use burn::prelude::*;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use super::glorot_normal;
use super::padding::Padding;
use crate::activation::Activation;
use crate::config::{EstimatorConfig, RightVectorInit};
use crate::error::{check_bias_len, check_dims, check_rank, SpectralNormError};
use crate::estimator::SpectralNorm;
use crate::mode::Mode;

/// Configuration for [`SpectralNormConv2d`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralNormConv2dConfig {
    /// Stride along (height, width). Default: [1, 1].
    pub strides: [usize; 2],
    /// Dilation along (height, width). Default: [1, 1].
    pub dilations: [usize; 2],
    /// Default: valid.
    pub padding: Padding,
    /// Applied after the bias. Default: identity.
    pub activation: Activation,
    /// Power-iteration settings.
    pub estimator: EstimatorConfig,
    /// Initial right singular vector. Default: zeros.
    pub v_init: RightVectorInit,
}

impl Default for SpectralNormConv2dConfig {
    fn default() -> Self {
        Self {
            strides: [1, 1],
            dilations: [1, 1],
            padding: Padding::Valid,
            activation: Activation::Identity,
            estimator: EstimatorConfig::default(),
            v_init: RightVectorInit::Zeros,
        }
    }
}

impl SpectralNormConv2dConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the strides.
    pub fn with_strides(mut self, strides: [usize; 2]) -> Self {
        self.strides = strides;
        self
    }

    /// Set the dilations.
    pub fn with_dilations(mut self, dilations: [usize; 2]) -> Self {
        self.dilations = dilations;
        self
    }

    /// Set the padding policy.
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
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

    /// Validate strides, dilations and the estimator settings.
    pub fn validate(&self) -> Result<(), SpectralNormError> {
        self.estimator.validate()?;
        self.validate_geometry()
    }

    fn validate_geometry(&self) -> Result<(), SpectralNormError> {
        for &stride in &self.strides {
            if stride == 0 {
                return Err(SpectralNormError::InvalidCount { field: "strides", value: stride });
            }
        }
        for &dilation in &self.dilations {
            if dilation == 0 {
                return Err(SpectralNormError::InvalidCount { field: "dilations", value: dilation });
            }
        }
        Ok(())
    }

    /// Build the layer around an existing filter `[kh, kw, c_in, c_out]` and bias `[c_out]`.
    pub fn init<B: Backend>(
        &self,
        filter: Tensor<B, 4>,
        bias: Tensor<B, 1>,
    ) -> Result<SpectralNormConv2d<B>, SpectralNormError> {
        self.validate_geometry()?;
        let [kh, kw, c_in, c_out] = filter.dims();
        check_dims("filter", &[kh, kw, c_in, c_out])?;
        check_bias_len(bias.dims()[0], c_out)?;

        let device = filter.device();
        let spectral = SpectralNorm::new(&self.estimator, c_out, kh * kw * c_in, self.v_init, &device)?;

        log::debug!(
            "SpectralNormConv2d {}x{} {} -> {} (strides {:?}, dilations {:?}, {:?})",
            kh,
            kw,
            c_in,
            c_out,
            self.strides,
            self.dilations,
            self.padding
        );

        Ok(SpectralNormConv2d {
            filter: Param::from_tensor(filter),
            bias: Param::from_tensor(bias),
            spectral,
            strides: self.strides,
            dilations: self.dilations,
            padding: Ignored(self.padding),
            activation: Ignored(self.activation),
        })
    }

    /// Build the layer from dynamically shaped data, checking ranks first.
    ///
    /// The filter must be rank 4 and the bias rank 1.
    pub fn init_from_data<B: Backend>(
        &self,
        filter: TensorData,
        bias: TensorData,
        device: &B::Device,
    ) -> Result<SpectralNormConv2d<B>, SpectralNormError> {
        check_rank("filter", &filter, 4)?;
        check_rank("bias", &bias, 1)?;
        self.init(Tensor::from_data(filter, device), Tensor::from_data(bias, device))
    }

    /// Build the layer with a Glorot-normal filter and zero bias.
    pub fn init_random<B: Backend>(
        &self,
        kernel_size: [usize; 2],
        c_in: usize,
        c_out: usize,
        device: &B::Device,
    ) -> Result<SpectralNormConv2d<B>, SpectralNormError> {
        let [kh, kw] = kernel_size;
        check_dims("filter", &[kh, kw, c_in, c_out])?;
        let receptive = kh * kw;
        let filter = glorot_normal([kh, kw, c_in, c_out], receptive * c_in, receptive * c_out, device);
        self.init(filter, Tensor::zeros([c_out], device))
    }
}

/// `[kh, kw, c_in, c_out]` filter viewed as `[c_out, kh * kw * c_in]`.
fn filter_matrix<B: Backend>(filter: Tensor<B, 4>) -> Tensor<B, 2> {
    let [kh, kw, c_in, c_out] = filter.dims();
    filter.reshape([kh * kw * c_in, c_out]).transpose()
}

/// 2-D convolution whose filter is divided by its estimated spectral norm.
#[derive(Module, Debug)]
pub struct SpectralNormConv2d<B: Backend> {
    /// Filter of shape [kh, kw, c_in, c_out]
    pub filter: Param<Tensor<B, 4>>,
    /// Bias of shape [c_out]
    pub bias: Param<Tensor<B, 1>>,
    spectral: SpectralNorm<B>,
    strides: [usize; 2],
    dilations: [usize; 2],
    padding: Ignored<Padding>,
    activation: Ignored<Activation>,
}

impl<B: Backend> SpectralNormConv2d<B> {
    /// Forward pass for `[batch, height, width, c_in]` input.
    ///
    /// # Numerics
    ///
    /// With the default [`RightVectorInit::Zeros`], σ is exactly 0 until the
    /// first [`Mode::Training`] call, so an inference call on a freshly built
    /// layer returns non-finite values. Train once first, or build with
    /// [`RightVectorInit::Normal`].
    pub fn forward(&mut self, input: Tensor<B, 4>, mode: Mode) -> Tensor<B, 4> {
        let filter = self.spectral.normalize_weight(self.filter.val(), filter_matrix, mode);
        self.convolve(input, filter)
    }

    /// Inference forward pass; never mutates the layer.
    ///
    /// # Numerics
    ///
    /// Shares the σ = 0 caveat of [`forward`](Self::forward): a layer built
    /// with zero `v` and never trained yields non-finite output.
    pub fn infer(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.convolve(input, self.normalized_filter())
    }

    fn convolve(&self, input: Tensor<B, 4>, filter: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, height, width, _] = input.dims();
        let [kh, kw, _, _] = filter.dims();

        // NHWC -> NCHW
        let x = input.permute([0, 3, 1, 2]);
        let (top, bottom) = self.padding.amounts(height, kh, self.strides[0], self.dilations[0]);
        let (left, right) = self.padding.amounts(width, kw, self.strides[1], self.dilations[1]);
        let x = x.pad((left, right, top, bottom), 0.0);

        // [kh, kw, c_in, c_out] -> [c_out, c_in, kh, kw]
        let kernel = filter.permute([3, 2, 0, 1]);
        let options = ConvOptions::new(self.strides, [0, 0], self.dilations, 1);
        let output = conv2d(x, kernel, Some(self.bias.val()), options);

        // NCHW -> NHWC
        self.activation.apply(output.permute([0, 2, 3, 1]))
    }

    /// Filter divided by the current σ estimate.
    pub fn normalized_filter(&self) -> Tensor<B, 4> {
        self.spectral.normalize_weight_frozen(self.filter.val(), filter_matrix)
    }

    /// Current σ estimate.
    pub fn sigma(&self) -> f32 {
        self.spectral.sigma(self.filter.val(), filter_matrix)
    }

    /// Left singular vector, `[c_out, 1]`.
    pub fn u(&self) -> Tensor<B, 2> {
        self.spectral.state().u()
    }

    /// Right singular vector, `[1, kh * kw * c_in]`.
    pub fn v(&self) -> Tensor<B, 2> {
        self.spectral.state().v()
    }

    /// Spatial kernel size.
    pub fn kernel_size(&self) -> [usize; 2] {
        let [kh, kw, _, _] = self.filter.dims();
        [kh, kw]
    }

    /// Output channels.
    pub fn channels_out(&self) -> usize {
        self.filter.dims()[3]
    }
}
