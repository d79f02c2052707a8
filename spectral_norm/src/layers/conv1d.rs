//! 1-D convolution with a spectrally normalized filter.
//!
//! Input `[batch, width, c_in]`, filter `[k, c_in, c_out]`, output
//! `[batch, out_w, c_out]`.

use burn::module::{Ignored, Module, Param};
use burn::prelude::*;
use burn::tensor::module::conv1d;
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

/// Configuration for [`SpectralNormConv1d`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralNormConv1dConfig {
    /// Default: 1.
    pub stride: usize,
    /// Default: 1.
    pub dilation: usize,
    /// Default: valid.
    pub padding: Padding,
    /// Applied after the bias. Default: identity.
    pub activation: Activation,
    /// Power-iteration settings.
    pub estimator: EstimatorConfig,
    /// Initial right singular vector. Default: zeros.
    pub v_init: RightVectorInit,
}

impl Default for SpectralNormConv1dConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            dilation: 1,
            padding: Padding::Valid,
            activation: Activation::Identity,
            estimator: EstimatorConfig::default(),
            v_init: RightVectorInit::Zeros,
        }
    }
}

impl SpectralNormConv1dConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stride.
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Set the dilation.
    pub fn with_dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
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

    /// Validate stride, dilation and the estimator settings.
    pub fn validate(&self) -> Result<(), SpectralNormError> {
        self.estimator.validate()?;
        self.validate_geometry()
    }

    fn validate_geometry(&self) -> Result<(), SpectralNormError> {
        if self.stride == 0 {
            return Err(SpectralNormError::InvalidCount { field: "stride", value: 0 });
        }
        if self.dilation == 0 {
            return Err(SpectralNormError::InvalidCount { field: "dilation", value: 0 });
        }
        Ok(())
    }

    /// Build the layer around an existing filter `[k, c_in, c_out]` and bias `[c_out]`.
    pub fn init<B: Backend>(
        &self,
        filter: Tensor<B, 3>,
        bias: Tensor<B, 1>,
    ) -> Result<SpectralNormConv1d<B>, SpectralNormError> {
        self.validate_geometry()?;
        let [kernel, c_in, c_out] = filter.dims();
        check_dims("filter", &[kernel, c_in, c_out])?;
        check_bias_len(bias.dims()[0], c_out)?;

        let device = filter.device();
        let spectral = SpectralNorm::new(&self.estimator, c_out, kernel * c_in, self.v_init, &device)?;

        log::debug!(
            "SpectralNormConv1d k={} {} -> {} (stride {}, dilation {}, {:?})",
            kernel,
            c_in,
            c_out,
            self.stride,
            self.dilation,
            self.padding
        );

        Ok(SpectralNormConv1d {
            filter: Param::from_tensor(filter),
            bias: Param::from_tensor(bias),
            spectral,
            stride: self.stride,
            dilation: self.dilation,
            padding: Ignored(self.padding),
            activation: Ignored(self.activation),
        })
    }

    /// Build the layer from dynamically shaped data; the filter must be rank 3.
    pub fn init_from_data<B: Backend>(
        &self,
        filter: TensorData,
        bias: TensorData,
        device: &B::Device,
    ) -> Result<SpectralNormConv1d<B>, SpectralNormError> {
        check_rank("filter", &filter, 3)?;
        check_rank("bias", &bias, 1)?;
        self.init(Tensor::from_data(filter, device), Tensor::from_data(bias, device))
    }

    /// Build the layer with a Glorot-normal filter and zero bias.
    pub fn init_random<B: Backend>(
        &self,
        kernel_size: usize,
        c_in: usize,
        c_out: usize,
        device: &B::Device,
    ) -> Result<SpectralNormConv1d<B>, SpectralNormError> {
        check_dims("filter", &[kernel_size, c_in, c_out])?;
        let filter = glorot_normal(
            [kernel_size, c_in, c_out],
            kernel_size * c_in,
            kernel_size * c_out,
            device,
        );
        self.init(filter, Tensor::zeros([c_out], device))
    }
}

fn filter_matrix<B: Backend>(filter: Tensor<B, 3>) -> Tensor<B, 2> {
    let [kernel, c_in, c_out] = filter.dims();
    filter.reshape([kernel * c_in, c_out]).transpose()
}

/// 1-D convolution whose filter is divided by its estimated spectral norm.
#[derive(Module, Debug)]
pub struct SpectralNormConv1d<B: Backend> {
    /// Filter of shape [k, c_in, c_out]
    pub filter: Param<Tensor<B, 3>>,
    /// Bias of shape [c_out]
    pub bias: Param<Tensor<B, 1>>,
    spectral: SpectralNorm<B>,
    stride: usize,
    dilation: usize,
    padding: Ignored<Padding>,
    activation: Ignored<Activation>,
}

impl<B: Backend> SpectralNormConv1d<B> {
    /// Forward pass for `[batch, width, c_in]` input.
    ///
    /// # Numerics
    ///
    /// With the default [`RightVectorInit::Zeros`], σ is exactly 0 until the
    /// first [`Mode::Training`] call, so an inference call on a freshly built
    /// layer returns non-finite values. Train once first, or build with
    /// [`RightVectorInit::Normal`].
    pub fn forward(&mut self, input: Tensor<B, 3>, mode: Mode) -> Tensor<B, 3> {
        let filter = self.spectral.normalize_weight(self.filter.val(), filter_matrix, mode);
        self.convolve(input, filter)
    }

    /// Inference forward pass; never mutates the layer.
    ///
    /// # Numerics
    ///
    /// Shares the σ = 0 caveat of [`forward`](Self::forward): a layer built
    /// with zero `v` and never trained yields non-finite output.
    pub fn infer(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        self.convolve(input, self.normalized_filter())
    }

    fn convolve(&self, input: Tensor<B, 3>, filter: Tensor<B, 3>) -> Tensor<B, 3> {
        let [_, width, _] = input.dims();
        let [kernel, _, _] = filter.dims();

        let x = input.permute([0, 2, 1]);
        let (left, right) = self.padding.amounts(width, kernel, self.stride, self.dilation);
        let x = x.pad((left, right, 0, 0), 0.0);

        // [k, c_in, c_out] -> [c_out, c_in, k]
        let kernel = filter.permute([2, 1, 0]);
        let options = ConvOptions::new([self.stride], [0], [self.dilation], 1);
        let output = conv1d(x, kernel, Some(self.bias.val()), options);

        self.activation.apply(output.permute([0, 2, 1]))
    }

    /// Filter divided by the current σ estimate.
    pub fn normalized_filter(&self) -> Tensor<B, 3> {
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

    /// Right singular vector, `[1, k * c_in]`.
    pub fn v(&self) -> Tensor<B, 2> {
        self.spectral.state().v()
    }

    /// Kernel width.
    pub fn kernel_size(&self) -> usize {
        self.filter.dims()[0]
    }

    /// Output channels.
    pub fn channels_out(&self) -> usize {
        self.filter.dims()[2]
    }
}
