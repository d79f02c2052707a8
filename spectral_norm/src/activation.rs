//! Output activations applied after the bias.

use burn::prelude::*;
use burn::tensor::activation::{gelu, leaky_relu, relu, sigmoid, tanh};
use serde::{Deserialize, Serialize};

/// Element-wise activation. Defaults to identity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    /// Leaky ReLU with the given slope for negative inputs.
    LeakyRelu { negative_slope: f64 },
    Sigmoid,
    Tanh,
    Gelu,
}

impl Activation {
    /// Apply to a tensor of any rank.
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Identity => x,
            Activation::Relu => relu(x),
            Activation::LeakyRelu { negative_slope } => leaky_relu(x, *negative_slope),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => tanh(x),
            Activation::Gelu => gelu(x),
        }
    }
}
