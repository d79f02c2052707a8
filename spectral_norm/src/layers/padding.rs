//! Convolution padding.

use serde::{Deserialize, Serialize};

/// Spatial padding policy for the convolution layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Padding {
    /// No padding; the output shrinks by the effective kernel extent minus one.
    #[default]
    Valid,
    /// Pad so that `output = ceil(input / stride)`.
    ///
    /// When the total padding is odd the extra cell goes on the trailing side.
    Same,
}

impl Padding {
    /// `(before, after)` padding for one spatial axis.
    ///
    /// The convolution layers hand these to `Tensor::pad` as
    /// `(left, right, top, bottom)` over the trailing two dimensions.
    pub fn amounts(self, input: usize, kernel: usize, stride: usize, dilation: usize) -> (usize, usize) {
        match self {
            Padding::Valid => (0, 0),
            Padding::Same => {
                let effective_kernel = kernel.saturating_sub(1) * dilation + 1;
                let output = input.div_ceil(stride);
                if output == 0 {
                    return (0, 0);
                }
                let needed = (output - 1) * stride + effective_kernel;
                let total = needed.saturating_sub(input);
                let before = total / 2;
                (before, total - before)
            }
        }
    }
}
