//! Training / inference mode.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

/// Selects whether a forward call advances the power-iteration state.
///
/// Passed explicitly to every `forward` call; layers never store it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Refine `u`, `v` before estimating σ.
    Training,
    /// Estimate σ from the current `u`, `v` without touching them.
    Inference,
}

impl Mode {
    /// Burn's convention: an autodiff backend is training, anything else is inference.
    pub fn from_backend<B: Backend>() -> Self {
        if B::ad_enabled() {
            Mode::Training
        } else {
            Mode::Inference
        }
    }

    /// Whether this mode mutates singular-vector state.
    pub fn is_training(self) -> bool {
        matches!(self, Mode::Training)
    }
}
