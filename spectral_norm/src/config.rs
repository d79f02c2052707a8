//! Estimator configuration.
//!
//! Shared by every layer variant. Layer configs embed an [`EstimatorConfig`]
//! and forward their `with_n_power_iterations` / `with_eps` builders to it.

use serde::{Deserialize, Serialize};

use crate::error::SpectralNormError;

/// Default number of power-iteration sweeps per training call.
pub const DEFAULT_N_POWER_ITERATIONS: usize = 1;

/// Default denominator perturbation for vector normalization.
pub const DEFAULT_EPS: f64 = 1e-12;

/// How the right singular vector `v` starts out.
///
/// `u` is always drawn from a standard normal and normalized. `v` is either
/// zeros (it is overwritten by the first power-iteration sweep before it is
/// ever read in training mode) or drawn the same way as `u`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RightVectorInit {
    /// All zeros. Inference before the first training call yields σ = 0.
    Zeros,
    /// Standard normal, normalized to unit length.
    Normal,
}

/// Power-iteration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Update sweeps per training call.
    /// Only 1 is a verified configuration; larger values are experimental.
    pub n_power_iterations: usize,
    /// Added to every norm before dividing, so a zero vector stays finite.
    pub eps: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            n_power_iterations: DEFAULT_N_POWER_ITERATIONS,
            eps: DEFAULT_EPS,
        }
    }
}

impl EstimatorConfig {
    /// Create a config with the defaults (1 sweep, eps = 1e-12).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of power-iteration sweeps.
    pub fn with_n_power_iterations(mut self, n: usize) -> Self {
        self.n_power_iterations = n;
        self
    }

    /// Set epsilon.
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Validate the configuration.
    ///
    /// Multi-sweep configurations pass but are reported through `log::warn!`.
    pub fn validate(&self) -> Result<(), SpectralNormError> {
        if self.n_power_iterations == 0 {
            return Err(SpectralNormError::InvalidCount {
                field: "n_power_iterations",
                value: self.n_power_iterations,
            });
        }
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(SpectralNormError::InvalidEpsilon { value: self.eps });
        }
        if self.n_power_iterations > 1 {
            log::warn!(
                "n_power_iterations = {} is experimental; only a single sweep per call is verified",
                self.n_power_iterations
            );
        }
        Ok(())
    }
}
