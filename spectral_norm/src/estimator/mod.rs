//! Online estimate of a weight matrix's largest singular value.
//!
//! # Algorithm
//!
//! One power-iteration sweep per training call refines a pair of approximate
//! singular vectors `u` (`[out, 1]`) and `v` (`[1, in]`):
//!
//! ```text
//! v <- normalize(u^T W)
//! u <- normalize(W v^T)
//! sigma = u^T W v^T
//! ```
//!
//! `v` is refreshed from the previous `u` before `u` is refreshed from the new
//! `v`. Because the weight moves slowly between optimizer steps, one sweep per
//! step keeps the pair close to the dominant singular vectors.
//!
//! # Gradients
//!
//! [`SpectralEstimator::refine_vectors`] runs on a detached copy of the matrix
//! and stores detached vectors, so none of its operations are recorded by an
//! autodiff backend. [`SpectralEstimator::compute_sigma`] is the only piece that
//! sits on the forward graph, and only through the matrix.
//!
//! # Sign of sigma
//!
//! σ is `u^T W v^T`, not its absolute value. If `u` and `v` settle on a
//! sign-flipped pair the estimate is negative; callers must not assume σ ≥ 0.

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::Distribution;

use crate::config::{EstimatorConfig, RightVectorInit};
use crate::error::{check_dims, SpectralNormError};
use crate::mode::Mode;

#[cfg(test)]
mod tests;

/// A layer's strategy for viewing its weight as an `[out, in_flat]` matrix.
pub type MatrixView<B, const D: usize> = fn(Tensor<B, D>) -> Tensor<B, 2>;

/// `x / (||x||_2 + eps)` over all elements.
///
/// A zero input maps to zeros instead of NaN. Any other input ends up just
/// under unit norm.
pub fn normalize<B: Backend, const D: usize>(x: Tensor<B, D>, eps: f64) -> Tensor<B, D> {
    let norm = x.clone().powf_scalar(2.0).sum().sqrt().add_scalar(eps);
    x / norm.unsqueeze::<D>()
}

fn frozen<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Param<Tensor<B, D>> {
    Param::from_tensor(tensor.detach()).set_require_grad(false)
}

/// Approximate left/right singular vectors for one weight matrix.
///
/// Owned by exactly one layer. Both vectors are excluded from gradient
/// computation and from optimizer updates, but are part of the module record,
/// so checkpoints restore them verbatim.
#[derive(Module, Debug)]
pub struct SingularVectorState<B: Backend> {
    /// Left singular vector, `[out_dim, 1]`.
    u: Param<Tensor<B, 2>>,
    /// Right singular vector, `[1, in_flat]`.
    v: Param<Tensor<B, 2>>,
}

impl<B: Backend> SingularVectorState<B> {
    /// Fresh state: `u` is a normalized standard-normal draw, `v` per `v_init`.
    pub fn new(
        out_dim: usize,
        in_flat: usize,
        v_init: RightVectorInit,
        eps: f64,
        device: &B::Device,
    ) -> Self {
        let u = Tensor::<B, 2>::random([out_dim, 1], Distribution::Normal(0.0, 1.0), device);
        let v = match v_init {
            RightVectorInit::Zeros => Tensor::<B, 2>::zeros([1, in_flat], device),
            RightVectorInit::Normal => normalize(
                Tensor::<B, 2>::random([1, in_flat], Distribution::Normal(0.0, 1.0), device),
                eps,
            ),
        };

        Self {
            u: frozen(normalize(u, eps)),
            v: frozen(v),
        }
    }

    /// Wrap existing vectors, e.g. when restoring state by hand.
    ///
    /// `u` must be a column `[out_dim, 1]` and `v` a row `[1, in_flat]`.
    pub fn from_tensors(u: Tensor<B, 2>, v: Tensor<B, 2>) -> Result<Self, SpectralNormError> {
        let [out_dim, u_cols] = u.dims();
        let [v_rows, in_flat] = v.dims();
        if u_cols != 1 || out_dim == 0 {
            return Err(SpectralNormError::ShapeMismatch {
                tensor: "u",
                expected: vec![out_dim.max(1), 1],
                actual: vec![out_dim, u_cols],
            });
        }
        if v_rows != 1 || in_flat == 0 {
            return Err(SpectralNormError::ShapeMismatch {
                tensor: "v",
                expected: vec![1, in_flat.max(1)],
                actual: vec![v_rows, in_flat],
            });
        }
        Ok(Self {
            u: frozen(u),
            v: frozen(v),
        })
    }

    /// Current left singular vector, `[out_dim, 1]`.
    pub fn u(&self) -> Tensor<B, 2> {
        self.u.val()
    }

    /// Current right singular vector, `[1, in_flat]`.
    pub fn v(&self) -> Tensor<B, 2> {
        self.v.val()
    }

    /// Length of `u`.
    pub fn out_dim(&self) -> usize {
        self.u.dims()[0]
    }

    /// Length of `v`.
    pub fn in_dim(&self) -> usize {
        self.v.dims()[1]
    }

    fn replace(&mut self, u: Tensor<B, 2>, v: Tensor<B, 2>) {
        self.u = self.u.clone().map(|_| u);
        self.v = self.v.clone().map(|_| v);
    }
}

/// Power-iteration settings plus the two estimator operations.
///
/// Holds no tensors; the vectors live in a [`SingularVectorState`].
#[derive(Module, Clone, Debug)]
pub struct SpectralEstimator {
    n_power_iterations: usize,
    eps: f64,
}

impl SpectralEstimator {
    /// Build from a config, validating it first.
    pub fn new(config: &EstimatorConfig) -> Result<Self, SpectralNormError> {
        config.validate()?;
        Ok(Self {
            n_power_iterations: config.n_power_iterations,
            eps: config.eps,
        })
    }

    /// Sweeps per training call.
    pub fn n_power_iterations(&self) -> usize {
        self.n_power_iterations
    }

    /// Norm perturbation.
    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Advance `u`, `v` by `n_power_iterations` sweeps against `matrix`.
    ///
    /// Not differentiable: the matrix is detached and the stored vectors carry
    /// no graph.
    pub fn refine_vectors<B: Backend>(
        &self,
        matrix: Tensor<B, 2>,
        state: &mut SingularVectorState<B>,
    ) {
        log::trace!(
            "refining singular vectors of a {:?} matrix ({} sweep(s))",
            matrix.dims(),
            self.n_power_iterations
        );

        let matrix = matrix.detach();
        let mut u = state.u().detach();
        let mut v = state.v().detach();

        for _ in 0..self.n_power_iterations {
            // [1, out] @ [out, in] -> [1, in]
            v = normalize(u.clone().transpose().matmul(matrix.clone()), self.eps);
            // [out, in] @ [in, 1] -> [out, 1]
            u = normalize(matrix.clone().matmul(v.clone().transpose()), self.eps);
        }

        state.replace(u, v);
    }

    /// `u^T W v^T` as a one-element tensor.
    ///
    /// Differentiable with respect to `matrix` only.
    pub fn compute_sigma<B: Backend>(
        matrix: Tensor<B, 2>,
        state: &SingularVectorState<B>,
    ) -> Tensor<B, 1> {
        let u = state.u().detach();
        let v = state.v().detach();

        // [1, out] @ [out, in] @ [in, 1] -> [1, 1]
        u.transpose().matmul(matrix).matmul(v.transpose()).reshape([1])
    }

    /// σ for this call: refine first in training mode, then estimate.
    pub fn estimate<B: Backend>(
        &self,
        matrix: Tensor<B, 2>,
        state: &mut SingularVectorState<B>,
        mode: Mode,
    ) -> Tensor<B, 1> {
        if mode.is_training() {
            self.refine_vectors(matrix.clone(), state);
        }
        Self::compute_sigma(matrix, state)
    }
}

/// Divide a weight of any rank by a one-element σ.
pub fn divide_by_sigma<B: Backend, const D: usize>(
    weight: Tensor<B, D>,
    sigma: Tensor<B, 1>,
) -> Tensor<B, D> {
    weight / sigma.unsqueeze::<D>()
}

/// Estimator and vector state for one weight, as embedded in every layer.
#[derive(Module, Debug)]
pub struct SpectralNorm<B: Backend> {
    estimator: SpectralEstimator,
    state: SingularVectorState<B>,
}

impl<B: Backend> SpectralNorm<B> {
    /// Fresh estimator state for an `[out_dim, in_flat]` matrix view.
    ///
    /// Fails if `config` does not validate or either dimension is zero.
    pub fn new(
        config: &EstimatorConfig,
        out_dim: usize,
        in_flat: usize,
        v_init: RightVectorInit,
        device: &B::Device,
    ) -> Result<Self, SpectralNormError> {
        let estimator = SpectralEstimator::new(config)?;
        check_dims("matrix", &[out_dim, in_flat])?;
        Ok(Self {
            estimator,
            state: SingularVectorState::new(out_dim, in_flat, v_init, config.eps, device),
        })
    }

    /// `weight / σ`, refining `u`, `v` first when `mode` is training.
    pub fn normalize_weight<const D: usize>(
        &mut self,
        weight: Tensor<B, D>,
        view: MatrixView<B, D>,
        mode: Mode,
    ) -> Tensor<B, D> {
        let sigma = self.estimator.estimate(view(weight.clone()), &mut self.state, mode);
        divide_by_sigma(weight, sigma)
    }

    /// `weight / σ` from the current vectors, without refinement.
    pub fn normalize_weight_frozen<const D: usize>(
        &self,
        weight: Tensor<B, D>,
        view: MatrixView<B, D>,
    ) -> Tensor<B, D> {
        let sigma = SpectralEstimator::compute_sigma(view(weight.clone()), &self.state);
        divide_by_sigma(weight, sigma)
    }

    /// Current σ estimate as a host scalar.
    pub fn sigma<const D: usize>(&self, weight: Tensor<B, D>, view: MatrixView<B, D>) -> f32 {
        SpectralEstimator::compute_sigma(view(weight), &self.state)
            .into_scalar()
            .elem()
    }

    /// The estimator settings.
    pub fn estimator(&self) -> &SpectralEstimator {
        &self.estimator
    }

    /// The singular-vector state.
    pub fn state(&self) -> &SingularVectorState<B> {
        &self.state
    }
}
