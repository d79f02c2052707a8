//! Behavioural tests for the power-iteration estimator.
//!
//! Covered here:
//! 1. `normalize` on regular and zero inputs
//! 2. State construction and vector shapes
//! 3. Refinement: mutation, unit norm, update order
//! 4. σ: Rayleigh bound, convergence, scale invariance, sign
//! 5. Mode dispatch and gradient exclusion
//! 6. Property-based checks with proptest

use super::*;
use burn::backend::{Autodiff, NdArray};
use burn::tensor::TensorData;
use crate::error::SpectralNormError;

type TestBackend = NdArray<f32>;
type TestAutodiffBackend = Autodiff<NdArray<f32>>;

// =============================================================================
// HELPERS
// =============================================================================

fn device() -> <TestBackend as Backend>::Device {
    Default::default()
}

fn matrix_from(rows: usize, cols: usize, values: Vec<f32>) -> Tensor<TestBackend, 2> {
    Tensor::from_data(TensorData::new(values, [rows, cols]), &device())
}

fn to_vec<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
    tensor.into_data().to_vec::<f32>().unwrap()
}

fn l2(values: &[f32]) -> f32 {
    values.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn mean_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f32>() / a.len() as f32
}

/// Largest singular value by long power iteration on W^T W in f64.
fn true_sigma_max(rows: usize, cols: usize, values: &[f32]) -> f64 {
    let w: Vec<f64> = values.iter().map(|&x| x as f64).collect();
    let mut x: Vec<f64> = (0..cols).map(|i| 1.0 + 0.1 * ((i + 2) as f64).sqrt()).collect();

    let mut sigma = 0.0;
    for _ in 0..2000 {
        let mut wx = vec![0.0f64; rows];
        for r in 0..rows {
            wx[r] = (0..cols).map(|c| w[r * cols + c] * x[c]).sum();
        }
        let mut wtwx = vec![0.0f64; cols];
        for c in 0..cols {
            wtwx[c] = (0..rows).map(|r| w[r * cols + c] * wx[r]).sum();
        }
        let norm = wtwx.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            return 0.0;
        }
        for c in 0..cols {
            x[c] = wtwx[c] / norm;
        }
        sigma = norm.sqrt();
    }
    sigma
}

fn default_estimator() -> SpectralEstimator {
    SpectralEstimator::new(&EstimatorConfig::default()).unwrap()
}

// =============================================================================
// NORMALIZE
// =============================================================================

#[test]
fn test_normalize_unit_norm() {
    let x = Tensor::<TestBackend, 1>::from_floats([3.0, 4.0], &device());
    let y = to_vec(normalize(x, 1e-12));
    assert!((y[0] - 0.6).abs() < 1e-6);
    assert!((y[1] - 0.8).abs() < 1e-6);
}

#[test]
fn test_normalize_preserves_shape() {
    let x = Tensor::<TestBackend, 4>::random([2, 3, 4, 5], Distribution::Normal(0.0, 1.0), &device());
    let y = normalize(x, 1e-12);
    assert_eq!(y.dims(), [2, 3, 4, 5]);
    assert!((l2(&to_vec(y)) - 1.0).abs() < 1e-5);
}

#[test]
fn test_normalize_zero_stays_finite() {
    let x = Tensor::<TestBackend, 2>::zeros([1, 7], &device());
    let y = to_vec(normalize(x, 1e-12));
    assert!(y.iter().all(|v| v.is_finite() && *v == 0.0));
}

#[test]
fn test_normalize_eps_biases_below_unit() {
    let x = Tensor::<TestBackend, 1>::from_floats([1.0, 0.0], &device());
    let y = to_vec(normalize(x, 0.5));
    assert!((y[0] - 1.0 / 1.5).abs() < 1e-6);
}

// =============================================================================
// STATE CONSTRUCTION
// =============================================================================

#[test]
fn test_state_shapes() {
    let state = SingularVectorState::<TestBackend>::new(10, 15, RightVectorInit::Zeros, 1e-12, &device());
    assert_eq!(state.u().dims(), [10, 1]);
    assert_eq!(state.v().dims(), [1, 15]);
    assert_eq!(state.out_dim(), 10);
    assert_eq!(state.in_dim(), 15);
}

#[test]
fn test_state_initial_vectors() {
    let zeros = SingularVectorState::<TestBackend>::new(6, 4, RightVectorInit::Zeros, 1e-12, &device());
    assert!((l2(&to_vec(zeros.u())) - 1.0).abs() < 1e-5);
    assert!(to_vec(zeros.v()).iter().all(|v| *v == 0.0));

    let normal = SingularVectorState::<TestBackend>::new(6, 4, RightVectorInit::Normal, 1e-12, &device());
    assert!((l2(&to_vec(normal.v())) - 1.0).abs() < 1e-5);
}

#[test]
fn test_state_survives_record_roundtrip() {
    use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};

    let state = SingularVectorState::<TestBackend>::new(5, 3, RightVectorInit::Normal, 1e-12, &device());
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let bytes = recorder.record(state.clone().into_record(), ()).unwrap();

    let fresh = SingularVectorState::<TestBackend>::new(5, 3, RightVectorInit::Zeros, 1e-12, &device());
    let record = recorder.load(bytes, &device()).unwrap();
    let restored = fresh.load_record(record);

    assert_eq!(to_vec(restored.u()), to_vec(state.u()));
    assert_eq!(to_vec(restored.v()), to_vec(state.v()));
}

#[test]
fn test_from_tensors_rejects_misshapen_vectors() {
    let u = matrix_from(1, 3, vec![1.0, 0.0, 0.0]);
    let v = matrix_from(1, 2, vec![0.0, 1.0]);
    assert_eq!(
        SingularVectorState::from_tensors(u, v).err(),
        Some(SpectralNormError::ShapeMismatch {
            tensor: "u",
            expected: vec![1, 1],
            actual: vec![1, 3],
        })
    );

    let u = matrix_from(2, 1, vec![1.0, 0.0]);
    let v = matrix_from(2, 1, vec![0.0, 1.0]);
    assert_eq!(
        SingularVectorState::from_tensors(u, v).err(),
        Some(SpectralNormError::ShapeMismatch {
            tensor: "v",
            expected: vec![1, 1],
            actual: vec![2, 1],
        })
    );
}

#[test]
fn test_invalid_config_rejected_by_constructors() {
    let config = EstimatorConfig::new().with_n_power_iterations(0).with_eps(0.0);
    let expected = SpectralNormError::InvalidCount { field: "n_power_iterations", value: 0 };

    assert_eq!(SpectralEstimator::new(&config).err(), Some(expected.clone()));
    let result = SpectralNorm::<TestBackend>::new(&config, 3, 4, RightVectorInit::Zeros, &device());
    assert_eq!(result.err(), Some(expected));

    let bad_eps = EstimatorConfig::new().with_eps(0.0);
    let result = SpectralNorm::<TestBackend>::new(&bad_eps, 3, 4, RightVectorInit::Zeros, &device());
    assert_eq!(result.err(), Some(SpectralNormError::InvalidEpsilon { value: 0.0 }));

    let result =
        SpectralNorm::<TestBackend>::new(&EstimatorConfig::default(), 0, 4, RightVectorInit::Zeros, &device());
    assert!(matches!(result, Err(SpectralNormError::InvalidCount { value: 0, .. })));
}

// =============================================================================
// REFINEMENT
// =============================================================================

#[test]
fn test_refine_mutates_both_vectors() {
    let matrix = Tensor::<TestBackend, 2>::random([10, 15], Distribution::Normal(0.0, 1.0), &device());
    let mut state = SingularVectorState::new(10, 15, RightVectorInit::Zeros, 1e-12, &device());
    let u_before = to_vec(state.u());
    let v_before = to_vec(state.v());

    default_estimator().refine_vectors(matrix, &mut state);

    assert!(mean_abs_diff(&u_before, &to_vec(state.u())) > 0.0);
    assert!(mean_abs_diff(&v_before, &to_vec(state.v())) > 0.0);
}

#[test]
fn test_refine_keeps_unit_norm() {
    let matrix = Tensor::<TestBackend, 2>::random([8, 12], Distribution::Normal(0.0, 1.0), &device());
    let mut state = SingularVectorState::new(8, 12, RightVectorInit::Zeros, 1e-12, &device());
    let estimator = default_estimator();

    for _ in 0..5 {
        estimator.refine_vectors(matrix.clone(), &mut state);
        assert!((l2(&to_vec(state.u())) - 1.0).abs() < 1e-5);
        assert!((l2(&to_vec(state.v())) - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_refine_updates_v_from_previous_u() {
    // W = I (2x2), u = e1: v must become e1 (from old u), then u = W v^T = e1.
    let matrix = matrix_from(2, 2, vec![1.0, 0.0, 0.0, 1.0]);
    let u = matrix_from(2, 1, vec![1.0, 0.0]);
    let v = matrix_from(1, 2, vec![0.0, 1.0]);
    let mut state = SingularVectorState::from_tensors(u, v).unwrap();

    default_estimator().refine_vectors(matrix, &mut state);

    let v_after = to_vec(state.v());
    let u_after = to_vec(state.u());
    assert!((v_after[0] - 1.0).abs() < 1e-6 && v_after[1].abs() < 1e-6);
    assert!((u_after[0] - 1.0).abs() < 1e-6 && u_after[1].abs() < 1e-6);
}

#[test]
fn test_refine_zero_matrix_is_finite() {
    let matrix = Tensor::<TestBackend, 2>::zeros([4, 3], &device());
    let mut state = SingularVectorState::new(4, 3, RightVectorInit::Zeros, 1e-12, &device());
    default_estimator().refine_vectors(matrix.clone(), &mut state);

    assert!(to_vec(state.u()).iter().all(|v| v.is_finite()));
    assert!(to_vec(state.v()).iter().all(|v| v.is_finite()));
    let sigma: f32 = SpectralEstimator::compute_sigma(matrix, &state).into_scalar().elem();
    assert_eq!(sigma, 0.0);
}

// =============================================================================
// SIGMA
// =============================================================================

#[test]
fn test_sigma_converges_on_diagonal() {
    let matrix = matrix_from(3, 3, vec![3.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0]);
    let u = matrix_from(3, 1, vec![0.6, 0.6, 0.52915026]);
    let v = Tensor::zeros([1, 3], &device());
    let mut state = SingularVectorState::from_tensors(u, v).unwrap();
    let estimator = default_estimator();

    for _ in 0..50 {
        estimator.refine_vectors(matrix.clone(), &mut state);
    }
    let sigma: f32 = SpectralEstimator::compute_sigma(matrix, &state).into_scalar().elem();
    assert!((sigma - 3.0).abs() < 1e-3, "expected ~3, got {}", sigma);
}

#[test]
fn test_sigma_bounded_by_true_singular_value() {
    let (rows, cols) = (10, 15);
    let matrix = Tensor::<TestBackend, 2>::random([rows, cols], Distribution::Normal(0.0, 1.0), &device());
    let true_sigma = true_sigma_max(rows, cols, &to_vec(matrix.clone()));
    let mut state = SingularVectorState::new(rows, cols, RightVectorInit::Zeros, 1e-12, &device());
    let estimator = default_estimator();

    for step in 0..30 {
        estimator.refine_vectors(matrix.clone(), &mut state);
        let sigma: f32 = SpectralEstimator::compute_sigma(matrix.clone(), &state).into_scalar().elem();
        assert!(
            (sigma as f64) <= true_sigma * (1.0 + 1e-4),
            "step {}: estimate {} exceeds sigma_max {}",
            step,
            sigma,
            true_sigma
        );
    }
}

#[test]
fn test_sigma_scale_invariance() {
    let matrix = Tensor::<TestBackend, 2>::random([6, 9], Distribution::Normal(0.0, 2.0), &device());
    let mut state = SingularVectorState::new(6, 9, RightVectorInit::Zeros, 1e-12, &device());
    let estimator = default_estimator();
    for _ in 0..3 {
        estimator.refine_vectors(matrix.clone(), &mut state);
    }

    let sigma = SpectralEstimator::compute_sigma(matrix.clone(), &state);
    let normalized = divide_by_sigma(matrix, sigma);
    let sigma_normalized: f32 = SpectralEstimator::compute_sigma(normalized, &state).into_scalar().elem();

    assert!((sigma_normalized - 1.0).abs() < 1e-4, "got {}", sigma_normalized);
}

#[test]
fn test_sigma_can_be_negative() {
    // Sign-flipped pair on W = diag(2, 1): u = -e1, v = e1 gives sigma = -2.
    let matrix = matrix_from(2, 2, vec![2.0, 0.0, 0.0, 1.0]);
    let u = matrix_from(2, 1, vec![-1.0, 0.0]);
    let v = matrix_from(1, 2, vec![1.0, 0.0]);
    let state = SingularVectorState::from_tensors(u, v).unwrap();

    let sigma: f32 = SpectralEstimator::compute_sigma(matrix, &state).into_scalar().elem();
    assert!((sigma + 2.0).abs() < 1e-6);
}

// =============================================================================
// MODE DISPATCH
// =============================================================================

#[test]
fn test_inference_estimate_leaves_state_untouched() {
    let matrix = Tensor::<TestBackend, 2>::random([7, 5], Distribution::Normal(0.0, 1.0), &device());
    let mut state = SingularVectorState::new(7, 5, RightVectorInit::Normal, 1e-12, &device());
    let estimator = default_estimator();
    estimator.refine_vectors(matrix.clone(), &mut state);

    let u_before = to_vec(state.u());
    let v_before = to_vec(state.v());
    let first: f32 = estimator
        .estimate(matrix.clone(), &mut state, Mode::Inference)
        .into_scalar()
        .elem();
    let second: f32 = estimator
        .estimate(matrix, &mut state, Mode::Inference)
        .into_scalar()
        .elem();

    assert_eq!(to_vec(state.u()), u_before);
    assert_eq!(to_vec(state.v()), v_before);
    assert_eq!(first, second);
}

#[test]
fn test_training_estimate_uses_refined_vectors() {
    let matrix = Tensor::<TestBackend, 2>::random([7, 5], Distribution::Normal(0.0, 1.0), &device());
    let mut state = SingularVectorState::new(7, 5, RightVectorInit::Zeros, 1e-12, &device());
    let estimator = default_estimator();

    let sigma: f32 = estimator
        .estimate(matrix.clone(), &mut state, Mode::Training)
        .into_scalar()
        .elem();
    let recomputed: f32 = SpectralEstimator::compute_sigma(matrix, &state).into_scalar().elem();

    assert_eq!(sigma, recomputed);
    assert!(sigma > 0.0);
}

#[test]
fn test_multiple_sweeps_tighten_estimate() {
    let (rows, cols) = (12, 20);
    let matrix = Tensor::<TestBackend, 2>::random([rows, cols], Distribution::Normal(0.0, 1.0), &device());
    let true_sigma = true_sigma_max(rows, cols, &to_vec(matrix.clone()));

    let config = EstimatorConfig::new().with_n_power_iterations(100);
    let estimator = SpectralEstimator::new(&config).unwrap();
    let mut state = SingularVectorState::new(rows, cols, RightVectorInit::Zeros, config.eps, &device());

    let sigma: f32 = estimator
        .estimate(matrix, &mut state, Mode::Training)
        .into_scalar()
        .elem();
    assert!(((sigma as f64) - true_sigma).abs() / true_sigma < 1e-2);
}

#[test]
fn test_gradient_excludes_vectors() {
    let device = Default::default();
    let matrix = Tensor::<TestAutodiffBackend, 2>::random([4, 6], Distribution::Normal(0.0, 1.0), &device)
        .require_grad();
    let mut norm = SpectralNorm::<TestAutodiffBackend>::new(
        &EstimatorConfig::default(),
        4,
        6,
        RightVectorInit::Zeros,
        &device,
    )
    .unwrap();

    fn identity_view(w: Tensor<TestAutodiffBackend, 2>) -> Tensor<TestAutodiffBackend, 2> {
        w
    }

    let normalized = norm.normalize_weight(matrix.clone(), identity_view, Mode::Training);
    let grads = normalized.sum().backward();

    assert!(matrix.grad(&grads).is_some(), "weight should receive a gradient");
    assert!(norm.state().u().grad(&grads).is_none(), "u must stay off the tape");
    assert!(norm.state().v().grad(&grads).is_none(), "v must stay off the tape");
}

// =============================================================================
// PROPERTY-BASED TESTS
// =============================================================================

mod proptest_estimator {
    use super::*;
    use proptest::prelude::*;

    fn matrix_strategy() -> impl Strategy<Value = (usize, usize, Vec<f32>)> {
        (1usize..8, 1usize..8).prop_flat_map(|(rows, cols)| {
            (
                Just(rows),
                Just(cols),
                prop::collection::vec(-10.0f32..10.0, rows * cols),
            )
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// normalize never produces non-finite values and never exceeds unit norm.
        #[test]
        fn test_normalize_bounded(values in prop::collection::vec(-1e3f32..1e3, 1..64)) {
            let n = values.len();
            let x = Tensor::<TestBackend, 1>::from_data(TensorData::new(values, [n]), &device());
            let y = to_vec(normalize(x, 1e-12));
            prop_assert!(y.iter().all(|v| v.is_finite()));
            prop_assert!(l2(&y) <= 1.0 + 1e-5);
        }

        /// After a refinement both vectors are unit norm (or zero for a zero matrix).
        #[test]
        fn test_unit_norm_after_refine((rows, cols, values) in matrix_strategy()) {
            let nonzero = values.iter().any(|v| v.abs() > 1e-3);
            let matrix = matrix_from(rows, cols, values);
            let mut state = SingularVectorState::new(rows, cols, RightVectorInit::Zeros, 1e-12, &device());
            default_estimator().refine_vectors(matrix, &mut state);

            let u_norm = l2(&to_vec(state.u()));
            let v_norm = l2(&to_vec(state.v()));
            prop_assert!(u_norm <= 1.0 + 1e-5 && v_norm <= 1.0 + 1e-5);
            if nonzero {
                prop_assert!((v_norm - 1.0).abs() < 1e-4, "v norm {}", v_norm);
            }
        }

        /// The estimate never exceeds the true top singular value.
        #[test]
        fn test_rayleigh_bound((rows, cols, values) in matrix_strategy(), sweeps in 1usize..6) {
            let true_sigma = true_sigma_max(rows, cols, &values);
            let matrix = matrix_from(rows, cols, values);
            let mut state = SingularVectorState::new(rows, cols, RightVectorInit::Zeros, 1e-12, &device());
            let estimator = default_estimator();
            for _ in 0..sweeps {
                estimator.refine_vectors(matrix.clone(), &mut state);
            }
            let sigma: f32 = SpectralEstimator::compute_sigma(matrix, &state).into_scalar().elem();
            prop_assert!(
                (sigma.abs() as f64) <= true_sigma * (1.0 + 1e-4) + 1e-4,
                "|sigma| {} > sigma_max {}", sigma, true_sigma
            );
        }

        /// Inference never moves the vectors.
        #[test]
        fn test_inference_idempotent((rows, cols, values) in matrix_strategy(), calls in 1usize..5) {
            let matrix = matrix_from(rows, cols, values);
            let mut state = SingularVectorState::new(rows, cols, RightVectorInit::Normal, 1e-12, &device());
            let u_before = to_vec(state.u());
            let v_before = to_vec(state.v());
            let estimator = default_estimator();
            for _ in 0..calls {
                let _ = estimator.estimate(matrix.clone(), &mut state, Mode::Inference);
            }
            prop_assert_eq!(to_vec(state.u()), u_before);
            prop_assert_eq!(to_vec(state.v()), v_before);
        }
    }
}
