//! Spectrally normalized critic.
//!
//! A 3-layer MLP where every layer is a `SpectralNormDense`, trained with Adam
//! to score two clusters as +1 and -1. Because every layer is (approximately)
//! 1-Lipschitz and LeakyReLU is 1-Lipschitz, the whole critic is too; the
//! per-layer σ estimates printed each epoch track the raw weights' growth while
//! the normalized network stays bounded.

use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use rand::Rng;

use spectral_norm::{Activation, Mode, SpectralNormDense, SpectralNormDenseConfig, SpectralNormError};

use crate::DemoBackend;

const INPUT_DIM: usize = 2;
const HIDDEN_DIM: usize = 32;
const BATCH_SIZE: usize = 64;
const EPOCHS: usize = 40;
const LEARNING_RATE: f64 = 1e-2;

// ============================================================================
// Network Definition
// ============================================================================

#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    hidden_0: SpectralNormDense<B>,
    hidden_1: SpectralNormDense<B>,
    head: SpectralNormDense<B>,
}

impl<B: Backend> Critic<B> {
    pub fn new(device: &B::Device) -> Result<Self, SpectralNormError> {
        let hidden = SpectralNormDenseConfig::new().with_activation(Activation::LeakyRelu { negative_slope: 0.2 });
        Ok(Self {
            hidden_0: hidden.init_random(INPUT_DIM, HIDDEN_DIM, device)?,
            hidden_1: hidden.init_random(HIDDEN_DIM, HIDDEN_DIM, device)?,
            head: SpectralNormDenseConfig::new().init_random(HIDDEN_DIM, 1, device)?,
        })
    }

    pub fn forward(&mut self, x: Tensor<B, 2>, mode: Mode) -> Tensor<B, 2> {
        let x = self.hidden_0.forward(x, mode);
        let x = self.hidden_1.forward(x, mode);
        self.head.forward(x, mode)
    }

    pub fn infer(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.hidden_0.infer(x);
        let x = self.hidden_1.infer(x);
        self.head.infer(x)
    }

    fn sigmas(&self) -> [f32; 3] {
        [self.hidden_0.sigma(), self.hidden_1.sigma(), self.head.sigma()]
    }
}

// ============================================================================
// Toy Data
// ============================================================================

/// Half the batch around (+1, +1) labelled +1, half around (-1, -1) labelled -1.
fn toy_batch<B: Backend, R: Rng>(rng: &mut R, device: &B::Device) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let mut points = Vec::with_capacity(BATCH_SIZE * INPUT_DIM);
    let mut labels = Vec::with_capacity(BATCH_SIZE);

    for i in 0..BATCH_SIZE {
        let label: f32 = if i % 2 == 0 { 1.0 } else { -1.0 };
        for _ in 0..INPUT_DIM {
            points.push(label + rng.gen_range(-0.5..0.5));
        }
        labels.push(label);
    }

    let x = Tensor::from_data(TensorData::new(points, [BATCH_SIZE, INPUT_DIM]), device);
    let y = Tensor::from_data(TensorData::new(labels, [BATCH_SIZE, 1]), device);
    (x, y)
}

// ============================================================================
// Training Loop
// ============================================================================

pub fn run() -> Result<(), SpectralNormError> {
    let device = Default::default();
    let mut rng = rand::thread_rng();

    println!("=== Spectrally Normalized Critic ===");
    println!("MLP {INPUT_DIM} -> {HIDDEN_DIM} -> {HIDDEN_DIM} -> 1, Adam lr={LEARNING_RATE}");
    println!();

    let mut critic = Critic::<DemoBackend>::new(&device)?;
    let mut optim = AdamConfig::new().init();

    for epoch in 0..EPOCHS {
        let (x, y) = toy_batch::<DemoBackend, _>(&mut rng, &device);

        let scores = critic.forward(x, Mode::Training);
        let loss = (scores - y).powf_scalar(2.0).mean();
        let loss_value: f32 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &critic);
        critic = optim.step(LEARNING_RATE, critic, grads);

        if epoch % 5 == 0 || epoch + 1 == EPOCHS {
            let [s0, s1, s2] = critic.sigmas();
            println!(
                "epoch {:>3}  loss {:>8.4}  sigma [{:>7.4}, {:>7.4}, {:>7.4}]",
                epoch, loss_value, s0, s1, s2
            );
        }
    }

    // Inference must leave the singular vectors where training put them.
    let (x, _) = toy_batch::<DemoBackend, _>(&mut rng, &device);
    let u_before = critic.hidden_0.u().into_data();
    let scores = critic.forward(x.clone(), Mode::Inference);
    let unchanged = critic.hidden_0.u().into_data() == u_before;

    let evaluator = critic.valid();
    let inner_scores = evaluator.infer(x.inner());
    let diff: f32 = (scores.inner() - inner_scores).abs().max().into_scalar().elem();

    println!();
    println!("u unchanged by inference: {unchanged}");
    println!("autodiff vs. inner backend max |diff|: {diff:.2e}");

    Ok(())
}
