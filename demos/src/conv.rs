//! Conv2d layer walkthrough on random channels-last images.

use burn::prelude::*;
use burn::tensor::Distribution;

use spectral_norm::{Mode, Padding, SpectralNormConv2dConfig, SpectralNormError};

use crate::InnerBackend;

pub fn run() -> Result<(), SpectralNormError> {
    let device = Default::default();

    println!("=== Spectrally Normalized Conv2d ===");

    let mut conv = SpectralNormConv2dConfig::new()
        .with_padding(Padding::Same)
        .init_random::<InnerBackend>([3, 3], 3, 8, &device)?;
    let mut strided = SpectralNormConv2dConfig::new()
        .with_padding(Padding::Same)
        .with_strides([2, 2])
        .init_random::<InnerBackend>([4, 4], 8, 16, &device)?;

    let images = Tensor::<InnerBackend, 4>::random([4, 16, 16, 3], Distribution::Normal(0.0, 1.0), &device);
    println!("input           {:?}", images.dims());

    for step in 0..5 {
        let features = conv.forward(images.clone(), Mode::Training);
        let pooled = strided.forward(features, Mode::Training);
        println!(
            "train step {}    {:?}  sigma {:.4} / {:.4}",
            step,
            pooled.dims(),
            conv.sigma(),
            strided.sigma()
        );
    }

    let v_before = conv.v().into_data();
    let features = conv.forward(images, Mode::Inference);
    let pooled = strided.infer(features.clone());

    println!("inference       {:?} -> {:?}", features.dims(), pooled.dims());
    println!("v unchanged by inference: {}", conv.v().into_data() == v_before);

    Ok(())
}
