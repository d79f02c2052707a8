//! Spectral Norm Demos
//!
//! ```bash
//! # Spectrally normalized MLP critic on a toy two-cluster problem
//! cargo run --release -p demos -- critic
//!
//! # Conv2d layer in training and inference mode
//! cargo run --release -p demos -- conv
//!
//! # Same, on the GPU
//! cargo run --release -p demos --features wgpu -- critic
//! ```
#![recursion_limit = "256"]

mod conv;
mod critic;

use burn::backend::Autodiff;

#[cfg(not(feature = "wgpu"))]
pub(crate) type InnerBackend = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
pub(crate) type InnerBackend = burn::backend::Wgpu;

pub(crate) type DemoBackend = Autodiff<InnerBackend>;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        let result = match args[1].as_str() {
            "critic" => critic::run(),
            "conv" => conv::run(),
            _ => {
                println!("Unknown demo: {}", args[1]);
                println!();
                print_usage();
                return;
            }
        };

        if let Err(e) = result {
            eprintln!("Demo failed: {e}");
            std::process::exit(1);
        }
    } else {
        print_usage();
    }
}

fn print_usage() {
    println!("Usage: cargo run --release -p demos -- <demo>");
    println!();
    println!("=============================================================================");
    println!("                               DEMOS");
    println!("=============================================================================");
    println!();
    println!("  critic      3-layer spectrally normalized MLP trained with Adam");
    println!("              Toy data: two Gaussian-ish clusters labelled +1 / -1");
    println!("              Prints per-layer sigma estimates each epoch");
    println!();
    println!("  conv        Conv2d layer with 'same' padding on random images");
    println!("              Shows u/v moving in training mode only");
    println!();
    println!("  Build with --features wgpu to run on the GPU.");
}
