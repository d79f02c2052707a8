//! Cross-thread access to a single layer.
//!
//! A training-mode forward pass rewrites the layer's singular vectors, so two
//! threads must never run one concurrently on the same instance. Burn modules
//! are `Send` but not `Sync`, so the wrapper is a `Mutex`.

use parking_lot::Mutex;
use std::sync::Arc;

/// A layer shared between threads.
pub type SharedLayer<L> = Arc<Mutex<L>>;

/// Wrap a layer for shared use.
pub fn shared_layer<L>(layer: L) -> SharedLayer<L> {
    Arc::new(Mutex::new(layer))
}
