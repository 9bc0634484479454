//! Backend selection for the Burn framework.
//!
//! Evaluation runs on the plain ndarray backend (no gradient tracking);
//! Grad-CAM needs gradients and runs on the autodiff wrapper of the same
//! backend.

use burn::backend::{Autodiff, NdArray};
use burn::tensor::backend::Backend;

/// Backend used for inference-only evaluation
pub type DefaultBackend = NdArray;

/// Backend used for Grad-CAM (gradient tracking enabled)
pub type ExplainBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as Backend>::Device {
    Default::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    "NdArray (CPU)"
}
