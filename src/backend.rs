//! Backend selection
//!
//! `ndarray` (CPU) is the default; building with `--features cuda` switches
//! training and inference to the CUDA backend. When both are enabled CUDA wins.

use burn::backend::Autodiff;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn::backend::Cuda;

#[cfg(all(feature = "ndarray", not(feature = "cuda")))]
pub type DefaultBackend = burn::backend::NdArray;

#[cfg(not(any(feature = "ndarray", feature = "cuda")))]
compile_error!("Enable the `ndarray` or `cuda` feature to select a backend.");

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }
    #[cfg(all(feature = "ndarray", not(feature = "cuda")))]
    {
        "NdArray (CPU)"
    }
    #[cfg(not(any(feature = "ndarray", feature = "cuda")))]
    {
        "none"
    }
}
