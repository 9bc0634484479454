//! Test-set loading, preprocessing and noise injection.
//!
//! This crate turns a `root/<class_name>/<image>` directory tree into ordered
//! burn batches and perturbs them with clamped Gaussian noise.

pub mod dataset;
pub mod loader;
pub mod noise;
pub mod preprocess;

pub use dataset::{ImageBatch, ImageBatcher, ImageFolderDataset, ImageItem, TestLoader};
pub use loader::{ImageFolder, IMAGE_EXTENSIONS};
pub use noise::GaussianNoise;
pub use preprocess::{ImagePreprocessor, PreprocessConfig};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dataset::*;
    pub use crate::loader::*;
    pub use crate::noise::*;
    pub use crate::preprocess::*;
}
