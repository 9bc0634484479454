//! Configuration structures for evaluation and explanation runs.

use crate::error::{Error, Result};
use crate::types::{ColorMode, ImageDimensions, DEFAULT_IMAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration, usually read from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustnessConfig {
    /// Test set configuration
    pub data: DataConfig,
    /// Gaussian noise parameters
    pub noise: NoiseConfig,
    /// Evaluation outputs
    pub evaluation: EvaluationConfig,
    /// Grad-CAM outputs
    pub gradcam: GradCamConfig,
    /// Model loading
    pub model: ModelConfig,
}

impl RobustnessConfig {
    /// Checks every section for values the runs cannot work with
    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        self.noise.validate()?;
        self.gradcam.validate()?;
        Ok(())
    }
}

/// Test set configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root directory, one sub-directory per class
    pub test_dir: PathBuf,
    /// Number of channels fed to the model (1 or 3)
    pub channels: usize,
    /// Square side length images are resized to
    pub image_size: usize,
    /// Samples per forward pass
    pub batch_size: usize,
    /// Channel conversion applied before normalization
    pub color_mode: ColorMode,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            test_dir: PathBuf::from("test"),
            channels: 1,
            image_size: DEFAULT_IMAGE_SIZE,
            batch_size: 32,
            color_mode: ColorMode::Grayscale,
        }
    }
}

impl DataConfig {
    /// Dimensions of a preprocessed sample
    pub fn dimensions(&self) -> ImageDimensions {
        ImageDimensions::square(self.image_size, self.channels)
    }

    /// Validates channel count, sizes and color mode
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.channels, 1 | 3) {
            return Err(Error::Config(format!(
                "channels must be 1 or 3, got {}",
                self.channels
            )));
        }
        if self.color_mode == ColorMode::Rgb && self.channels != 3 {
            return Err(Error::Config(
                "rgb color mode requires 3 channels".to_string(),
            ));
        }
        if self.image_size == 0 {
            return Err(Error::Config("image_size must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Gaussian noise parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Mean added to every noise sample
    pub mean: f64,
    /// Standard deviation before the multiplier is applied
    pub std: f64,
    /// Noise levels to evaluate, in order
    pub multipliers: Vec<f64>,
    /// Seed for the noise generator
    pub seed: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            mean: 0.0,
            std: 0.1,
            multipliers: vec![0.0],
            seed: 42,
        }
    }
}

impl NoiseConfig {
    /// Validates std and multipliers
    pub fn validate(&self) -> Result<()> {
        if !self.std.is_finite() || self.std < 0.0 {
            return Err(Error::Config(format!(
                "noise std must be finite and >= 0, got {}",
                self.std
            )));
        }
        if !self.mean.is_finite() {
            return Err(Error::Config("noise mean must be finite".to_string()));
        }
        if let Some(bad) = self
            .multipliers
            .iter()
            .find(|m| !m.is_finite() || **m < 0.0)
        {
            return Err(Error::Config(format!(
                "noise multipliers must be finite and >= 0, got {bad}"
            )));
        }
        Ok(())
    }
}

/// Evaluation output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Confusion matrix image (overwritten per run)
    pub confusion_matrix_path: PathBuf,
    /// Cumulative metrics table (appended per run)
    pub metrics_path: PathBuf,
    /// TrueType font used for plot text; system fonts are searched when unset
    pub font_path: Option<PathBuf>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            confusion_matrix_path: PathBuf::from("out/cnn_confusion_matrix.png"),
            metrics_path: PathBuf::from("out/metrics_noise_cnn.csv"),
            font_path: None,
        }
    }
}

/// Grad-CAM settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradCamConfig {
    /// Directory receiving one image per sample
    pub output_dir: PathBuf,
    /// Name of the convolutional layer to explain
    pub target_layer: String,
    /// Guard added to the heatmap maximum before dividing
    pub epsilon: f32,
    /// Blend factor for drawing the heatmap over the input image
    pub overlay_alpha: Option<f32>,
}

impl Default for GradCamConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out/gradcam/"),
            target_layer: "conv4".to_string(),
            epsilon: 1e-8,
            overlay_alpha: None,
        }
    }
}

impl GradCamConfig {
    /// Validates epsilon and overlay alpha
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon > 0.0) {
            return Err(Error::Config(format!(
                "epsilon must be > 0, got {}",
                self.epsilon
            )));
        }
        if let Some(alpha) = self.overlay_alpha {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(Error::Config(format!(
                    "overlay_alpha must be within [0, 1], got {alpha}"
                )));
            }
        }
        if self.target_layer.is_empty() {
            return Err(Error::Config("target_layer must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Model loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Burn record file of the trained classifier
    pub checkpoint: Option<PathBuf>,
    /// Filters in the first convolution of the reference CNN
    pub base_filters: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            checkpoint: None,
            base_filters: 32,
        }
    }
}
