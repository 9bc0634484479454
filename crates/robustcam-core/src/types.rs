//! Core type definitions shared across the workspace.

use serde::{Deserialize, Serialize};

/// Default square input resolution fed to the classifier.
pub const DEFAULT_IMAGE_SIZE: usize = 224;

/// How decoded images are turned into channels before normalization.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Convert to luminance, then replicate to the requested channel count
    #[default]
    Grayscale,
    /// Keep RGB channels (requires 3 channels)
    Rgb,
}

impl std::fmt::Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorMode::Grayscale => write!(f, "grayscale"),
            ColorMode::Rgb => write!(f, "rgb"),
        }
    }
}

/// Image dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageDimensions {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Number of channels (1 or 3)
    pub channels: usize,
}

impl ImageDimensions {
    /// Creates new image dimensions
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Square image of the given side length
    pub fn square(size: usize, channels: usize) -> Self {
        Self::new(size, size, channels)
    }

    /// Number of values in a CHW buffer of these dimensions
    pub fn num_values(&self) -> usize {
        self.width * self.height * self.channels
    }

    /// Shape as `[channels, height, width]`
    pub fn chw(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

impl Default for ImageDimensions {
    fn default() -> Self {
        Self::square(DEFAULT_IMAGE_SIZE, 1)
    }
}
