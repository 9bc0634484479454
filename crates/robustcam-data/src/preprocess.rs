//! Image preprocessing: channel conversion, resize and normalization.
//!
//! Output is a flattened CHW `Vec<f32>` normalized with mean 0.5 and std 0.5,
//! so pixel values land in `[-1, 1]`.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use robustcam_core::{ColorMode, DataConfig, Error, ImageDimensions, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for image preprocessing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Target image dimensions (channels is 1 or 3)
    pub target_size: ImageDimensions,
    /// Channel conversion
    pub color_mode: ColorMode,
    /// Per-channel normalization mean
    pub mean: f32,
    /// Per-channel normalization standard deviation
    pub std: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: ImageDimensions::default(),
            color_mode: ColorMode::Grayscale,
            mean: 0.5,
            std: 0.5,
        }
    }
}

impl PreprocessConfig {
    /// Derives preprocessing from the data section of the run config
    pub fn from_data_config(config: &DataConfig) -> Self {
        Self {
            target_size: config.dimensions(),
            color_mode: config.color_mode,
            ..Self::default()
        }
    }
}

/// Image preprocessor
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    /// Creates a preprocessor, rejecting channel counts other than 1 or 3
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        let channels = config.target_size.channels;
        if !matches!(channels, 1 | 3) {
            return Err(Error::InvalidArgument(format!(
                "channel count must be 1 or 3, got {channels}"
            )));
        }
        if config.color_mode == ColorMode::Rgb && channels != 3 {
            return Err(Error::InvalidArgument(
                "rgb color mode requires 3 channels".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Shape of a preprocessed sample as `[channels, height, width]`
    pub fn output_shape(&self) -> [usize; 3] {
        self.config.target_size.chw()
    }

    /// Preprocesses a decoded image for model input
    pub fn preprocess(&self, image: &DynamicImage) -> Vec<f32> {
        let width = self.config.target_size.width as u32;
        let height = self.config.target_size.height as u32;

        match self.config.color_mode {
            ColorMode::Grayscale => {
                let gray = luma_601(image);
                let resized = image::imageops::resize(&gray, width, height, FilterType::Triangle);
                self.normalize_gray(&resized)
            }
            ColorMode::Rgb => {
                let rgb = image.to_rgb8();
                let resized = image::imageops::resize(&rgb, width, height, FilterType::Triangle);
                self.normalize_rgb(&resized)
            }
        }
    }

    /// Loads and preprocesses an image file
    pub fn preprocess_from_path(&self, path: &Path) -> Result<Vec<f32>> {
        let image = image::open(path)
            .map_err(|e| Error::Image(format!("Failed to load image {}: {}", path.display(), e)))?;

        Ok(self.preprocess(&image))
    }

    /// Maps a normalized value back to `[0, 1]`
    pub fn denormalize_value(&self, value: f32) -> f32 {
        (value * self.config.std + self.config.mean).clamp(0.0, 1.0)
    }

    fn normalize(&self, byte: u8) -> f32 {
        (byte as f32 / 255.0 - self.config.mean) / self.config.std
    }

    /// Luminance plane replicated once per output channel
    fn normalize_gray(&self, image: &GrayImage) -> Vec<f32> {
        let plane: Vec<f32> = image.pixels().map(|p| self.normalize(p[0])).collect();
        let channels = self.config.target_size.channels;

        let mut normalized = Vec::with_capacity(plane.len() * channels);
        for _ in 0..channels {
            normalized.extend_from_slice(&plane);
        }
        normalized
    }

    fn normalize_rgb(&self, image: &RgbImage) -> Vec<f32> {
        let (width, height) = image.dimensions();
        let plane = (width * height) as usize;
        let mut normalized = vec![0.0f32; plane * 3];

        for (index, pixel) in image.pixels().enumerate() {
            for channel in 0..3 {
                normalized[channel * plane + index] = self.normalize(pixel[channel]);
            }
        }
        normalized
    }
}

/// Converts to 8-bit luminance with ITU-R 601-2 weights
///
/// `L = (299 R + 587 G + 114 B) / 1000` in 16-bit fixed point with rounding,
/// the same integer result Pillow's `convert("L")` gives. Alpha is ignored.
pub fn luma_601(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        image::Luma([luma as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn preprocessor(channels: usize, color_mode: ColorMode) -> ImagePreprocessor {
        ImagePreprocessor::new(PreprocessConfig {
            target_size: ImageDimensions::square(224, channels),
            color_mode,
            ..PreprocessConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_channel_count() {
        let config = PreprocessConfig {
            target_size: ImageDimensions::square(224, 2),
            ..PreprocessConfig::default()
        };
        assert!(ImagePreprocessor::new(config).is_err());
    }

    #[test]
    fn test_grayscale_output_shape_and_range() {
        let preprocessor = preprocessor(1, ColorMode::Grayscale);
        let img = ImageBuffer::from_fn(10, 20, |x, _| Rgb([(x * 25) as u8, 0u8, 0u8]));

        let values = preprocessor.preprocess(&DynamicImage::ImageRgb8(img));
        assert_eq!(values.len(), 224 * 224);
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_uniform_extremes_map_to_unit_bounds() {
        let preprocessor = preprocessor(1, ColorMode::Grayscale);

        let black = ImageBuffer::from_pixel(8, 8, Rgb([0u8, 0, 0]));
        let white = ImageBuffer::from_pixel(8, 8, Rgb([255u8, 255, 255]));

        let black = preprocessor.preprocess(&DynamicImage::ImageRgb8(black));
        let white = preprocessor.preprocess(&DynamicImage::ImageRgb8(white));

        assert!(black.iter().all(|v| (*v + 1.0).abs() < 1e-6));
        assert!(white.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_grayscale_replicated_to_three_channels() {
        let preprocessor = preprocessor(3, ColorMode::Grayscale);
        let img = ImageBuffer::from_fn(16, 16, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 40u8]));

        let values = preprocessor.preprocess(&DynamicImage::ImageRgb8(img));
        let plane = 224 * 224;
        assert_eq!(values.len(), 3 * plane);
        assert_eq!(&values[..plane], &values[plane..2 * plane]);
        assert_eq!(&values[..plane], &values[2 * plane..]);
    }

    #[test]
    fn test_rgb_keeps_channels_apart() {
        let preprocessor = preprocessor(3, ColorMode::Rgb);
        let img = ImageBuffer::from_pixel(4, 4, Rgb([255u8, 0u8, 0u8]));

        let values = preprocessor.preprocess(&DynamicImage::ImageRgb8(img));
        let plane = 224 * 224;
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!((values[plane] + 1.0).abs() < 1e-6);
        assert!((values[2 * plane] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_luma_uses_601_weights() {
        let pixel = |rgb: [u8; 3]| {
            let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(1, 1, Rgb(rgb)));
            luma_601(&img).get_pixel(0, 0)[0]
        };

        assert_eq!(pixel([255, 0, 0]), 76);
        assert_eq!(pixel([0, 255, 0]), 150);
        assert_eq!(pixel([0, 0, 255]), 29);
        assert_eq!(pixel([255, 255, 255]), 255);
        assert_eq!(pixel([90, 90, 90]), 90);
    }

    #[test]
    fn test_red_image_reaches_model_with_601_luma() {
        let preprocessor = preprocessor(1, ColorMode::Grayscale);
        let img = ImageBuffer::from_pixel(8, 8, Rgb([255u8, 0, 0]));

        let values = preprocessor.preprocess(&DynamicImage::ImageRgb8(img));
        let expected = (76.0 / 255.0 - 0.5) / 0.5;
        assert!(values.iter().all(|v| (v - expected).abs() < 1e-6));
    }

    #[test]
    fn test_denormalize_value() {
        let preprocessor = preprocessor(1, ColorMode::Grayscale);
        assert_eq!(preprocessor.denormalize_value(-1.0), 0.0);
        assert_eq!(preprocessor.denormalize_value(1.0), 1.0);
        assert_eq!(preprocessor.denormalize_value(3.0), 1.0);
    }
}
