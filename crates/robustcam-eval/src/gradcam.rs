//! Grad-CAM heatmaps for a named target layer.
//!
//! For every sample the target-layer activation is detached from the batch
//! graph and re-attached as a leaf, so each backward pass builds and consumes
//! its own graph. The heatmap math runs on the host:
//!
//! ```text
//! w_c = mean_hw(dScore/dA_c)
//! map = relu(sum_c w_c * A_c) / (max + eps)
//! ```

use std::path::{Path, PathBuf};

use burn::tensor::{backend::AutodiffBackend, Tensor};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use robustcam_core::{Error, GradCamConfig, Result};
use robustcam_data::{GaussianNoise, ImagePreprocessor, TestLoader};
use tracing::{debug, info};

use crate::capture::{ActivationCapture, FeatureMap};
use crate::colormap::jet;
use crate::evaluator::argmax;
use crate::model::CamModel;

/// A normalized class activation map with values in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl Heatmap {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major values
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Bilinear resize
    pub fn resize(&self, width: usize, height: usize) -> Result<Heatmap> {
        let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(self.width as u32, self.height as u32, self.values.clone())
                .ok_or_else(|| Error::Image("heatmap buffer size mismatch".to_string()))?;

        let resized = imageops::resize(&buffer, width as u32, height as u32, FilterType::Triangle);
        Ok(Heatmap {
            width,
            height,
            values: resized.into_raw(),
        })
    }

    /// Quantizes to `floor(255 * v)`
    pub fn to_u8(&self) -> Vec<u8> {
        self.values
            .iter()
            .map(|v| (255.0 * v).floor().clamp(0.0, 255.0) as u8)
            .collect()
    }

    /// Jet-colored image of the heatmap
    pub fn colorize(&self) -> RgbImage {
        let quantized = self.to_u8();
        let width = self.width;
        RgbImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            jet(quantized[y as usize * width + x as usize])
        })
    }
}

/// Combines a target-layer activation with its gradient into a heatmap
pub fn compute_heatmap(
    activation: &FeatureMap,
    gradient: &FeatureMap,
    epsilon: f32,
) -> Result<Heatmap> {
    if activation.dims() != gradient.dims() {
        return Err(Error::Model(format!(
            "activation {:?} and gradient {:?} shapes differ",
            activation.dims(),
            gradient.dims()
        )));
    }

    let [channels, height, width] = activation.dims();
    let plane = height * width;
    if plane == 0 {
        return Err(Error::Model("empty feature map".to_string()));
    }

    let mut values = vec![0.0f32; plane];
    for c in 0..channels {
        let weight = gradient.channel(c).iter().sum::<f32>() / plane as f32;
        for (value, a) in values.iter_mut().zip(activation.channel(c)) {
            *value += weight * a;
        }
    }

    let max = values.iter_mut().fold(0.0f32, |max, v| {
        *v = v.max(0.0);
        max.max(*v)
    });
    for v in values.iter_mut() {
        *v /= max + epsilon;
    }

    Ok(Heatmap {
        width,
        height,
        values,
    })
}

/// Blends a colored heatmap over an input image
pub fn overlay(base: &RgbImage, heat: &RgbImage, alpha: f32) -> RgbImage {
    let alpha = alpha.clamp(0.0, 1.0);
    RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let b = base.get_pixel(x, y);
        let h = heat.get_pixel(x, y);
        let mix = |i: usize| (alpha * h[i] as f32 + (1.0 - alpha) * b[i] as f32).round() as u8;
        Rgb([mix(0), mix(1), mix(2)])
    })
}

/// Rebuilds a displayable image from one normalized `[c, h, w]` sample
fn input_image(
    values: &[f32],
    [channels, height, width]: [usize; 3],
    preprocessor: &ImagePreprocessor,
) -> RgbImage {
    let plane = height * width;
    let pixel = |c: usize, index: usize| {
        (preprocessor.denormalize_value(values[c * plane + index]) * 255.0).round() as u8
    };

    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let index = y as usize * width + x as usize;
        if channels >= 3 {
            Rgb([pixel(0, index), pixel(1, index), pixel(2, index)])
        } else {
            let v = pixel(0, index);
            Rgb([v, v, v])
        }
    })
}

/// Output file for a sample
pub fn heatmap_path(output_dir: &Path, index: usize, class_name: &str) -> PathBuf {
    output_dir.join(format!("gradcam_sample_{index}_class_{class_name}.png"))
}

/// Grad-CAM run options
#[derive(Debug, Clone)]
pub struct GradCamOptions {
    pub target_layer: String,
    pub output_dir: PathBuf,
    pub epsilon: f32,
    pub overlay_alpha: Option<f32>,
}

impl From<&GradCamConfig> for GradCamOptions {
    fn from(config: &GradCamConfig) -> Self {
        Self {
            target_layer: config.target_layer.clone(),
            output_dir: config.output_dir.clone(),
            epsilon: config.epsilon,
            overlay_alpha: config.overlay_alpha,
        }
    }
}

/// One written heatmap
#[derive(Debug, Clone)]
pub struct GradCamRecord {
    /// Position in the test set
    pub index: usize,
    /// True class
    pub label: usize,
    /// Predicted class, the one explained
    pub predicted: usize,
    pub path: PathBuf,
}

/// Grad-CAM explainer
pub struct GradCam {
    options: GradCamOptions,
    progress: Option<Box<dyn Fn(usize)>>,
}

impl GradCam {
    pub fn new(options: GradCamOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    /// Called with the number of samples after each batch
    pub fn with_progress(mut self, progress: impl Fn(usize) + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn options(&self) -> &GradCamOptions {
        &self.options
    }

    /// Writes one heatmap per test sample, explaining the predicted class
    pub fn explain<B, M>(
        &self,
        model: &M,
        loader: &TestLoader<B>,
        noise: &mut GaussianNoise,
        noise_multiplier: f64,
    ) -> Result<Vec<GradCamRecord>>
    where
        B: AutodiffBackend,
        M: CamModel<B>,
    {
        let layer = self.options.target_layer.as_str();
        if !model.layer_names().contains(&layer) {
            return Err(Error::Model(format!(
                "unknown target layer '{layer}' (available: {})",
                model.layer_names().join(", ")
            )));
        }

        std::fs::create_dir_all(&self.options.output_dir)?;
        info!(
            "Grad-CAM on layer '{}' for {} samples, writing to {}",
            layer,
            loader.num_samples(),
            self.options.output_dir.display()
        );

        let classes = loader.classes();
        let preprocessor = loader.dataset().preprocessor();
        let mut capture = ActivationCapture::new();
        let mut records = Vec::with_capacity(loader.num_samples());

        for batch in loader.batches() {
            let batch = batch?;
            let images = noise.apply(batch.images, noise_multiplier)?;
            let [_, channels, height, width] = images.dims();
            let features = model.forward_features(images.clone(), layer)?.detach();

            for (i, &label) in batch.labels.iter().enumerate() {
                let sample: Tensor<B, 4> = features.clone().slice([i..i + 1]).require_grad();
                capture.record_activation(FeatureMap::from_sample(sample.clone().inner())?);

                let logits = model.forward_head(sample.clone(), layer)?;
                let scores: Vec<f32> = logits.clone().into_data().iter::<f32>().collect();
                let predicted = argmax(&scores);
                let class_name = classes.get(predicted).ok_or_else(|| {
                    Error::Model(format!(
                        "predicted class {predicted} but the test set has {} classes",
                        classes.len()
                    ))
                })?;

                let grads = logits
                    .slice([0..1, predicted..predicted + 1])
                    .sum()
                    .backward();
                let gradient = sample.grad(&grads).ok_or_else(|| {
                    Error::Model(format!("no gradient reached layer '{layer}'"))
                })?;
                capture.record_gradient(FeatureMap::from_sample(gradient)?);

                let (activation, gradient) = capture.latest()?;
                let heatmap =
                    compute_heatmap(activation, gradient, self.options.epsilon)?.resize(width, height)?;

                let mut output = heatmap.colorize();
                if let Some(alpha) = self.options.overlay_alpha {
                    let input: Vec<f32> = images
                        .clone()
                        .slice([i..i + 1])
                        .into_data()
                        .iter::<f32>()
                        .collect();
                    let base = input_image(&input, [channels, height, width], preprocessor);
                    output = overlay(&base, &output, alpha);
                }

                let index = records.len();
                let path = heatmap_path(&self.options.output_dir, index, class_name);
                output.save(&path)?;
                debug!(
                    "Sample {} (label {}, predicted {}) -> {}",
                    index,
                    label,
                    predicted,
                    path.display()
                );

                records.push(GradCamRecord {
                    index,
                    label,
                    predicted,
                    path,
                });
            }

            capture.clear();
            if let Some(progress) = &self.progress {
                progress(batch.labels.len());
            }
        }

        info!("Wrote {} Grad-CAM images", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CamCnn, CamCnnConfig};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::Rgb as RgbPixel;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use robustcam_core::DataConfig;
    use std::fs;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn map(channels: usize, values: Vec<f32>) -> FeatureMap {
        let side = ((values.len() / channels) as f64).sqrt() as usize;
        FeatureMap::new(channels, side, side, values).unwrap()
    }

    #[test]
    fn test_heatmap_in_unit_range() {
        let activation = map(2, vec![1.0, 2.0, 3.0, 4.0, -1.0, 0.5, 2.0, 0.0]);
        let gradient = map(2, vec![0.1, 0.2, 0.3, 0.4, -0.2, -0.2, -0.2, -0.2]);

        let heatmap = compute_heatmap(&activation, &gradient, 1e-8).unwrap();
        assert_eq!(heatmap.values().len(), 4);
        assert!(heatmap.values().iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((heatmap.max() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_random_pairs_stay_in_unit_range() {
        for seed in [0u64, 1, 7, 42, 1234] {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for _ in 0..20 {
                let channels = rng.gen_range(1..=6);
                let height = rng.gen_range(1..=9);
                let width = rng.gen_range(1..=9);
                let len = channels * height * width;

                let activation: Vec<f32> = (0..len).map(|_| rng.gen_range(-10.0..10.0)).collect();
                let gradient: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
                let activation = FeatureMap::new(channels, height, width, activation).unwrap();
                let gradient = FeatureMap::new(channels, height, width, gradient).unwrap();

                let heatmap = compute_heatmap(&activation, &gradient, 1e-8).unwrap();
                assert_eq!(heatmap.values().len(), height * width);
                assert!(heatmap
                    .values()
                    .iter()
                    .all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
            }
        }
    }

    #[test]
    fn test_heatmap_weights_by_mean_gradient() {
        // Weights 0.5 and 0: only the first channel contributes
        let activation = map(2, vec![0.0, 1.0, 2.0, 4.0, 9.0, 9.0, 9.0, 9.0]);
        let gradient = map(2, vec![0.5, 0.5, 0.5, 0.5, 1.0, -1.0, 1.0, -1.0]);

        let heatmap = compute_heatmap(&activation, &gradient, 0.0).unwrap();
        assert_eq!(heatmap.values(), &[0.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_zero_activation_gives_zero_heatmap() {
        let activation = map(3, vec![0.0; 12]);
        let gradient = map(3, vec![1.0; 12]);

        let heatmap = compute_heatmap(&activation, &gradient, 1e-8).unwrap();
        assert!(heatmap.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_negative_map_clamped_to_zero() {
        let activation = map(1, vec![1.0, 2.0, 3.0, 4.0]);
        let gradient = map(1, vec![-1.0; 4]);

        let heatmap = compute_heatmap(&activation, &gradient, 1e-8).unwrap();
        assert!(heatmap.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_resize_and_quantize() {
        let activation = map(1, vec![0.0, 1.0, 1.0, 0.0]);
        let gradient = map(1, vec![1.0; 4]);
        let heatmap = compute_heatmap(&activation, &gradient, 0.0)
            .unwrap()
            .resize(16, 16)
            .unwrap();

        assert_eq!(heatmap.width(), 16);
        assert_eq!(heatmap.values().len(), 256);
        assert!(heatmap.values().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(heatmap.colorize().dimensions(), (16, 16));

        let quantized = Heatmap {
            width: 3,
            height: 1,
            values: vec![0.0, 0.5, 1.0],
        }
        .to_u8();
        assert_eq!(quantized, vec![0, 127, 255]);
    }

    #[test]
    fn test_overlay_blend() {
        let base = RgbImage::from_pixel(2, 2, RgbPixel([0, 0, 0]));
        let heat = RgbImage::from_pixel(2, 2, RgbPixel([200, 100, 50]));

        let blended = overlay(&base, &heat, 0.5);
        assert_eq!(blended.get_pixel(1, 1), &RgbPixel([100, 50, 25]));
    }

    #[test]
    fn test_explain_writes_one_file_per_sample() {
        let data_dir = TempDir::new().unwrap();
        for (class, value) in [("healthy", 30u8), ("sick", 220u8)] {
            let dir = data_dir.path().join(class);
            fs::create_dir(&dir).unwrap();
            for i in 0..2 {
                ImageBuffer::from_pixel(20, 20, RgbPixel([value, value / 2, 10]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }

        let device = Default::default();
        let data_config = DataConfig {
            test_dir: data_dir.path().to_path_buf(),
            image_size: 32,
            batch_size: 3,
            ..DataConfig::default()
        };
        let loader = TestLoader::<TestBackend>::from_config(&data_config, &device).unwrap();
        let model = CamCnn::<TestBackend>::new(
            &CamCnnConfig::new(2).with_base_filters(2).with_hidden_size(4),
            &device,
        );

        let out_dir = TempDir::new().unwrap();
        let explainer = GradCam::new(GradCamOptions {
            target_layer: "conv3".to_string(),
            output_dir: out_dir.path().join("cams"),
            epsilon: 1e-8,
            overlay_alpha: Some(0.4),
        });
        let mut noise = GaussianNoise::new(0.0, 0.1, 1).unwrap();

        let records = explainer.explain(&model, &loader, &mut noise, 0.5).unwrap();

        assert_eq!(records.len(), 4);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.index, i);
            assert!(record.path.exists());
            let written = image::open(&record.path).unwrap();
            assert_eq!((written.width(), written.height()), (32, 32));
        }
        assert_eq!(records[0].label, 0);
        assert_eq!(records[3].label, 1);
    }

    #[test]
    fn test_explain_unknown_layer() {
        let data_dir = TempDir::new().unwrap();
        let dir = data_dir.path().join("only");
        fs::create_dir(&dir).unwrap();
        RgbImage::from_pixel(8, 8, RgbPixel([1, 2, 3]))
            .save(dir.join("a.png"))
            .unwrap();

        let device = Default::default();
        let data_config = DataConfig {
            test_dir: data_dir.path().to_path_buf(),
            image_size: 16,
            ..DataConfig::default()
        };
        let loader = TestLoader::<TestBackend>::from_config(&data_config, &device).unwrap();
        let model = CamCnn::<TestBackend>::new(
            &CamCnnConfig::new(1).with_base_filters(2).with_hidden_size(4),
            &device,
        );

        let explainer = GradCam::new(GradCamOptions {
            target_layer: "layer5".to_string(),
            output_dir: data_dir.path().join("out"),
            epsilon: 1e-8,
            overlay_alpha: None,
        });
        let mut noise = GaussianNoise::new(0.0, 0.1, 1).unwrap();

        let result = explainer.explain(&model, &loader, &mut noise, 0.0);
        assert!(matches!(result, Err(Error::Model(_))));
    }
}
