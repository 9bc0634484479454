//! Additive Gaussian noise for robustness sweeps.

use burn::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use robustcam_core::{Error, NoiseConfig, Result};

/// Seeded Gaussian noise source
///
/// Each call to [`GaussianNoise::apply`] draws fresh samples from the same
/// generator, so a sweep is reproducible for a given seed.
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    mean: f64,
    std: f64,
    rng: ChaCha8Rng,
}

impl GaussianNoise {
    pub fn new(mean: f64, std: f64, seed: u64) -> Result<Self> {
        if !mean.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "noise mean must be finite, got {mean}"
            )));
        }
        if !std.is_finite() || std < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "noise std must be finite and >= 0, got {std}"
            )));
        }

        Ok(Self {
            mean,
            std,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn from_config(config: &NoiseConfig) -> Result<Self> {
        Self::new(config.mean, config.std, config.seed)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    /// Adds `N(mean, std * multiplier)` to every element and clamps to `[0, 1]`
    ///
    /// A zero multiplier returns `images` untouched.
    pub fn apply<B: Backend>(
        &mut self,
        images: Tensor<B, 4>,
        multiplier: f64,
    ) -> Result<Tensor<B, 4>> {
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "noise multiplier must be finite and >= 0, got {multiplier}"
            )));
        }
        if multiplier == 0.0 {
            return Ok(images);
        }

        let normal = Normal::new(self.mean, self.std * multiplier)
            .map_err(|e| Error::InvalidArgument(format!("invalid noise distribution: {e}")))?;

        let device = images.device();
        let dims = images.dims();
        let noisy: Vec<f32> = images
            .into_data()
            .iter::<f32>()
            .map(|x| (x as f64 + normal.sample(&mut self.rng)).clamp(0.0, 1.0) as f32)
            .collect();

        Ok(Tensor::from_floats(TensorData::new(noisy, dims), &device))
    }
}
