//! Host-side logs of target-layer activations and gradients.

use burn::tensor::{backend::Backend, Tensor};
use robustcam_core::{Error, Result};

/// A single sample's feature map with shape `[channels, height, width]`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    channels: usize,
    height: usize,
    width: usize,
    values: Vec<f32>,
}

impl FeatureMap {
    pub fn new(channels: usize, height: usize, width: usize, values: Vec<f32>) -> Result<Self> {
        if values.len() != channels * height * width {
            return Err(Error::InvalidArgument(format!(
                "feature map [{channels}, {height}, {width}] needs {} values, got {}",
                channels * height * width,
                values.len()
            )));
        }
        Ok(Self {
            channels,
            height,
            width,
            values,
        })
    }

    /// Copies a `[1, channels, height, width]` tensor to the host
    pub fn from_sample<B: Backend>(tensor: Tensor<B, 4>) -> Result<Self> {
        let [batch, channels, height, width] = tensor.dims();
        if batch != 1 {
            return Err(Error::Model(format!(
                "expected a single-sample feature map, got batch of {batch}"
            )));
        }
        let values = tensor.into_data().iter::<f32>().collect();
        Self::new(channels, height, width, values)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Row-major plane of channel `c`
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.values[c * plane..(c + 1) * plane]
    }
}

/// Ordered activation and gradient logs for one explain call
///
/// Both logs grow in the order the passes happen; the explainer reads the
/// most recent pair and clears the logs between batches.
#[derive(Debug, Default)]
pub struct ActivationCapture {
    activations: Vec<FeatureMap>,
    gradients: Vec<FeatureMap>,
}

impl ActivationCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_activation(&mut self, activation: FeatureMap) {
        self.activations.push(activation);
    }

    pub fn record_gradient(&mut self, gradient: FeatureMap) {
        self.gradients.push(gradient);
    }

    pub fn activations(&self) -> &[FeatureMap] {
        &self.activations
    }

    pub fn gradients(&self) -> &[FeatureMap] {
        &self.gradients
    }

    /// Latest activation with the latest gradient, checked for matching shapes
    pub fn latest(&self) -> Result<(&FeatureMap, &FeatureMap)> {
        let activation = self
            .activations
            .last()
            .ok_or_else(|| Error::Model("no activation captured".to_string()))?;
        let gradient = self
            .gradients
            .last()
            .ok_or_else(|| Error::Model("no gradient captured".to_string()))?;

        if activation.dims() != gradient.dims() {
            return Err(Error::Model(format!(
                "activation {:?} and gradient {:?} shapes differ",
                activation.dims(),
                gradient.dims()
            )));
        }
        Ok((activation, gradient))
    }

    pub fn clear(&mut self) {
        self.activations.clear();
        self.gradients.clear();
    }
}
