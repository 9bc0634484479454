//! Classifier contracts and the reference CNN.
//!
//! Evaluation only needs [`ImageClassifier`]. Grad-CAM additionally needs a
//! model that can be split at a named layer, which is what [`CamModel`]
//! provides.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};
// The `Result` alias stays qualified: `#[derive(Config)]` expands to the
// two-parameter std `Result`.
use robustcam_core::Error;
use tracing::info;

/// A model mapping `[batch, channels, height, width]` images to class logits
pub trait ImageClassifier<B: Backend> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

/// A classifier that can be split at a named layer
///
/// `forward_head(forward_features(x, layer), layer)` must equal `forward(x)`.
pub trait CamModel<B: Backend>: ImageClassifier<B> {
    /// Layers that can be used as Grad-CAM targets
    fn layer_names(&self) -> &'static [&'static str];

    /// Runs the network up to and including `layer`
    fn forward_features(
        &self,
        images: Tensor<B, 4>,
        layer: &str,
    ) -> robustcam_core::Result<Tensor<B, 4>>;

    /// Runs the rest of the network on the output of `layer`
    fn forward_head(
        &self,
        features: Tensor<B, 4>,
        layer: &str,
    ) -> robustcam_core::Result<Tensor<B, 2>>;
}

/// Layer names exposed by [`CamCnn`], in forward order
pub const CAM_CNN_LAYERS: [&str; 4] = ["conv1", "conv2", "conv3", "conv4"];

/// Configuration for the reference CNN
#[derive(Config, Debug)]
pub struct CamCnnConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Number of input channels
    #[config(default = "1")]
    pub in_channels: usize,

    /// Base number of convolutional filters
    #[config(default = "32")]
    pub base_filters: usize,

    /// Width of the hidden classifier layer
    #[config(default = "256")]
    pub hidden_size: usize,
}

/// Conv2d followed by ReLU and 2x2 max pooling
///
/// The Grad-CAM target for a block is the raw convolution output.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.activate(self.conv.forward(x))
    }

    /// ReLU and pooling applied to a convolution output
    pub fn activate(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pool.forward(self.relu.forward(x))
    }
}

/// Four-block CNN classifier
///
/// Contains no batch norm or dropout, so it behaves identically on the
/// autodiff backend used for Grad-CAM.
#[derive(Module, Debug)]
pub struct CamCnn<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,

    pub global_pool: AdaptiveAvgPool2d,

    pub fc1: Linear<B>,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> CamCnn<B> {
    pub fn new(config: &CamCnnConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        Self {
            conv1: ConvBlock::new(config.in_channels, base, device),
            conv2: ConvBlock::new(base, base * 2, device),
            conv3: ConvBlock::new(base * 2, base * 4, device),
            conv4: ConvBlock::new(base * 4, base * 8, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(base * 8, config.hidden_size).init(device),
            fc2: LinearConfig::new(config.hidden_size, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Builds the network and loads weights from a `CompactRecorder` file
    ///
    /// The `.mpk` extension may be omitted.
    pub fn load(
        config: &CamCnnConfig,
        checkpoint: &Path,
        device: &B::Device,
    ) -> robustcam_core::Result<Self> {
        let with_extension = checkpoint.with_extension("mpk");
        if !checkpoint.exists() && !with_extension.exists() {
            return Err(Error::NotFound(format!(
                "checkpoint {}",
                checkpoint.display()
            )));
        }

        info!("Loading checkpoint from {}", checkpoint.display());
        let recorder = CompactRecorder::new();
        Self::new(config, device)
            .load_file(checkpoint, &recorder, device)
            .map_err(|e| Error::Model(format!("Failed to load {}: {e}", checkpoint.display())))
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn blocks(&self) -> [&ConvBlock<B>; 4] {
        [&self.conv1, &self.conv2, &self.conv3, &self.conv4]
    }

    fn layer_index(&self, layer: &str) -> robustcam_core::Result<usize> {
        CAM_CNN_LAYERS
            .iter()
            .position(|name| *name == layer)
            .ok_or_else(|| {
                Error::Model(format!(
                    "unknown layer '{layer}' (available: {})",
                    CAM_CNN_LAYERS.join(", ")
                ))
            })
    }

    fn classify(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        // [B, C, H, W] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        self.fc2.forward(x)
    }
}

impl<B: Backend> ImageClassifier<B> for CamCnn<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self
            .blocks()
            .iter()
            .fold(images, |x, block| block.forward(x));
        self.classify(x)
    }
}

impl<B: Backend> CamModel<B> for CamCnn<B> {
    fn layer_names(&self) -> &'static [&'static str] {
        &CAM_CNN_LAYERS
    }

    fn forward_features(
        &self,
        images: Tensor<B, 4>,
        layer: &str,
    ) -> robustcam_core::Result<Tensor<B, 4>> {
        let index = self.layer_index(layer)?;
        let blocks = self.blocks();

        let x = blocks[..index]
            .iter()
            .fold(images, |x, block| block.forward(x));
        Ok(blocks[index].conv.forward(x))
    }

    fn forward_head(
        &self,
        features: Tensor<B, 4>,
        layer: &str,
    ) -> robustcam_core::Result<Tensor<B, 2>> {
        let index = self.layer_index(layer)?;
        let blocks = self.blocks();

        let x = blocks[index].activate(features);
        let x = blocks[index + 1..]
            .iter()
            .fold(x, |x, block| block.forward(x));
        Ok(self.classify(x))
    }
}
