//! Burn Dataset and Batcher integration for image folders.
//!
//! `TestLoader` walks the dataset in order, without shuffling, and stops at
//! the first sample that fails to decode.

use std::marker::PhantomData;
use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use robustcam_core::{DataConfig, Result};
use tracing::debug;

use crate::loader::ImageFolder;
use crate::preprocess::{ImagePreprocessor, PreprocessConfig};

/// A single preprocessed sample
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Image data as flattened CHW float array
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Source path (for logging)
    pub path: PathBuf,
}

/// Image folder implementing Burn's Dataset trait
///
/// Images are decoded lazily on access.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    folder: ImageFolder,
    preprocessor: ImagePreprocessor,
}

impl ImageFolderDataset {
    pub fn new(folder: ImageFolder, preprocessor: ImagePreprocessor) -> Self {
        Self {
            folder,
            preprocessor,
        }
    }

    pub fn folder(&self) -> &ImageFolder {
        &self.folder
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    pub fn classes(&self) -> &[String] {
        self.folder.classes()
    }

    /// Loads a sample, surfacing decode errors
    pub fn try_get(&self, index: usize) -> Result<Option<ImageItem>> {
        let Some((path, label)) = self.folder.samples().get(index) else {
            return Ok(None);
        };

        let image = self.preprocessor.preprocess_from_path(path)?;
        Ok(Some(ImageItem {
            image,
            label: *label,
            path: path.clone(),
        }))
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.try_get(index).ok().flatten()
    }

    fn len(&self) -> usize {
        self.folder.len()
    }
}

/// A batch of images with their labels
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Images with shape [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
    /// Labels as plain indices
    pub labels: Vec<usize>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Batcher stacking preprocessed items into tensors
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    shape: [usize; 3],
    _backend: PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    /// Creates a batcher for items of shape `[channels, height, width]`
    pub fn new(shape: [usize; 3]) -> Self {
        Self {
            shape,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let [channels, height, width] = self.shape;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
        let targets_data: Vec<i64> = labels.iter().map(|&label| label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch {
            images,
            targets,
            labels,
        }
    }
}

/// Ordered, shuffle-free batched access to a test set
#[derive(Debug, Clone)]
pub struct TestLoader<B: Backend> {
    dataset: ImageFolderDataset,
    batcher: ImageBatcher<B>,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> TestLoader<B> {
    /// Scans the test directory and prepares batching on `device`
    pub fn from_config(config: &DataConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let folder = ImageFolder::open(&config.test_dir)?;
        let preprocessor = ImagePreprocessor::new(PreprocessConfig::from_data_config(config))?;

        debug!(
            "Test set {}: {} samples, {} classes",
            folder.root().display(),
            folder.len(),
            folder.num_classes()
        );

        Ok(Self::new(
            ImageFolderDataset::new(folder, preprocessor),
            config.batch_size,
            device.clone(),
        ))
    }

    pub fn new(dataset: ImageFolderDataset, batch_size: usize, device: B::Device) -> Self {
        let batcher = ImageBatcher::new(dataset.preprocessor().output_shape());
        Self {
            dataset,
            batcher,
            batch_size: batch_size.max(1),
            device,
        }
    }

    /// Class names, index-aligned with labels and model outputs
    pub fn classes(&self) -> &[String] {
        self.dataset.classes()
    }

    pub fn num_classes(&self) -> usize {
        self.dataset.classes().len()
    }

    pub fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn dataset(&self) -> &ImageFolderDataset {
        &self.dataset
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Batches in dataset order; the last one may be short
    pub fn batches(&self) -> impl Iterator<Item = Result<ImageBatch<B>>> + '_ {
        let len = self.dataset.len();

        (0..len).step_by(self.batch_size).map(move |start| {
            let end = (start + self.batch_size).min(len);
            let items = (start..end)
                .filter_map(|index| self.dataset.try_get(index).transpose())
                .collect::<Result<Vec<_>>>()?;

            Ok(self.batcher.batch(items, &self.device))
        })
    }
}
