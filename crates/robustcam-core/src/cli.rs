//! Logging setup and configuration resolution shared by the robustcam tools.
//!
//! Both tools start from an optional TOML file, apply their command-line
//! flags on top through [`ConfigOverrides`] and validate the result once.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::RobustnessConfig;
use crate::{Error, Result};

/// Installs the global subscriber
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks debug over info.
pub fn setup_cli_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbose))
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}

/// Command-line values layered over the file configuration
///
/// `None` and an empty `noise` list leave the file value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub checkpoint: Option<PathBuf>,
    pub test_dir: Option<PathBuf>,
    pub noise: Vec<f64>,
    pub channels: Option<usize>,
    pub batch_size: Option<usize>,
    pub seed: Option<u64>,
    pub confusion_matrix: Option<PathBuf>,
    pub metrics: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub layer: Option<String>,
    pub overlay: Option<f32>,
}

impl ConfigOverrides {
    /// Writes every set value into `config`
    pub fn apply(&self, config: &mut RobustnessConfig) {
        if let Some(checkpoint) = &self.checkpoint {
            config.model.checkpoint = Some(checkpoint.clone());
        }
        if let Some(test_dir) = &self.test_dir {
            config.data.test_dir = test_dir.clone();
        }
        if !self.noise.is_empty() {
            config.noise.multipliers = self.noise.clone();
        }
        if let Some(channels) = self.channels {
            config.data.channels = channels;
        }
        if let Some(batch_size) = self.batch_size {
            config.data.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            config.noise.seed = seed;
        }
        if let Some(path) = &self.confusion_matrix {
            config.evaluation.confusion_matrix_path = path.clone();
        }
        if let Some(path) = &self.metrics {
            config.evaluation.metrics_path = path.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.gradcam.output_dir = output_dir.clone();
        }
        if let Some(layer) = &self.layer {
            config.gradcam.target_layer = layer.clone();
        }
        if let Some(alpha) = self.overlay {
            config.gradcam.overlay_alpha = Some(alpha);
        }
    }
}

/// Loads `path` (or the defaults), applies `overrides` and validates
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<RobustnessConfig> {
    let mut config: RobustnessConfig = match path {
        Some(path) => load_toml_config(path)?,
        None => RobustnessConfig::default(),
    };

    overrides.apply(&mut config);
    config.validate()?;

    if config.noise.multipliers.is_empty() {
        return Err(Error::Config(
            "At least one noise multiplier is required".to_string(),
        ));
    }

    Ok(config)
}
