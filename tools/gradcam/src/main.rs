//! Grad-CAM CLI Tool
//!
//! Writes one Grad-CAM heatmap per test image, explaining the class the
//! model predicts for that image.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use robustcam_core::{
    backend_name, default_device, resolve_config, setup_cli_logging, ConfigOverrides,
    ExplainBackend, RobustnessConfig,
};
use robustcam_data::{GaussianNoise, TestLoader};
use robustcam_eval::{CamCnn, CamCnnConfig, GradCam, GradCamOptions, CAM_CNN_LAYERS};
use std::path::PathBuf;
use tracing::info;

/// Grad-CAM Export Tool
#[derive(Parser, Debug)]
#[command(
    name = "gradcam",
    about = "Export Grad-CAM heatmaps for every test image",
    long_about = "Run a trained classifier over a test set and write a jet-colored Grad-CAM \
                  heatmap for each image, computed at a named convolutional layer for the \
                  predicted class."
)]
struct Args {
    /// Path to model checkpoint (overrides [model].checkpoint)
    #[arg(short, long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,

    /// Path to test dataset directory
    #[arg(short = 'd', long, value_name = "DIR")]
    test_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Noise multiplier applied before explaining
    #[arg(short, long, value_name = "MULTIPLIER")]
    noise: Option<f64>,

    /// Output directory for heatmaps
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Target layer name
    #[arg(short, long)]
    layer: Option<String>,

    /// Blend heatmaps over the input image with this alpha
    #[arg(long, value_name = "ALPHA")]
    overlay: Option<f32>,

    /// Number of input channels (1 or 3)
    #[arg(long)]
    channels: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Seed for the noise generator
    #[arg(long)]
    seed: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_cli_logging(args.verbose)?;

    info!("Grad-CAM Export");
    info!("===============");

    let (config, noise_multiplier) = build_config(&args)?;
    let checkpoint = config
        .model
        .checkpoint
        .clone()
        .context("No checkpoint given (use --checkpoint or [model].checkpoint)")?;

    info!("Backend: {} with autodiff", backend_name());
    let device = default_device();

    info!("Loading test dataset: {}", config.data.test_dir.display());
    let loader = TestLoader::<ExplainBackend>::from_config(&config.data, &device)
        .context("Failed to load test dataset")?;
    info!(
        "Loaded {} samples in {} classes",
        loader.num_samples(),
        loader.num_classes()
    );

    let model_config = CamCnnConfig::new(loader.num_classes())
        .with_in_channels(config.data.channels)
        .with_base_filters(config.model.base_filters);
    let model = CamCnn::<ExplainBackend>::load(&model_config, &checkpoint, &device)
        .context("Failed to load checkpoint")?;

    let progress = ProgressBar::new(loader.num_samples() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} samples ({eta})")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let bar = progress.clone();
    let explainer = GradCam::new(GradCamOptions::from(&config.gradcam))
        .with_progress(move |n| bar.inc(n as u64));
    let mut noise = GaussianNoise::from_config(&config.noise)?;

    let records = explainer
        .explain(&model, &loader, &mut noise, noise_multiplier)
        .with_context(|| {
            format!(
                "Grad-CAM failed (layer '{}', available: {})",
                config.gradcam.target_layer,
                CAM_CNN_LAYERS.join(", ")
            )
        })?;

    progress.finish_with_message("Grad-CAM completed");

    let correct = records.iter().filter(|r| r.label == r.predicted).count();
    info!(
        "Wrote {} heatmaps to {} ({} of {} predictions correct)",
        records.len(),
        config.gradcam.output_dir.display(),
        correct,
        records.len()
    );

    Ok(())
}

/// Merges the optional config file with command-line overrides
///
/// The noise multiplier defaults to the first configured level.
fn build_config(args: &Args) -> Result<(RobustnessConfig, f64)> {
    let overrides = ConfigOverrides {
        checkpoint: args.checkpoint.clone(),
        test_dir: args.test_dir.clone(),
        noise: args.noise.into_iter().collect(),
        channels: args.channels,
        batch_size: args.batch_size,
        seed: args.seed,
        output_dir: args.output_dir.clone(),
        layer: args.layer.clone(),
        overlay: args.overlay,
        ..ConfigOverrides::default()
    };

    let config =
        resolve_config(args.config.as_deref(), &overrides).context("Invalid configuration")?;
    let noise_multiplier = config.noise.multipliers.first().copied().unwrap_or(0.0);

    Ok((config, noise_multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "gradcam",
            "-c",
            "model.mpk",
            "-d",
            "data/test",
            "--noise",
            "2",
            "--layer",
            "conv2",
            "--overlay",
            "0.4",
        ]);
        let (config, noise) = build_config(&args).unwrap();

        assert_eq!(noise, 2.0);
        assert_eq!(config.gradcam.target_layer, "conv2");
        assert_eq!(config.gradcam.overlay_alpha, Some(0.4));
        assert_eq!(config.gradcam.output_dir, PathBuf::from("out/gradcam/"));
    }

    #[test]
    fn test_defaults_without_noise() {
        let args = Args::parse_from(["gradcam", "-d", "data/test"]);
        let (config, noise) = build_config(&args).unwrap();

        assert_eq!(noise, 0.0);
        assert_eq!(config.gradcam.target_layer, "conv4");
    }

    #[test]
    fn test_overlay_out_of_range() {
        let args = Args::parse_from(["gradcam", "--overlay", "1.5"]);
        assert!(build_config(&args).is_err());
    }
}
