//! Evaluation CLI Tool
//!
//! Evaluates a trained classifier on a directory-structured test set at one or
//! more Gaussian noise levels. Each level prints a classification report,
//! appends a row to the metrics table and renders a confusion matrix.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use robustcam_core::{
    backend_name, default_device, resolve_config, setup_cli_logging, ConfigOverrides,
    DefaultBackend, MetricsRecord, RobustnessConfig,
};
use robustcam_data::{GaussianNoise, TestLoader};
use robustcam_eval::{CamCnn, CamCnnConfig, EvaluationOutputs, Evaluator};
use std::path::PathBuf;
use tracing::info;

/// Noise Robustness Evaluation Tool
#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Evaluate an image classifier under Gaussian input noise",
    long_about = "Evaluate a trained classifier on a test set at one or more noise levels, \
                  printing classification reports, appending weighted metrics to a CSV table \
                  and rendering confusion matrices."
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

    /// Noise multiplier; repeat to sweep several levels
    #[arg(short, long = "noise", value_name = "MULTIPLIER")]
    noise: Vec<f64>,

    /// Confusion matrix image path
    #[arg(long, value_name = "FILE")]
    confusion_matrix: Option<PathBuf>,

    /// Metrics table path
    #[arg(long, value_name = "FILE")]
    metrics: Option<PathBuf>,

    /// Number of input channels (1 or 3)
    #[arg(long)]
    channels: Option<usize>,

    /// Batch size for evaluation
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

    info!("Noise Robustness Evaluation");
    info!("===========================");

    let config = build_config(&args)?;
    let checkpoint = config
        .model
        .checkpoint
        .clone()
        .context("No checkpoint given (use --checkpoint or [model].checkpoint)")?;

    info!("Backend: {}", backend_name());
    let device = default_device();

    info!("Loading test dataset: {}", config.data.test_dir.display());
    let loader = TestLoader::<DefaultBackend>::from_config(&config.data, &device)
        .context("Failed to load test dataset")?;
    info!(
        "Loaded {} samples in {} classes: {}",
        loader.num_samples(),
        loader.num_classes(),
        loader.classes().join(", ")
    );

    let model_config = CamCnnConfig::new(loader.num_classes())
        .with_in_channels(config.data.channels)
        .with_base_filters(config.model.base_filters);
    let model = CamCnn::<DefaultBackend>::load(&model_config, &checkpoint, &device)
        .context("Failed to load checkpoint")?;

    let levels = config.noise.multipliers.clone();
    let progress = ProgressBar::new((loader.num_samples() * levels.len()) as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} samples ({eta})")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let noise = GaussianNoise::from_config(&config.noise)?;
    let bar = progress.clone();
    let mut evaluator = Evaluator::new(noise).with_progress(move |n| bar.inc(n as u64));

    let base_outputs = EvaluationOutputs::from(&config.evaluation);
    let mut records = Vec::with_capacity(levels.len());

    for &level in &levels {
        let outputs = if levels.len() > 1 {
            base_outputs.for_noise_level(level)
        } else {
            base_outputs.clone()
        };

        let outcome = evaluator
            .run(&model, &loader, level, &outputs)
            .with_context(|| format!("Evaluation failed at noise multiplier {level}"))?;
        records.push(outcome.record);
    }

    progress.finish_with_message("Evaluation completed");

    print_summary(&records);
    info!("Metrics table: {}", config.evaluation.metrics_path.display());

    Ok(())
}

/// Merges the optional config file with command-line overrides
fn build_config(args: &Args) -> Result<RobustnessConfig> {
    let overrides = ConfigOverrides {
        checkpoint: args.checkpoint.clone(),
        test_dir: args.test_dir.clone(),
        noise: args.noise.clone(),
        channels: args.channels,
        batch_size: args.batch_size,
        seed: args.seed,
        confusion_matrix: args.confusion_matrix.clone(),
        metrics: args.metrics.clone(),
        ..ConfigOverrides::default()
    };

    resolve_config(args.config.as_deref(), &overrides).context("Invalid configuration")
}

fn print_summary(records: &[MetricsRecord]) {
    info!("");
    info!("=== Noise Sweep Summary ===");
    info!("{:>8} {:>8} {:>10} {:>8}", "noise", "f1", "precision", "recall");
    for record in records {
        info!(
            "{:>8} {:>8.4} {:>10.4} {:>8.4}",
            record.noise_multiplier, record.f1_score, record.precision, record.recall
        );
    }
}
