//! Model evaluation under Gaussian input noise.
//!
//! One run:
//! - perturbs each batch and predicts by argmax
//! - builds the confusion matrix and classification report
//! - prints the report and weighted metrics
//! - appends a row to the metrics table
//! - renders the confusion matrix image

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use robustcam_core::{
    ClassificationReport, ConfusionMatrix, Error, EvaluationConfig, MetricsRecord, Result,
};
use robustcam_data::{GaussianNoise, TestLoader};
use tracing::info;

use crate::metrics_table::append_record;
use crate::model::ImageClassifier;
use crate::plot::render_confusion_matrix;

/// Index of the largest value, first one on ties
pub fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}

/// Where a run writes its artifacts
#[derive(Debug, Clone)]
pub struct EvaluationOutputs {
    pub confusion_matrix_path: PathBuf,
    pub metrics_path: PathBuf,
    pub font_path: Option<PathBuf>,
}

impl From<&EvaluationConfig> for EvaluationOutputs {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            confusion_matrix_path: config.confusion_matrix_path.clone(),
            metrics_path: config.metrics_path.clone(),
            font_path: config.font_path.clone(),
        }
    }
}

impl EvaluationOutputs {
    /// Same outputs with the confusion matrix path tagged by noise level
    pub fn for_noise_level(&self, noise_multiplier: f64) -> Self {
        Self {
            confusion_matrix_path: with_noise_suffix(&self.confusion_matrix_path, noise_multiplier),
            ..self.clone()
        }
    }
}

/// `out/cm.png` becomes `out/cm_noise_0.5.png`
pub fn with_noise_suffix(path: &Path, noise_multiplier: f64) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_noise_{noise_multiplier}.{}", ext.to_string_lossy()),
        None => format!("{stem}_noise_{noise_multiplier}"),
    };
    path.with_file_name(name)
}

/// Everything a run computed
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub report: ClassificationReport,
    pub confusion: ConfusionMatrix,
    pub record: MetricsRecord,
}

/// Model evaluator
pub struct Evaluator {
    noise: GaussianNoise,
    progress: Option<Box<dyn Fn(usize)>>,
}

impl Evaluator {
    pub fn new(noise: GaussianNoise) -> Self {
        Self {
            noise,
            progress: None,
        }
    }

    /// Called with the number of samples after each batch
    pub fn with_progress(mut self, progress: impl Fn(usize) + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Predicted and actual labels for the whole test set, in order
    pub fn predict<B, M>(
        &mut self,
        model: &M,
        loader: &TestLoader<B>,
        noise_multiplier: f64,
    ) -> Result<(Vec<usize>, Vec<usize>)>
    where
        B: Backend,
        M: ImageClassifier<B>,
    {
        let num_classes = loader.num_classes();
        let mut predictions = Vec::with_capacity(loader.num_samples());
        let mut labels = Vec::with_capacity(loader.num_samples());

        for batch in loader.batches() {
            let batch = batch?;
            let images = self.noise.apply(batch.images, noise_multiplier)?;
            let logits = model.forward(images);

            let [rows, cols] = logits.dims();
            if cols != num_classes || rows != batch.labels.len() {
                return Err(Error::Model(format!(
                    "expected logits [{}, {num_classes}], got [{rows}, {cols}]",
                    batch.labels.len()
                )));
            }

            let scores: Vec<f32> = logits.into_data().iter::<f32>().collect();
            predictions.extend(scores.chunks(num_classes).map(argmax));
            labels.extend_from_slice(&batch.labels);

            if let Some(progress) = &self.progress {
                progress(batch.labels.len());
            }
        }

        Ok((predictions, labels))
    }

    /// Evaluates `model` at one noise level and writes the artifacts
    pub fn run<B, M>(
        &mut self,
        model: &M,
        loader: &TestLoader<B>,
        noise_multiplier: f64,
        outputs: &EvaluationOutputs,
    ) -> Result<EvaluationOutcome>
    where
        B: Backend,
        M: ImageClassifier<B>,
    {
        info!(
            "Evaluating {} samples at noise multiplier {}",
            loader.num_samples(),
            noise_multiplier
        );

        let (predictions, labels) = self.predict(model, loader, noise_multiplier)?;
        let confusion =
            ConfusionMatrix::from_predictions(&predictions, &labels, loader.num_classes())?;
        let report = ClassificationReport::from_confusion_matrix(&confusion, loader.classes())?;
        let record = report.to_record(noise_multiplier);

        print_results(&report, &confusion, &record);

        append_record(&outputs.metrics_path, &record)?;
        info!("Metrics appended to {}", outputs.metrics_path.display());

        render_confusion_matrix(
            &confusion,
            loader.classes(),
            noise_multiplier,
            &outputs.confusion_matrix_path,
            outputs.font_path.as_deref(),
        )?;
        info!(
            "Confusion matrix saved to {}",
            outputs.confusion_matrix_path.display()
        );

        Ok(EvaluationOutcome {
            report,
            confusion,
            record,
        })
    }
}

fn print_results(report: &ClassificationReport, confusion: &ConfusionMatrix, record: &MetricsRecord) {
    println!("Classification Report:");
    println!("{report}");
    println!("Confusion Matrix:");
    println!("{confusion}");
    println!("Weighted F1 Score: {:.4}", record.f1_score);
    println!("Weighted Precision: {:.4}", record.precision);
    println!("Weighted Recall: {:.4}", record.recall);
}
