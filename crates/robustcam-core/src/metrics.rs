//! Classification metrics: confusion matrix, per-class report and the
//! weighted averages recorded per noise level.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confusion matrix (rows = actual class, columns = predicted class)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Creates an empty matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![vec![0; num_classes]; num_classes],
        }
    }

    /// Builds a matrix from paired predictions and labels
    pub fn from_predictions(
        predictions: &[usize],
        labels: &[usize],
        num_classes: usize,
    ) -> Result<Self> {
        if predictions.len() != labels.len() {
            return Err(Error::InvalidArgument(format!(
                "{} predictions for {} labels",
                predictions.len(),
                labels.len()
            )));
        }

        let mut matrix = Self::new(num_classes);
        for (&predicted, &actual) in predictions.iter().zip(labels) {
            matrix.record(actual, predicted)?;
        }
        Ok(matrix)
    }

    /// Records one (actual, predicted) pair
    pub fn record(&mut self, actual: usize, predicted: usize) -> Result<()> {
        if actual >= self.num_classes || predicted >= self.num_classes {
            return Err(Error::InvalidArgument(format!(
                "class index out of range: actual={actual}, predicted={predicted}, classes={}",
                self.num_classes
            )));
        }
        self.counts[actual][predicted] += 1;
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.counts[actual][predicted]
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.counts
    }

    /// Total number of recorded samples
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Number of correct predictions (trace)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.counts[i][i]).sum()
    }

    /// Per-class sample counts (support)
    pub fn row_sums(&self) -> Vec<usize> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    /// Per-class prediction counts
    pub fn col_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|col| self.counts.iter().map(|row| row[col]).sum())
            .collect()
    }

    /// Largest single cell, used for color scaling
    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .max_count()
            .to_string()
            .len()
            .max(1);

        for (i, row) in self.counts.iter().enumerate() {
            write!(f, "{}", if i == 0 { "[[" } else { " [" })?;
            for (j, count) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{count:>width$}")?;
            }
            write!(f, "]")?;
            if i + 1 == self.counts.len() {
                write!(f, "]")?;
            } else {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_id: usize,
    pub class_name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Averaged precision, recall and F1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Per-class metrics plus accuracy, macro and support-weighted averages.
///
/// Undefined ratios (no predictions, no support) count as 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub total_samples: usize,
}

impl ClassificationReport {
    /// Computes the report; `class_names` must be index-aligned with the matrix
    pub fn from_confusion_matrix(matrix: &ConfusionMatrix, class_names: &[String]) -> Result<Self> {
        let n = matrix.num_classes();
        if class_names.len() != n {
            return Err(Error::InvalidArgument(format!(
                "{} class names for a {n}x{n} confusion matrix",
                class_names.len()
            )));
        }

        let supports = matrix.row_sums();
        let predicted = matrix.col_sums();

        let per_class: Vec<ClassMetrics> = (0..n)
            .map(|class_id| {
                let tp = matrix.get(class_id, class_id) as f64;
                let precision = ratio(tp, predicted[class_id] as f64);
                let recall = ratio(tp, supports[class_id] as f64);
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                ClassMetrics {
                    class_id,
                    class_name: class_names[class_id].clone(),
                    precision,
                    recall,
                    f1_score,
                    support: supports[class_id],
                }
            })
            .collect();

        let total_samples = matrix.total();
        let macro_avg = average(&per_class, |_| 1.0);
        let weighted_avg = average(&per_class, |m| m.support as f64);

        Ok(Self {
            per_class,
            accuracy: matrix.accuracy(),
            macro_avg,
            weighted_avg,
            total_samples,
        })
    }

    /// Weighted-average row for the metrics table
    pub fn to_record(&self, noise_multiplier: f64) -> MetricsRecord {
        MetricsRecord {
            noise_multiplier,
            f1_score: self.weighted_avg.f1_score,
            precision: self.weighted_avg.precision,
            recall: self.weighted_avg.recall,
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn average<F>(per_class: &[ClassMetrics], weight: F) -> AverageMetrics
where
    F: Fn(&ClassMetrics) -> f64,
{
    let total_weight: f64 = per_class.iter().map(&weight).sum();
    if total_weight <= 0.0 {
        return AverageMetrics {
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
        };
    }

    let weighted = |value: fn(&ClassMetrics) -> f64| {
        per_class.iter().map(|m| weight(m) * value(m)).sum::<f64>() / total_weight
    };

    AverageMetrics {
        precision: weighted(|m| m.precision),
        recall: weighted(|m| m.recall),
        f1_score: weighted(|m| m.f1_score),
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_class
            .iter()
            .map(|m| m.class_name.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;

        for m in &self.per_class {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                m.class_name, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.total_samples
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1_score, self.total_samples
            )?;
        }
        Ok(())
    }
}

/// One row of the cumulative metrics table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    #[serde(rename = "Noise Multiplier")]
    pub noise_multiplier: f64,
    #[serde(rename = "F1 Score")]
    pub f1_score: f64,
    #[serde(rename = "Precision")]
    pub precision: f64,
    #[serde(rename = "Recall")]
    pub recall: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("class_{i}")).collect()
    }

    #[test]
    fn test_confusion_matrix_sums() {
        let labels = vec![0, 0, 1, 1, 2, 2, 2];
        let predictions = vec![0, 1, 1, 1, 2, 0, 2];
        let matrix = ConfusionMatrix::from_predictions(&predictions, &labels, 3).unwrap();

        assert_eq!(matrix.row_sums(), vec![2, 2, 3]);
        assert_eq!(matrix.col_sums(), vec![2, 3, 2]);
        assert_eq!(matrix.total(), labels.len());

        let correct = predictions
            .iter()
            .zip(&labels)
            .filter(|(p, l)| p == l)
            .count();
        assert_eq!(matrix.correct(), correct);
        assert_eq!(matrix.get(2, 0), 1);
    }

    #[test]
    fn test_confusion_matrix_rejects_out_of_range() {
        let mut matrix = ConfusionMatrix::new(2);
        assert!(matrix.record(0, 2).is_err());
        assert!(ConfusionMatrix::from_predictions(&[0], &[0, 1], 2).is_err());
    }

    #[test]
    fn test_weighted_metrics_balanced() {
        let labels = vec![0, 0, 1, 1, 2, 2];
        let predictions = vec![0, 1, 1, 1, 2, 0];
        let matrix = ConfusionMatrix::from_predictions(&predictions, &labels, 3).unwrap();
        let report = ClassificationReport::from_confusion_matrix(&matrix, &names(3)).unwrap();

        // precision: 1/2, 2/3, 1/1; recall: 1/2, 2/2, 1/2
        let f1 = |p: f64, r: f64| 2.0 * p * r / (p + r);
        let expected_precision = (0.5 + 2.0 / 3.0 + 1.0) / 3.0;
        let expected_recall = (0.5 + 1.0 + 0.5) / 3.0;
        let expected_f1 = (f1(0.5, 0.5) + f1(2.0 / 3.0, 1.0) + f1(1.0, 0.5)) / 3.0;

        assert!((report.weighted_avg.precision - expected_precision).abs() < 1e-6);
        assert!((report.weighted_avg.recall - expected_recall).abs() < 1e-6);
        assert!((report.weighted_avg.f1_score - expected_f1).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_metrics_unbalanced() {
        let labels = vec![0, 0, 0, 1];
        let predictions = vec![0, 0, 1, 1];
        let matrix = ConfusionMatrix::from_predictions(&predictions, &labels, 2).unwrap();
        let report = ClassificationReport::from_confusion_matrix(&matrix, &names(2)).unwrap();

        // class 0: p=1, r=2/3, support 3; class 1: p=1/2, r=1, support 1
        assert!((report.weighted_avg.precision - 0.875).abs() < 1e-6);
        assert!((report.weighted_avg.recall - 0.75).abs() < 1e-6);
        let expected_f1 = (3.0 * 0.8 + 1.0 * (2.0 / 3.0)) / 4.0;
        assert!((report.weighted_avg.f1_score - expected_f1).abs() < 1e-6);

        assert!((report.macro_avg.precision - 0.75).abs() < 1e-6);
        assert!((report.accuracy - 0.75).abs() < 1e-6);
        assert_eq!(report.per_class[0].support, 3);
    }

    #[test]
    fn test_zero_division_counts_as_zero() {
        // class 1 is never predicted and never present
        let matrix = ConfusionMatrix::from_predictions(&[0, 0], &[0, 0], 2).unwrap();
        let report = ClassificationReport::from_confusion_matrix(&matrix, &names(2)).unwrap();

        assert_eq!(report.per_class[1].precision, 0.0);
        assert_eq!(report.per_class[1].recall, 0.0);
        assert_eq!(report.weighted_avg.f1_score, 1.0);
    }

    #[test]
    fn test_report_requires_aligned_names() {
        let matrix = ConfusionMatrix::new(3);
        assert!(ClassificationReport::from_confusion_matrix(&matrix, &names(2)).is_err());
    }

    #[test]
    fn test_report_display_lists_classes() {
        let matrix = ConfusionMatrix::from_predictions(&[0, 1], &[0, 1], 2).unwrap();
        let classes = vec!["cats".to_string(), "dogs".to_string()];
        let report = ClassificationReport::from_confusion_matrix(&matrix, &classes).unwrap();
        let text = report.to_string();

        assert!(text.contains("precision"));
        assert!(text.contains("cats"));
        assert!(text.contains("weighted avg"));
    }

    #[test]
    fn test_to_record() {
        let matrix = ConfusionMatrix::from_predictions(&[0, 1], &[0, 1], 2).unwrap();
        let report = ClassificationReport::from_confusion_matrix(&matrix, &names(2)).unwrap();
        let record = report.to_record(0.5);

        assert_eq!(record.noise_multiplier, 0.5);
        assert_eq!(record.f1_score, 1.0);
        assert_eq!(record.precision, 1.0);
        assert_eq!(record.recall, 1.0);
    }
}
