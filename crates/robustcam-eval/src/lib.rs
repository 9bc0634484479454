//! Noise-robustness evaluation and Grad-CAM explanations.
//!
//! This crate provides:
//! - Classifier traits and a reference CNN splittable at named layers
//! - Evaluation runs producing reports, metrics rows and confusion plots
//! - Grad-CAM heatmaps written as color-mapped PNG files

pub mod capture;
pub mod colormap;
pub mod evaluator;
pub mod gradcam;
pub mod metrics_table;
pub mod model;
pub mod plot;

pub use capture::{ActivationCapture, FeatureMap};
pub use evaluator::{EvaluationOutcome, EvaluationOutputs, Evaluator};
pub use gradcam::{compute_heatmap, GradCam, GradCamOptions, GradCamRecord, Heatmap};
pub use metrics_table::append_record;
pub use model::{CamCnn, CamCnnConfig, CamModel, ImageClassifier, CAM_CNN_LAYERS};
pub use plot::render_confusion_matrix;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::capture::*;
    pub use crate::evaluator::*;
    pub use crate::gradcam::*;
    pub use crate::metrics_table::*;
    pub use crate::model::*;
    pub use crate::plot::*;
}
