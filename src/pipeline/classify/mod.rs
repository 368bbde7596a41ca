//! Visual-problem classifier: a trained multi-label model behind a backend
//! trait, ranking `(label, probability)` pairs per image.

pub mod prepare;

#[cfg(feature = "onnx-classifier")]
pub mod onnx;

use std::path::PathBuf;

use image::DynamicImage;
use ndarray::{Array2, Array4};
use tracing::debug;

pub use prepare::{to_input_tensor, InputShape, ModelMetadata};

use super::QcError;
use crate::records::ClassScore;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    #[error("Invalid model metadata: {0}")]
    Metadata(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unexpected output shape {actual:?}, expected [{images}, {labels}]")]
    OutputShape {
        actual: Vec<usize>,
        images: usize,
        labels: usize,
    },
}

/// A loaded model. The label set and input shape are fixed at load time.
pub trait ClassifierBackend: Send + Sync {
    /// Labels in output-column order.
    fn labels(&self) -> &[String];

    fn input_shape(&self) -> InputShape;

    /// Probabilities `[images, labels]` for an NCHW batch.
    fn predict_batch(&self, batch: &Array4<f32>) -> Result<Array2<f32>, ClassifierError>;
}

/// Pair labels with probabilities, highest first. Equal probabilities keep
/// label order.
pub fn rank_scores(labels: &[String], probabilities: &[f32]) -> Vec<ClassScore> {
    let mut scores: Vec<ClassScore> = labels
        .iter()
        .zip(probabilities)
        .map(|(label, &p)| ClassScore::new(label.as_str(), p))
        .collect();
    scores.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    scores
}

pub struct VisualClassifier {
    backend: Option<Box<dyn ClassifierBackend>>,
}

impl VisualClassifier {
    pub fn new(backend: Box<dyn ClassifierBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A classifier with no weights yet; `predict` fails until `load`.
    pub fn unloaded() -> Self {
        Self { backend: None }
    }

    pub fn load(&mut self, backend: Box<dyn ClassifierBackend>) {
        self.backend = Some(backend);
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    /// Ranked scores per image, in input order.
    pub fn predict(&self, images: &[DynamicImage]) -> Result<Vec<Vec<ClassScore>>, QcError> {
        let backend = self.backend.as_ref().ok_or(QcError::ModelNotLoaded)?;
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let labels = backend.labels();
        let batch = to_input_tensor(images, backend.input_shape());
        let probabilities = backend.predict_batch(&batch)?;

        let shape = probabilities.shape();
        if shape != [images.len(), labels.len()] {
            return Err(ClassifierError::OutputShape {
                actual: shape.to_vec(),
                images: images.len(),
                labels: labels.len(),
            }
            .into());
        }

        debug!(images = images.len(), "visual classifier batch scored");
        Ok(probabilities
            .rows()
            .into_iter()
            .map(|row| rank_scores(labels, &row.to_vec()))
            .collect())
    }
}

/// Backend returning the same probabilities for every image.
pub struct MockClassifierBackend {
    labels: Vec<String>,
    probabilities: Vec<f32>,
    input_shape: InputShape,
}

impl MockClassifierBackend {
    pub fn new(scores: &[(&str, f32)]) -> Self {
        Self {
            labels: scores.iter().map(|(l, _)| l.to_string()).collect(),
            probabilities: scores.iter().map(|(_, p)| *p).collect(),
            input_shape: InputShape::rgb(8, 8),
        }
    }
}

impl ClassifierBackend for MockClassifierBackend {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn predict_batch(&self, batch: &Array4<f32>) -> Result<Array2<f32>, ClassifierError> {
        let n = batch.shape()[0];
        let flat: Vec<f32> = (0..n).flat_map(|_| self.probabilities.iter().copied()).collect();
        Array2::from_shape_vec((n, self.labels.len()), flat)
            .map_err(|e| ClassifierError::Inference(e.to_string()))
    }
}
