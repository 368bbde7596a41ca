//! ONNX Runtime backend, built with the `onnx-classifier` feature.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, Array4};
use ort::session::Session;

use super::prepare::{sidecar_path, InputShape, ModelMetadata};
use super::{ClassifierBackend, ClassifierError};

/// Classifier weights exported to ONNX plus their sidecar metadata.
///
/// `Session::run` needs `&mut self`, hence the `Mutex`.
pub struct OnnxBackend {
    session: Mutex<Session>,
    labels: Vec<String>,
    input_shape: InputShape,
}

impl OnnxBackend {
    /// Load `<model>.onnx` and `<model>.json` from beside it.
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_path_buf()));
        }
        let metadata = ModelMetadata::from_file(&sidecar_path(model_path))?;

        let session = Session::builder()
            .map_err(|e: ort::Error| ClassifierError::ModelInit(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e: ort::Error| ClassifierError::ModelInit(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e: ort::Error| ClassifierError::ModelInit(format!("ONNX load failed: {e}")))?;

        let labels = metadata.labels()?;
        tracing::info!(
            path = %model_path.display(),
            labels = labels.len(),
            "visual classifier loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            labels,
            input_shape: metadata.input_shape()?,
        })
    }
}

impl ClassifierBackend for OnnxBackend {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn predict_batch(&self, batch: &Array4<f32>) -> Result<Array2<f32>, ClassifierError> {
        use ort::value::TensorRef;

        let input = TensorRef::from_array_view(batch)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::Inference("Session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| ClassifierError::Inference(format!("ONNX inference failed: {e}")))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("Output extraction: {e}")))?;

        let images = batch.shape()[0];
        if shape.len() != 2 || shape[0] as usize != images || shape[1] as usize != self.labels.len() {
            return Err(ClassifierError::OutputShape {
                actual: shape.iter().map(|d| *d as usize).collect(),
                images,
                labels: self.labels.len(),
            });
        }

        Array2::from_shape_vec((images, self.labels.len()), data.to_vec())
            .map_err(|e| ClassifierError::Inference(e.to_string()))
    }
}
