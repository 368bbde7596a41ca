//! Turning cropped images into the classifier's fixed-shape input tensor.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::DynamicImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use super::ClassifierError;

/// Fixed input shape the classifier was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub height: u32,
    pub width: u32,
    /// 1 (luma) or 3 (RGB).
    pub channels: u32,
}

impl InputShape {
    pub fn rgb(height: u32, width: u32) -> Self {
        Self {
            height,
            width,
            channels: 3,
        }
    }
}

/// Resize each image to `shape` and stack them as NCHW `f32` in `[0, 1]`.
pub fn to_input_tensor(images: &[DynamicImage], shape: InputShape) -> Array4<f32> {
    let (h, w, c) = (
        shape.height as usize,
        shape.width as usize,
        shape.channels as usize,
    );
    let mut batch = Array4::<f32>::zeros((images.len(), c, h, w));

    for (n, image) in images.iter().enumerate() {
        if c == 1 {
            let luma = imageops::resize(&image.to_luma8(), shape.width, shape.height, FilterType::Triangle);
            for (x, y, p) in luma.enumerate_pixels() {
                batch[[n, 0, y as usize, x as usize]] = f32::from(p.0[0]) / 255.0;
            }
        } else {
            let rgb = imageops::resize(&image.to_rgb8(), shape.width, shape.height, FilterType::Triangle);
            for (x, y, p) in rgb.enumerate_pixels() {
                for (ch, v) in p.0.iter().enumerate() {
                    batch[[n, ch, y as usize, x as usize]] = f32::from(*v) / 255.0;
                }
            }
        }
    }
    batch
}

// ═══════════════════════════════════════════════════════════
// Sidecar metadata
// ═══════════════════════════════════════════════════════════

/// JSON stored next to the weights: `<model>.json` for `<model>.onnx`.
///
/// ```json
/// { "image_shape": [150, 150, 3], "data_classes": {"arrows": 0, "grids": 1, "valid_img": 2} }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// `[height, width, channels]`.
    pub image_shape: [u32; 3],
    /// Label to output index.
    pub data_classes: BTreeMap<String, usize>,
}

pub fn sidecar_path(model_path: &Path) -> PathBuf {
    model_path.with_extension("json")
}

impl ModelMetadata {
    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::ModelNotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path).map_err(|e| ClassifierError::Metadata(e.to_string()))?;
        let metadata: ModelMetadata =
            serde_json::from_str(&raw).map_err(|e| ClassifierError::Metadata(e.to_string()))?;
        metadata.input_shape()?;
        metadata.labels()?;
        Ok(metadata)
    }

    pub fn input_shape(&self) -> Result<InputShape, ClassifierError> {
        let [height, width, channels] = self.image_shape;
        if height == 0 || width == 0 || !matches!(channels, 1 | 3) {
            return Err(ClassifierError::Metadata(format!(
                "image_shape must be [height, width, 1|3], got {:?}",
                self.image_shape
            )));
        }
        Ok(InputShape {
            height,
            width,
            channels,
        })
    }

    /// Labels in output-index order. Indices must be exactly `0..n`.
    pub fn labels(&self) -> Result<Vec<String>, ClassifierError> {
        let n = self.data_classes.len();
        let mut labels = vec![None; n];
        for (label, &index) in &self.data_classes {
            let slot = labels
                .get_mut(index)
                .filter(|slot| slot.is_none())
                .ok_or_else(|| {
                    ClassifierError::Metadata(format!(
                        "data_classes index {index} for '{label}' is duplicated or out of range"
                    ))
                })?;
            *slot = Some(label.clone());
        }
        Ok(labels.into_iter().flatten().collect())
    }
}
