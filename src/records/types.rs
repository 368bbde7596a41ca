use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Label the visual classifier uses for an image with no detected problem.
pub const VALID_IMAGE_LABEL: &str = "valid_img";

/// One cached image and its metadata, plus every column the pipeline derives.
///
/// The archive client owns the input fields. Derived fields start as `None`
/// and are only ever filled in by the stage that owns them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(alias = "cached_images_path")]
    pub cached_image_path: PathBuf,
    #[serde(default)]
    pub journal_title: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub r#abstract: Option<String>,
    #[serde(default)]
    pub image_caption: Option<String>,
    #[serde(default)]
    pub image_mention: Option<String>,

    #[serde(default)]
    pub text_features: Option<TextFeatures>,
    #[serde(default)]
    pub grayscale: Option<bool>,
    #[serde(default)]
    pub medpix_logo_bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub hbar: Option<u32>,
    #[serde(default)]
    pub hborder: Option<(u32, u32)>,
    #[serde(default)]
    pub vborder: Option<(u32, u32)>,
    #[serde(default)]
    pub upper_crop: Option<u32>,
    #[serde(default)]
    pub lower_crop: Option<u32>,
    #[serde(default)]
    pub visual_image_problems: Option<Vec<ClassScore>>,
    #[serde(default)]
    pub valid_image: Option<bool>,
}

impl ImageRecord {
    pub fn new(cached_image_path: impl Into<PathBuf>) -> Self {
        Self {
            cached_image_path: cached_image_path.into(),
            ..Self::default()
        }
    }

    /// Text-derived problem tags, if the text stage found any.
    pub fn image_problems_from_text(&self) -> Option<&[ImageProblem]> {
        self.text_features
            .as_ref()
            .and_then(|f| f.image_problems_from_text.as_deref())
    }
}

/// Structured fields guessed from the free-text columns of one record.
///
/// Every field is always present; a missed heuristic is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFeatures {
    pub diagnosis: Option<String>,
    pub history: Option<String>,
    pub findings: Option<String>,
    pub age: Option<f64>,
    pub sex: Option<Sex>,
    pub ethnicity: Option<Ethnicity>,
    pub illness_duration_years: Option<f64>,
    pub caption_imaging_modality: Option<String>,
    pub image_plane: Option<ImagePlane>,
    pub image_problems_from_text: Option<Vec<ImageProblem>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ethnicity {
    Caucasian,
    Black,
    Latino,
    Hispanic,
    Asian,
    NativeAmerican,
    FirstNations,
    Aboriginal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePlane {
    Axial,
    Coronal,
    Sagittal,
}

impl ImagePlane {
    pub const ALL: [ImagePlane; 3] = [ImagePlane::Axial, ImagePlane::Coronal, ImagePlane::Sagittal];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImagePlane::Axial => "axial",
            ImagePlane::Coronal => "coronal",
            ImagePlane::Sagittal => "sagittal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageProblem {
    Arrows,
    Grids,
}

impl fmt::Display for ImageProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageProblem::Arrows => f.write_str("arrows"),
            ImageProblem::Grids => f.write_str("grids"),
        }
    }
}

/// Pixel coordinate `(x, y)`, origin top-left.
pub type Point = (u32, u32);

/// Axis-aligned box reported by the template matcher, corners named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

impl BoundingBox {
    /// Box from its top-left corner and size.
    pub fn from_origin(x: u32, y: u32, width: u32, height: u32) -> Self {
        let right = x + width;
        let bottom = y + height;
        Self {
            top_left: (x, y),
            top_right: (right, y),
            bottom_left: (x, bottom),
            bottom_right: (right, bottom),
        }
    }
}

/// One `(label, probability)` pair from the visual classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: String,
    pub probability: f32,
}

impl ClassScore {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }

    pub fn is_valid_label(&self) -> bool {
        self.label == VALID_IMAGE_LABEL
    }
}

impl From<(&str, f32)> for ClassScore {
    fn from((label, probability): (&str, f32)) -> Self {
        Self::new(label, probability)
    }
}
