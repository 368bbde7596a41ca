//! Raster analyses: colour check, embedded logo, borders and bars, and the
//! crop they imply.

pub mod border;
pub mod crop;
pub mod grayscale;
pub mod logo;
pub mod template;

pub use border::{BorderDetector, BorderReport, ProjectionBorderDetector};
pub use crop::{apply_crop, reconcile_crop, CropWindow};
pub use grayscale::{ChannelSumGrayscale, GrayscaleDetector};
pub use logo::LogoDetector;
pub use template::{MatchResult, NccTemplateMatcher, TemplateMatcher};

use image::{DynamicImage, GrayImage};

use crate::pipeline_config::{BorderConfig, LogoConfig};
use crate::records::BoundingBox;

/// Everything the analyzer reports for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryReport {
    pub grayscale: Option<bool>,
    pub logo: Option<BoundingBox>,
    pub borders: BorderReport,
}

/// Composes the three independent analyses. Each is injected so callers
/// can swap in other primitives.
pub struct GeometricAnalyzer {
    grayscale: Box<dyn GrayscaleDetector>,
    logo: Option<LogoDetector>,
    borders: Box<dyn BorderDetector>,
}

impl GeometricAnalyzer {
    pub fn new(
        grayscale: Box<dyn GrayscaleDetector>,
        logo: Option<LogoDetector>,
        borders: Box<dyn BorderDetector>,
    ) -> Self {
        Self {
            grayscale,
            logo,
            borders,
        }
    }

    /// Reference primitives; logo detection is disabled without a template.
    pub fn with_defaults(logo_template: Option<GrayImage>) -> Self {
        Self::new(
            Box::new(ChannelSumGrayscale),
            logo_template.map(|t| LogoDetector::new(Box::new(NccTemplateMatcher), t)),
            Box::new(ProjectionBorderDetector),
        )
    }

    pub fn grayscale(&self, image: &DynamicImage) -> Option<bool> {
        self.grayscale.is_grayscale(image)
    }

    pub fn logo(
        &self,
        journal_title: Option<&str>,
        gray: &GrayImage,
        config: &LogoConfig,
    ) -> Option<BoundingBox> {
        self.logo
            .as_ref()
            .and_then(|detector| detector.detect(journal_title, gray, config))
    }

    pub fn borders(&self, gray: &GrayImage, config: &BorderConfig) -> BorderReport {
        self.borders.detect(gray, config)
    }

    pub fn analyze(
        &self,
        image: &DynamicImage,
        journal_title: Option<&str>,
        logo_config: &LogoConfig,
        border_config: &BorderConfig,
    ) -> GeometryReport {
        let gray = image.to_luma8();
        GeometryReport {
            grayscale: self.grayscale(image),
            logo: self.logo(journal_title, &gray, logo_config),
            borders: self.borders(&gray, border_config),
        }
    }
}
