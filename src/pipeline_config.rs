//! Tunable thresholds for every stage of the image quality-control pipeline.
//!
//! Defaults are the values the pipeline was calibrated with. A config can be
//! loaded from JSON; `validate()` must pass before a processor accepts it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pipeline::QcError;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// How multiple age mentions in one source are reduced to a single age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeReduction {
    /// Max over every extracted value, once at least one value is within the
    /// age bound. Out-of-range values can still win.
    #[default]
    Unfiltered,
    /// Max over the values within the age bound only.
    Filtered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Enumeration markers needed before a caption is read as a grid of images.
    pub enumeration_grid_threshold: usize,
    /// Ages above this (years) are treated as noise.
    pub upper_age_bound: f64,
    pub age_reduction: AgeReduction,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            enumeration_grid_threshold: 2,
            upper_age_bound: 130.0,
            age_reduction: AgeReduction::Unfiltered,
        }
    }
}

/// Search parameters for the embedded-logo template match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoConfig {
    /// Matches below this quality are discarded.
    pub match_quality_threshold: f32,
    /// `(x_greater_check, y_greater_check)`: the box's bottom-left corner must
    /// lie right of `x * width` and above `y * height`.
    pub xy_position_threshold: (f32, f32),
    /// `(start, end, step)` scale factors tried on the base image.
    pub rescale_steps: (f32, f32, f32),
    /// Stop scanning scales once a match reaches this quality.
    pub stop_threshold: f32,
    /// `(left_trim, bottom_keep)`: fraction of width skipped from the left,
    /// fraction of height kept from the top, when building the search region.
    pub crop_fractions: (f32, f32),
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            match_quality_threshold: 0.25,
            xy_position_threshold: (1.0 / 3.0, 1.0 / 2.5),
            rescale_steps: (0.5, 2.5, 0.1),
            stop_threshold: 0.875,
            crop_fractions: (0.15, 0.5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderConfig {
    pub signal_strength_threshold: f32,
    pub min_border_separation: f32,
    pub search_space_fraction: f32,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            signal_strength_threshold: 0.25,
            min_border_separation: 0.15,
            search_space_fraction: 0.9,
        }
    }
}

/// Thresholds for the final accept/reject decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// A problem label scoring above this marks the image invalid.
    pub image_problem_threshold: f32,
    /// The valid label must score at least this to be believed.
    pub valid_floor: f32,
    pub require_grayscale: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            image_problem_threshold: 0.275,
            valid_floor: 0.01,
            require_grayscale: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    pub text: TextConfig,
    pub logo: LogoConfig,
    pub border: BorderConfig,
    pub decision: DecisionConfig,
}

// ═══════════════════════════════════════════════════════════
// Loading & validation
// ═══════════════════════════════════════════════════════════

impl QcConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, QcError> {
        let raw = fs::read_to_string(path)?;
        let config: QcConfig = serde_json::from_str(&raw)
            .map_err(|e| QcError::InvalidConfiguration(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), QcError> {
        self.text.validate()?;
        self.logo.validate()?;
        self.border.validate()?;
        self.decision.validate()
    }
}

fn unit_interval(name: &str, value: f32) -> Result<(), QcError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(QcError::InvalidConfiguration(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

fn open_fraction(name: &str, value: f32) -> Result<(), QcError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(QcError::InvalidConfiguration(format!(
            "{name} must be within (0, 1], got {value}"
        )))
    }
}

impl TextConfig {
    pub fn validate(&self) -> Result<(), QcError> {
        if self.enumeration_grid_threshold == 0 {
            return Err(QcError::InvalidConfiguration(
                "enumeration_grid_threshold must be at least 1".into(),
            ));
        }
        if !(self.upper_age_bound > 0.0) {
            return Err(QcError::InvalidConfiguration(format!(
                "upper_age_bound must be positive, got {}",
                self.upper_age_bound
            )));
        }
        Ok(())
    }
}

impl LogoConfig {
    pub fn validate(&self) -> Result<(), QcError> {
        unit_interval("match_quality_threshold", self.match_quality_threshold)?;
        unit_interval("stop_threshold", self.stop_threshold)?;
        unit_interval("xy_position_threshold.0", self.xy_position_threshold.0)?;
        unit_interval("xy_position_threshold.1", self.xy_position_threshold.1)?;
        unit_interval("crop_fractions.0", self.crop_fractions.0)?;
        open_fraction("crop_fractions.1", self.crop_fractions.1)?;
        if self.crop_fractions.0 >= 1.0 {
            return Err(QcError::InvalidConfiguration(
                "crop_fractions.0 must leave part of the image to search".into(),
            ));
        }

        let (start, end, step) = self.rescale_steps;
        if !(start > 0.0 && step > 0.0 && end >= start) {
            return Err(QcError::InvalidConfiguration(format!(
                "rescale_steps must be positive and ascending, got ({start}, {end}, {step})"
            )));
        }
        Ok(())
    }

    /// Scale factors in search order, `start` inclusive, `end` exclusive.
    /// A single-scale range (`start == end`) yields `[start]`.
    pub fn scales(&self) -> Vec<f32> {
        let (start, end, step) = self.rescale_steps;
        if step <= 0.0 || start <= 0.0 {
            return Vec::new();
        }
        if end <= start {
            return vec![start];
        }
        // Tolerance keeps float error from adding a step at `end`.
        let count = ((end - start) / step - 1e-4).ceil() as usize;
        (0..count).map(|i| start + step * i as f32).collect()
    }
}

impl BorderConfig {
    pub fn validate(&self) -> Result<(), QcError> {
        unit_interval("signal_strength_threshold", self.signal_strength_threshold)?;
        unit_interval("min_border_separation", self.min_border_separation)?;
        open_fraction("search_space_fraction", self.search_space_fraction)
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<(), QcError> {
        unit_interval("image_problem_threshold", self.image_problem_threshold)?;
        unit_interval("valid_floor", self.valid_floor)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(QcConfig::default().validate().is_ok());
    }

    #[test]
    fn decision_defaults_match_calibration() {
        let d = DecisionConfig::default();
        assert!((d.image_problem_threshold - 0.275).abs() < f32::EPSILON);
        assert!((d.valid_floor - 0.01).abs() < f32::EPSILON);
        assert!(d.require_grayscale);
    }

    #[test]
    fn threshold_above_one_rejected() {
        let mut config = QcConfig::default();
        config.decision.image_problem_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("image_problem_threshold"));
    }

    #[test]
    fn descending_rescale_steps_rejected() {
        let mut config = QcConfig::default();
        config.logo.rescale_steps = (2.0, 1.0, 0.1);
        assert!(matches!(
            config.validate(),
            Err(QcError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_grid_threshold_rejected() {
        let mut config = QcConfig::default();
        config.text.enumeration_grid_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_search_space_rejected() {
        let mut config = QcConfig::default();
        config.border.search_space_fraction = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("search_space_fraction"));
    }

    #[test]
    fn default_scales_cover_range() {
        let scales = LogoConfig::default().scales();
        assert_eq!(scales.len(), 20);
        assert!((scales[0] - 0.5).abs() < 1e-6);
        assert!(scales.last().unwrap() < &2.5);
    }

    #[test]
    fn single_scale_range() {
        let logo = LogoConfig {
            rescale_steps: (1.0, 1.0, 0.1),
            ..LogoConfig::default()
        };
        assert_eq!(logo.scales(), vec![1.0]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qc.json");
        std::fs::write(&path, r#"{"decision": {"require_grayscale": false}}"#).unwrap();

        let config = QcConfig::from_json_file(&path).unwrap();
        assert!(!config.decision.require_grayscale);
        assert!((config.decision.valid_floor - 0.01).abs() < f32::EPSILON);
        assert_eq!(config.text.enumeration_grid_threshold, 2);
    }

    #[test]
    fn invalid_json_values_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qc.json");
        std::fs::write(&path, r#"{"logo": {"match_quality_threshold": -0.1}}"#).unwrap();
        assert!(QcConfig::from_json_file(&path).is_err());
    }
}
