//! Final accept/reject decision from the text, colour and classifier signals.

use tracing::debug;

use super::QcError;
use crate::pipeline_config::DecisionConfig;
use crate::records::{ClassScore, ImageProblem, ImageRecord, Stage};

/// Why an image was rejected; the first matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotGrayscale,
    TextProblems,
    /// Classifier returned no scores.
    NoScores,
    /// Valid label on top but below the confidence floor.
    WeakValid,
    /// A problem label on top above the threshold.
    ProblemDetected,
    /// Valid label on top but the runner-up problem exceeds the threshold.
    NearTiedProblem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(Rejection),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

pub struct ValidityFusion {
    config: DecisionConfig,
}

impl ValidityFusion {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn decide(
        &self,
        grayscale: Option<bool>,
        text_problems: Option<&[ImageProblem]>,
        visual: &[ClassScore],
    ) -> Verdict {
        let threshold = self.config.image_problem_threshold;

        if self.config.require_grayscale && grayscale == Some(false) {
            return Verdict::Invalid(Rejection::NotGrayscale);
        }
        if text_problems.is_some_and(|p| !p.is_empty()) {
            return Verdict::Invalid(Rejection::TextProblems);
        }

        let Some(top) = visual.first() else {
            return Verdict::Invalid(Rejection::NoScores);
        };
        if top.is_valid_label() {
            if top.probability < self.config.valid_floor {
                return Verdict::Invalid(Rejection::WeakValid);
            }
            if visual.get(1).is_some_and(|second| second.probability > threshold) {
                return Verdict::Invalid(Rejection::NearTiedProblem);
            }
        } else if top.probability > threshold {
            return Verdict::Invalid(Rejection::ProblemDetected);
        }
        Verdict::Valid
    }

    /// Decide one record. `visual_image_problems` must be filled in.
    pub fn decide_record(&self, record: &ImageRecord) -> Result<Verdict, QcError> {
        let visual = record
            .visual_image_problems
            .as_deref()
            .ok_or_else(|| QcError::missing(Stage::VisualProblems.column()))?;

        let verdict = self.decide(record.grayscale, record.image_problems_from_text(), visual);
        if let Verdict::Invalid(reason) = verdict {
            debug!(path = %record.cached_image_path.display(), ?reason, "image rejected");
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fusion() -> ValidityFusion {
        ValidityFusion::new(DecisionConfig::default())
    }

    fn scores(pairs: &[(&str, f32)]) -> Vec<ClassScore> {
        pairs.iter().map(|&p| ClassScore::from(p)).collect()
    }

    #[test]
    fn colour_image_rejected_regardless_of_classifier() {
        let visual = scores(&[("valid_img", 0.99), ("arrows", 0.01)]);
        assert_eq!(
            fusion().decide(Some(false), None, &visual),
            Verdict::Invalid(Rejection::NotGrayscale)
        );
    }

    #[test]
    fn colour_allowed_when_not_required() {
        let fusion = ValidityFusion::new(DecisionConfig {
            require_grayscale: false,
            ..DecisionConfig::default()
        });
        let visual = scores(&[("valid_img", 0.99)]);
        assert!(fusion.decide(Some(false), None, &visual).is_valid());
    }

    #[test]
    fn confident_valid_image_accepted() {
        let visual = scores(&[("valid_img", 0.97), ("arrows", 0.02), ("grids", 0.01)]);
        assert_eq!(fusion().decide(Some(true), None, &visual), Verdict::Valid);
    }

    #[test]
    fn grid_on_top_rejected() {
        let visual = scores(&[("grids", 0.86), ("valid_img", 0.0003), ("arrows", 0.0)]);
        assert_eq!(
            fusion().decide(Some(true), None, &visual),
            Verdict::Invalid(Rejection::ProblemDetected)
        );
    }

    #[test]
    fn weak_problem_on_top_accepted() {
        let visual = scores(&[("arrows", 0.2), ("valid_img", 0.19), ("grids", 0.1)]);
        assert!(fusion().decide(Some(true), None, &visual).is_valid());
    }

    #[test]
    fn text_problems_reject() {
        let visual = scores(&[("valid_img", 0.97)]);
        assert_eq!(
            fusion().decide(Some(true), Some(&[ImageProblem::Arrows]), &visual),
            Verdict::Invalid(Rejection::TextProblems)
        );
        assert!(fusion().decide(Some(true), Some(&[]), &visual).is_valid());
    }

    #[test]
    fn valid_below_floor_rejected() {
        let visual = scores(&[("valid_img", 0.005), ("arrows", 0.004)]);
        assert_eq!(
            fusion().decide(Some(true), None, &visual),
            Verdict::Invalid(Rejection::WeakValid)
        );
    }

    #[test]
    fn near_tied_problem_rejected() {
        let visual = scores(&[("valid_img", 0.5), ("arrows", 0.45), ("grids", 0.05)]);
        assert_eq!(
            fusion().decide(Some(true), None, &visual),
            Verdict::Invalid(Rejection::NearTiedProblem)
        );
    }

    #[test]
    fn empty_scores_rejected() {
        assert_eq!(
            fusion().decide(Some(true), None, &[]),
            Verdict::Invalid(Rejection::NoScores)
        );
    }

    #[test]
    fn record_without_scores_is_missing_dependency() {
        let record = ImageRecord::new("/cache/a.png");
        let err = fusion().decide_record(&record).unwrap_err();
        assert!(matches!(
            err,
            QcError::MissingDependency { column: "visual_image_problems" }
        ));
    }
}
