//! Structured features guessed from a record's free-text columns.
//!
//! Every heuristic scans a fixed priority list of sources and stops at the
//! first source that yields a signal, so a later source can never contradict
//! an earlier one. Missing inputs and ambiguous signals both come out as
//! `None`; nothing in this module returns an error.

pub mod clean;
pub mod clinical;
pub mod demographics;
pub mod enumeration;
pub mod medpix;
pub mod modality;

pub use clinical::DiseaseVocabulary;

use crate::pipeline_config::TextConfig;
use crate::records::{ImageRecord, TextFeatures};

/// First signal produced by `probe` over the present sources, in order.
pub(crate) fn first_signal<'a, T>(
    sources: &[Option<&'a str>],
    probe: impl Fn(&'a str) -> Option<T>,
) -> Option<T> {
    sources.iter().flatten().find_map(|s| probe(*s))
}

/// Stateless extractor; holds only its thresholds.
#[derive(Debug, Clone, Default)]
pub struct TextFeatureExtractor {
    config: TextConfig,
}

impl TextFeatureExtractor {
    pub fn new(config: TextConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TextConfig {
        &self.config
    }

    pub fn extract(&self, record: &ImageRecord, vocabulary: &DiseaseVocabulary) -> TextFeatures {
        let title = record.title.as_deref();
        let abstract_text = record.r#abstract.as_deref();
        let caption = record.image_caption.as_deref();
        let mention = record.image_mention.as_deref();

        let mut features = TextFeatures::default();

        if medpix::is_tagged_archive(record.journal_title.as_deref()) {
            let sections = medpix::extract_sections(abstract_text);
            features.history = sections.history;
            features.findings = sections.findings;
            features.diagnosis = sections.diagnosis;
        } else {
            features.diagnosis =
                clinical::guess_disease(&[title, caption, mention, abstract_text], vocabulary);
        }

        let history = features.history.as_deref();
        // The caption is scanned twice for age; the repeat is harmless.
        features.age = demographics::guess_age(
            &[history, abstract_text, caption, caption, mention],
            &self.config,
        );

        let patient_sources = [history, abstract_text, caption, mention];
        let (ethnicity, abbreviation_sex) = demographics::guess_ethnicity(&patient_sources);
        features.sex = demographics::guess_sex(&patient_sources).or(abbreviation_sex);
        features.ethnicity = ethnicity;
        features.illness_duration_years = clinical::guess_illness_duration(&patient_sources);

        features.caption_imaging_modality =
            modality::guess_modality(&[caption, mention, abstract_text]);
        features.image_plane = modality::guess_plane(caption);
        features.image_problems_from_text = caption.and_then(|c| {
            enumeration::caption_problems(c, self.config.enumeration_grid_threshold)
        });

        features
    }
}
