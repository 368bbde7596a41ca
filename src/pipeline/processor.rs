//! Stage driver over the record table.
//!
//! `ImageProcessor` owns the table for the length of a run and fills in one
//! column group per stage. Every stage is a no-op once computed unless
//! `new_analysis` is set; stages that consume another stage's columns fail
//! fast with `MissingDependency` when it has not run.

use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::classify::VisualClassifier;
use super::fusion::ValidityFusion;
use super::geometry::{apply_crop, reconcile_crop, CropWindow, GeometricAnalyzer};
use super::save::{save_valid, SaveOptions, SaveReport, SaveRule};
use super::source::{FsImageSource, ImageSource};
use super::text::{DiseaseVocabulary, TextFeatureExtractor};
use super::QcError;
use crate::config;
use crate::pipeline_config::QcConfig;
use crate::records::{RecordTable, Stage};

/// Images scored per classifier call.
const CLASSIFIER_BATCH: usize = 32;

/// Summary of one `auto` run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: usize,
    pub valid: usize,
}

/// Linear progress events for a stage; silent unless enabled.
struct Progress {
    stage: Stage,
    total: usize,
    enabled: bool,
}

impl Progress {
    fn new(stage: Stage, total: usize, enabled: bool) -> Self {
        Self {
            stage,
            total,
            enabled,
        }
    }

    fn tick(&self, done: usize) {
        if self.enabled {
            debug!(stage = ?self.stage, done, total = self.total, "stage progress");
        }
    }
}

// ---------------------------------------------------------------------------
// ImageProcessor
// ---------------------------------------------------------------------------

pub struct ImageProcessor {
    table: RecordTable,
    config: QcConfig,
    source: Box<dyn ImageSource>,
    analyzer: GeometricAnalyzer,
    classifier: VisualClassifier,
    extractor: TextFeatureExtractor,
    fusion: ValidityFusion,
    vocabulary: DiseaseVocabulary,
    /// Gray rasters in table row order, shared by the logo and border stages.
    gray_cache: Option<Vec<GrayImage>>,
    run_id: Uuid,
}

impl ImageProcessor {
    /// Build a processor around `table`. The configuration is validated
    /// here so no stage can start with out-of-range parameters.
    pub fn new(
        table: RecordTable,
        config: QcConfig,
        source: Box<dyn ImageSource>,
        analyzer: GeometricAnalyzer,
        classifier: VisualClassifier,
        vocabulary: DiseaseVocabulary,
    ) -> Result<Self, QcError> {
        config.validate()?;
        let run_id = Uuid::new_v4();
        info!(%run_id, records = table.len(), "image processor created");

        Ok(Self {
            extractor: TextFeatureExtractor::new(config.text.clone()),
            fusion: ValidityFusion::new(config.decision.clone()),
            table,
            config,
            source,
            analyzer,
            classifier,
            vocabulary,
            gray_cache: None,
            run_id,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    pub fn into_table(self) -> RecordTable {
        self.table
    }

    pub fn classifier_mut(&mut self) -> &mut VisualClassifier {
        &mut self.classifier
    }

    /// Drop the cached gray rasters; the next raster stage reloads them.
    pub fn reload_override(&mut self) {
        if self.gray_cache.take().is_some() {
            debug!(run_id = %self.run_id, "raster cache invalidated");
        }
    }

    /// Whether `stage` can be skipped. Logs the skip.
    fn skip(&self, stage: Stage, new_analysis: bool) -> bool {
        let skip = !new_analysis && self.table.is_computed(stage);
        if skip {
            debug!(run_id = %self.run_id, stage = ?stage, "already computed, skipping");
        }
        skip
    }

    fn load(&self, index: usize) -> Result<DynamicImage, QcError> {
        self.source.load(&self.table.records()[index].cached_image_path)
    }

    /// Fill the raster cache if empty; progress is reported under `stage`.
    fn ensure_gray_cache(&mut self, stage: Stage, status: bool) -> Result<(), QcError> {
        if self.gray_cache.is_some() {
            return Ok(());
        }
        let total = self.table.len();
        let progress = Progress::new(stage, total, status);
        let mut rasters = Vec::with_capacity(total);
        for index in 0..total {
            rasters.push(self.load(index)?.to_luma8());
            progress.tick(index + 1);
        }
        debug!(run_id = %self.run_id, rasters = rasters.len(), "raster cache filled");
        self.gray_cache = Some(rasters);
        Ok(())
    }

    // -- Stages --------------------------------------------------------------

    /// Fill `text_features` from the free-text columns.
    pub fn text_analysis(&mut self, new_analysis: bool, status: bool) -> Result<(), QcError> {
        if self.skip(Stage::TextFeatures, new_analysis) {
            return Ok(());
        }
        info!(run_id = %self.run_id, records = self.table.len(), "text analysis started");

        let progress = Progress::new(Stage::TextFeatures, self.table.len(), status);
        for (i, record) in self.table.records_mut().iter_mut().enumerate() {
            record.text_features = Some(self.extractor.extract(record, &self.vocabulary));
            progress.tick(i + 1);
        }
        self.table.mark_computed(Stage::TextFeatures);
        Ok(())
    }

    pub fn grayscale_analysis(&mut self, new_analysis: bool, status: bool) -> Result<(), QcError> {
        if self.skip(Stage::Grayscale, new_analysis) {
            return Ok(());
        }
        info!(run_id = %self.run_id, records = self.table.len(), "grayscale analysis started");

        let progress = Progress::new(Stage::Grayscale, self.table.len(), status);
        let mut results = Vec::with_capacity(self.table.len());
        for index in 0..self.table.len() {
            let image = self.load(index)?;
            results.push(self.analyzer.grayscale(&image));
            progress.tick(index + 1);
        }
        for (record, grayscale) in self.table.records_mut().iter_mut().zip(results) {
            record.grayscale = grayscale;
        }
        self.table.mark_computed(Stage::Grayscale);
        Ok(())
    }

    pub fn logo_analysis(&mut self, new_analysis: bool, status: bool) -> Result<(), QcError> {
        if self.skip(Stage::Logo, new_analysis) {
            return Ok(());
        }
        info!(run_id = %self.run_id, records = self.table.len(), "logo analysis started");
        self.ensure_gray_cache(Stage::Logo, status)?;

        let rasters = self.gray_cache.as_deref().unwrap_or_default();
        let progress = Progress::new(Stage::Logo, rasters.len(), status);
        let mut found = 0usize;
        for (i, (record, gray)) in self.table.records_mut().iter_mut().zip(rasters).enumerate() {
            record.medpix_logo_bounding_box =
                self.analyzer
                    .logo(record.journal_title.as_deref(), gray, &self.config.logo);
            found += usize::from(record.medpix_logo_bounding_box.is_some());
            progress.tick(i + 1);
        }
        info!(run_id = %self.run_id, found, "logo analysis finished");
        self.table.mark_computed(Stage::Logo);
        Ok(())
    }

    /// Fill `hbar`, `hborder` and `vborder`.
    pub fn border_analysis(&mut self, new_analysis: bool, status: bool) -> Result<(), QcError> {
        if self.skip(Stage::Border, new_analysis) {
            return Ok(());
        }
        info!(run_id = %self.run_id, records = self.table.len(), "border analysis started");
        self.ensure_gray_cache(Stage::Border, status)?;

        let rasters = self.gray_cache.as_deref().unwrap_or_default();
        let progress = Progress::new(Stage::Border, rasters.len(), status);
        for (i, (record, gray)) in self.table.records_mut().iter_mut().zip(rasters).enumerate() {
            let report = self.analyzer.borders(gray, &self.config.border);
            record.hbar = report.hbar;
            record.hborder = report.hborder;
            record.vborder = report.vborder;
            progress.tick(i + 1);
        }
        self.table.mark_computed(Stage::Border);
        Ok(())
    }

    /// Reconcile borders, bar and logo into `upper_crop`/`lower_crop`.
    pub fn crop_decision(&mut self, new_analysis: bool, status: bool) -> Result<(), QcError> {
        if self.skip(Stage::CropDecision, new_analysis) {
            return Ok(());
        }
        self.table.require(Stage::Logo)?;
        self.table.require(Stage::Border)?;

        let progress = Progress::new(Stage::CropDecision, self.table.len(), status);
        for (i, record) in self.table.records_mut().iter_mut().enumerate() {
            let window = reconcile_crop(
                record.hborder,
                record.hbar,
                record.medpix_logo_bounding_box.as_ref(),
            );
            if let (Some(upper), Some(lower)) = (window.upper, window.lower) {
                if upper >= lower {
                    warn!(
                        path = %record.cached_image_path.display(),
                        upper,
                        lower,
                        "inverted crop window; image will be used uncropped"
                    );
                }
            }
            debug!(path = %record.cached_image_path.display(), ?window, "crop decided");
            record.upper_crop = window.upper;
            record.lower_crop = window.lower;
            progress.tick(i + 1);
        }
        self.table.mark_computed(Stage::CropDecision);
        Ok(())
    }

    /// Score each cropped image with the visual classifier.
    pub fn visual_image_problems(
        &mut self,
        new_analysis: bool,
        status: bool,
    ) -> Result<(), QcError> {
        if self.skip(Stage::VisualProblems, new_analysis) {
            return Ok(());
        }
        self.table.require(Stage::CropDecision)?;
        if !self.classifier.is_loaded() {
            return Err(QcError::ModelNotLoaded);
        }
        info!(run_id = %self.run_id, records = self.table.len(), "visual classification started");

        let total = self.table.len();
        let progress = Progress::new(Stage::VisualProblems, total, status);
        let mut scores = Vec::with_capacity(total);
        let mut start = 0;
        while start < total {
            let end = (start + CLASSIFIER_BATCH).min(total);
            let mut batch = Vec::with_capacity(end - start);
            for index in start..end {
                let record = &self.table.records()[index];
                let window = CropWindow {
                    upper: record.upper_crop,
                    lower: record.lower_crop,
                };
                let vborder = record.vborder;
                batch.push(apply_crop(&self.load(index)?, window, vborder));
            }
            scores.extend(self.classifier.predict(&batch)?);
            progress.tick(end);
            start = end;
        }

        for (record, ranked) in self.table.records_mut().iter_mut().zip(scores) {
            record.visual_image_problems = Some(ranked);
        }
        self.table.mark_computed(Stage::VisualProblems);
        Ok(())
    }

    // -- Composites ----------------------------------------------------------

    /// Text features, then every raster stage in dependency order.
    pub fn auto_analysis(&mut self, new_analysis: bool, status: bool) -> Result<(), QcError> {
        self.text_analysis(new_analysis, status)?;
        self.grayscale_analysis(new_analysis, status)?;
        self.logo_analysis(new_analysis, status)?;
        self.border_analysis(new_analysis, status)?;
        self.crop_decision(new_analysis, status)?;
        self.visual_image_problems(new_analysis, status)
    }

    /// Fuse the computed columns into `valid_image`.
    pub fn auto_decision(&mut self, new_analysis: bool) -> Result<(), QcError> {
        if self.skip(Stage::Validity, new_analysis) {
            return Ok(());
        }
        self.table.require(Stage::Grayscale)?;
        self.table.require(Stage::VisualProblems)?;

        let verdicts = self
            .table
            .records()
            .iter()
            .map(|record| self.fusion.decide_record(record))
            .collect::<Result<Vec<_>, _>>()?;
        let valid = verdicts.iter().filter(|v| v.is_valid()).count();

        for (record, verdict) in self.table.records_mut().iter_mut().zip(verdicts) {
            record.valid_image = Some(verdict.is_valid());
        }
        self.table.mark_computed(Stage::Validity);
        info!(run_id = %self.run_id, valid, records = self.table.len(), "validity decided");
        Ok(())
    }

    /// Full analysis and decision. Returns the augmented table.
    pub fn auto(
        &mut self,
        new_analysis: bool,
        status: bool,
    ) -> Result<(&RecordTable, RunReport), QcError> {
        let span = info_span!("qc_run", run_id = %self.run_id);
        let _guard = span.enter();
        let started_at = Utc::now();

        self.auto_analysis(new_analysis, status)?;
        self.auto_decision(new_analysis)?;

        let report = RunReport {
            run_id: self.run_id,
            started_at,
            records: self.table.len(),
            valid: self
                .table
                .records()
                .iter()
                .filter(|r| r.valid_image == Some(true))
                .count(),
        };
        info!(
            records = report.records,
            valid = report.valid,
            "quality control run finished"
        );
        Ok((&self.table, report))
    }

    /// Write every valid image under the directory `rule` picks for it.
    pub fn save(&self, rule: &dyn SaveRule, options: &SaveOptions) -> Result<SaveReport, QcError> {
        save_valid(&self.table, self.source.as_ref(), rule, options)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build an `ImageProcessor` with production implementations.
///
/// - Images: `FsImageSource`
/// - Geometry: reference primitives; logo detection only when the logo
///   template exists under the app data directory
/// - Classifier: ONNX weights at the default path (feature-gated), otherwise
///   unloaded until the caller provides a backend
pub fn build_processor(
    table: RecordTable,
    config: QcConfig,
    vocabulary: DiseaseVocabulary,
) -> Result<ImageProcessor, QcError> {
    let template_path = config::default_logo_template_path();
    let template = if template_path.exists() {
        let template = FsImageSource.load(&template_path)?.to_luma8();
        info!(path = %template_path.display(), "logo template loaded");
        Some(template)
    } else {
        warn!(path = %template_path.display(), "logo template not found, logo detection disabled");
        None
    };

    ImageProcessor::new(
        table,
        config,
        Box::new(FsImageSource),
        GeometricAnalyzer::with_defaults(template),
        build_classifier()?,
        vocabulary,
    )
}

fn build_classifier() -> Result<VisualClassifier, QcError> {
    #[cfg(feature = "onnx-classifier")]
    {
        let path = config::default_classifier_path();
        if path.exists() {
            let backend = super::classify::onnx::OnnxBackend::load(&path)?;
            return Ok(VisualClassifier::new(Box::new(backend)));
        }
        warn!(path = %path.display(), "classifier weights not found");
    }

    info!("visual classifier not loaded; call classifier_mut().load() before classification");
    Ok(VisualClassifier::unloaded())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
