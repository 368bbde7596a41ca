use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::ImageRecord;
use crate::pipeline::QcError;

/// A pipeline stage and the column(s) it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TextFeatures,
    Grayscale,
    Logo,
    Border,
    CropDecision,
    VisualProblems,
    Validity,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::TextFeatures,
        Stage::Grayscale,
        Stage::Logo,
        Stage::Border,
        Stage::CropDecision,
        Stage::VisualProblems,
        Stage::Validity,
    ];

    /// Stages whose columns this stage reads.
    pub fn inputs(&self) -> &'static [Stage] {
        match self {
            Stage::TextFeatures | Stage::Grayscale | Stage::Logo | Stage::Border => &[],
            Stage::CropDecision => &[Stage::Logo, Stage::Border],
            Stage::VisualProblems => &[Stage::CropDecision],
            Stage::Validity => &[Stage::TextFeatures, Stage::Grayscale, Stage::VisualProblems],
        }
    }

    /// Name of the primary column this stage writes. Used in dependency errors.
    pub fn column(&self) -> &'static str {
        match self {
            Stage::TextFeatures => "image_problems_from_text",
            Stage::Grayscale => "grayscale",
            Stage::Logo => "medpix_logo_bounding_box",
            Stage::Border => "hborder",
            Stage::CropDecision => "upper_crop",
            Stage::VisualProblems => "visual_image_problems",
            Stage::Validity => "valid_image",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    #[default]
    NotRun,
    Computed,
}

/// In-memory record set plus an explicit completion flag per stage.
///
/// Completion is tracked here rather than inferred from field values, so a
/// column computed as all-`None` is distinguishable from one never computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordTable {
    records: Vec<ImageRecord>,
    #[serde(default)]
    stages: BTreeMap<Stage, StageState>,
}

impl RecordTable {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self {
            records,
            stages: BTreeMap::new(),
        }
    }

    /// Load a table from JSON: either a bare array of records or a
    /// previously saved table with its stage ledger.
    pub fn from_json_file(path: &Path) -> Result<Self, QcError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, QcError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| QcError::Records(e.to_string()))?;
        if value.is_array() {
            let records: Vec<ImageRecord> =
                serde_json::from_value(value).map_err(|e| QcError::Records(e.to_string()))?;
            Ok(Self::new(records))
        } else {
            serde_json::from_value(value).map_err(|e| QcError::Records(e.to_string()))
        }
    }

    pub fn to_json_file(&self, path: &Path) -> Result<(), QcError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| QcError::Records(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [ImageRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ImageRecord> {
        self.records
    }

    pub fn state(&self, stage: Stage) -> StageState {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    pub fn is_computed(&self, stage: Stage) -> bool {
        self.state(stage) == StageState::Computed
    }

    /// Record `stage` as computed and reset every stage downstream of it,
    /// so their columns are rebuilt from the new values.
    pub fn mark_computed(&mut self, stage: Stage) {
        self.stages.insert(stage, StageState::Computed);

        let mut changed = vec![stage];
        while let Some(upstream) = changed.pop() {
            for dependent in Stage::ALL {
                if dependent.inputs().contains(&upstream)
                    && self.stages.remove(&dependent).is_some()
                {
                    debug!(stage = ?dependent, upstream = ?upstream, "stage invalidated");
                    changed.push(dependent);
                }
            }
        }
    }

    /// Fail fast with the missing column's name unless `stage` has run.
    pub fn require(&self, stage: Stage) -> Result<(), QcError> {
        if self.is_computed(stage) {
            Ok(())
        } else {
            Err(QcError::missing(stage.column()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_has_no_computed_stages() {
        let table = RecordTable::new(vec![ImageRecord::new("/a.png")]);
        assert_eq!(table.state(Stage::Grayscale), StageState::NotRun);
        assert!(!table.is_computed(Stage::Validity));
    }

    #[test]
    fn require_names_missing_column() {
        let table = RecordTable::new(vec![]);
        let err = table.require(Stage::VisualProblems).unwrap_err();
        match err {
            QcError::MissingDependency { column } => assert_eq!(column, "visual_image_problems"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mark_computed_satisfies_require() {
        let mut table = RecordTable::new(vec![]);
        table.mark_computed(Stage::Grayscale);
        assert!(table.require(Stage::Grayscale).is_ok());
    }

    #[test]
    fn recompute_resets_downstream_stages() {
        let mut table = RecordTable::new(vec![]);
        for stage in Stage::ALL {
            table.mark_computed(stage);
        }
        assert!(Stage::ALL.iter().all(|s| table.is_computed(*s)));

        table.mark_computed(Stage::Border);
        assert!(table.is_computed(Stage::Border));
        assert!(table.is_computed(Stage::Logo));
        assert!(table.is_computed(Stage::Grayscale));
        assert!(table.is_computed(Stage::TextFeatures));
        assert!(!table.is_computed(Stage::CropDecision));
        assert!(!table.is_computed(Stage::VisualProblems));
        assert!(!table.is_computed(Stage::Validity));
    }

    #[test]
    fn recompute_of_grayscale_only_resets_validity() {
        let mut table = RecordTable::new(vec![]);
        for stage in Stage::ALL {
            table.mark_computed(stage);
        }
        table.mark_computed(Stage::Grayscale);
        assert!(table.is_computed(Stage::VisualProblems));
        assert!(table.is_computed(Stage::CropDecision));
        assert_eq!(table.state(Stage::Validity), StageState::NotRun);
    }

    #[test]
    fn loads_provider_column_name() {
        let table = RecordTable::from_json_str(
            r#"[{"cached_images_path": "/cache/a.png", "title": "x"}]"#,
        )
        .unwrap();
        assert_eq!(table.records()[0].cached_image_path, Path::new("/cache/a.png"));
        assert_eq!(table.records()[0].title.as_deref(), Some("x"));
    }

    #[test]
    fn loads_bare_record_array() {
        let table = RecordTable::from_json_str(
            r#"[{"cached_image_path": "/a.png"}, {"cached_image_path": "/b.png"}]"#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.is_computed(Stage::Grayscale));
    }

    #[test]
    fn stage_ledger_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let mut table = RecordTable::new(vec![ImageRecord::new("/a.png")]);
        table.records_mut()[0].grayscale = Some(true);
        table.mark_computed(Stage::Grayscale);
        table.to_json_file(&path).unwrap();

        let loaded = RecordTable::from_json_file(&path).unwrap();
        assert!(loaded.is_computed(Stage::Grayscale));
        assert_eq!(loaded.records()[0].grayscale, Some(true));
    }

    #[test]
    fn malformed_json_is_records_error() {
        let err = RecordTable::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, QcError::Records(_)));
    }
}
