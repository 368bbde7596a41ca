//! Writing accepted images out to caller-chosen directories.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, info};

use super::geometry::{apply_crop, CropWindow};
use super::source::ImageSource;
use super::QcError;
use crate::records::{ImageRecord, RecordTable, Stage};

/// Destination directory for a record; `None` skips the record.
pub trait SaveRule {
    fn destination(&self, record: &ImageRecord) -> Option<PathBuf>;
}

/// Every record goes to the same directory.
#[derive(Debug, Clone)]
pub struct ConstantDirectory(pub PathBuf);

impl SaveRule for ConstantDirectory {
    fn destination(&self, _: &ImageRecord) -> Option<PathBuf> {
        Some(self.0.clone())
    }
}

/// Directory computed per record by a caller-supplied function.
pub struct PerRecordRule<F>(pub F);

impl<F> SaveRule for PerRecordRule<F>
where
    F: Fn(&ImageRecord) -> Option<PathBuf>,
{
    fn destination(&self, record: &ImageRecord) -> Option<PathBuf> {
        (self.0)(record)
    }
}

#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Create missing destination directories instead of failing.
    pub create_dirs: bool,
    pub allow_overwrite: bool,
    /// Re-crop using the crop decision and vertical border.
    pub crop_images: bool,
    pub convert_to_rgb: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            create_dirs: false,
            allow_overwrite: true,
            crop_images: true,
            convert_to_rgb: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SaveReport {
    pub saved: Vec<PathBuf>,
    pub skipped_existing: usize,
    pub skipped_by_rule: usize,
}

fn ensure_directory(dir: &Path, create: bool) -> Result<(), QcError> {
    if dir.is_dir() {
        return Ok(());
    }
    if create {
        fs::create_dir_all(dir)?;
        Ok(())
    } else {
        Err(QcError::DestinationMissing(dir.to_path_buf()))
    }
}

fn prepare_image(
    source: &dyn ImageSource,
    record: &ImageRecord,
    options: &SaveOptions,
) -> Result<DynamicImage, QcError> {
    let mut image = source.load(&record.cached_image_path)?;
    if options.crop_images {
        let window = CropWindow {
            upper: record.upper_crop,
            lower: record.lower_crop,
        };
        image = apply_crop(&image, window, record.vborder);
    }
    if options.convert_to_rgb {
        image = DynamicImage::ImageRgb8(image.to_rgb8());
    }
    Ok(image)
}

/// Save every record marked valid. Requires the validity decision to have run.
pub fn save_valid(
    table: &RecordTable,
    source: &dyn ImageSource,
    rule: &dyn SaveRule,
    options: &SaveOptions,
) -> Result<SaveReport, QcError> {
    table.require(Stage::Validity)?;
    if options.crop_images {
        table.require(Stage::CropDecision)?;
    }

    let mut report = SaveReport::default();
    for record in table.records().iter().filter(|r| r.valid_image == Some(true)) {
        let Some(dir) = rule.destination(record) else {
            report.skipped_by_rule += 1;
            continue;
        };
        ensure_directory(&dir, options.create_dirs)?;

        let file_name = record.cached_image_path.file_name().ok_or_else(|| {
            QcError::Records(format!(
                "cached image path has no file name: {}",
                record.cached_image_path.display()
            ))
        })?;
        let target = dir.join(file_name);
        if !options.allow_overwrite && target.exists() {
            debug!(path = %target.display(), "skipping existing file");
            report.skipped_existing += 1;
            continue;
        }

        let image = prepare_image(source, record, options)?;
        image.save(&target).map_err(|e| QcError::ImageEncode {
            path: target.clone(),
            reason: e.to_string(),
        })?;
        report.saved.push(target);
    }

    info!(
        saved = report.saved.len(),
        skipped_existing = report.skipped_existing,
        skipped_by_rule = report.skipped_by_rule,
        "valid images saved"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::source::FsImageSource;
    use image::{GenericImageView, GrayImage, Luma};

    /// Two cached 20x10 images, the first valid, the second not.
    fn fixture(dir: &Path) -> RecordTable {
        let mut records = Vec::new();
        for (name, valid) in [("a.png", true), ("b.png", false)] {
            let path = dir.join(name);
            GrayImage::from_pixel(20, 10, Luma([120])).save(&path).unwrap();
            let mut record = ImageRecord::new(&path);
            record.valid_image = Some(valid);
            record.upper_crop = Some(2);
            record.lower_crop = Some(8);
            record.vborder = Some((5, 15));
            records.push(record);
        }
        let mut table = RecordTable::new(records);
        table.mark_computed(Stage::CropDecision);
        table.mark_computed(Stage::Validity);
        table
    }

    #[test]
    fn only_valid_images_saved_and_cropped() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let table = fixture(cache.path());

        let report = save_valid(
            &table,
            &FsImageSource,
            &ConstantDirectory(out.path().to_path_buf()),
            &SaveOptions::default(),
        )
        .unwrap();

        assert_eq!(report.saved, vec![out.path().join("a.png")]);
        assert!(!out.path().join("b.png").exists());
        let saved = image::open(out.path().join("a.png")).unwrap();
        assert_eq!(saved.dimensions(), (10, 6));
    }

    #[test]
    fn missing_directory_fails_unless_created() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = out.path().join("nested/dir");
        let table = fixture(cache.path());
        let rule = ConstantDirectory(target.clone());

        let err = save_valid(&table, &FsImageSource, &rule, &SaveOptions::default()).unwrap_err();
        assert!(matches!(err, QcError::DestinationMissing(_)));

        let options = SaveOptions {
            create_dirs: true,
            ..SaveOptions::default()
        };
        let report = save_valid(&table, &FsImageSource, &rule, &options).unwrap();
        assert_eq!(report.saved.len(), 1);
        assert!(target.join("a.png").exists());
    }

    #[test]
    fn existing_file_kept_without_overwrite() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let table = fixture(cache.path());
        fs::write(out.path().join("a.png"), b"keep").unwrap();

        let options = SaveOptions {
            allow_overwrite: false,
            ..SaveOptions::default()
        };
        let rule = ConstantDirectory(out.path().to_path_buf());
        let report = save_valid(&table, &FsImageSource, &rule, &options).unwrap();

        assert_eq!(report.skipped_existing, 1);
        assert_eq!(fs::read(out.path().join("a.png")).unwrap(), b"keep");
    }

    #[test]
    fn per_record_rule_can_skip() {
        let cache = tempfile::tempdir().unwrap();
        let table = fixture(cache.path());
        let rule = PerRecordRule(|_: &ImageRecord| -> Option<PathBuf> { None });

        let report = save_valid(&table, &FsImageSource, &rule, &SaveOptions::default()).unwrap();
        assert_eq!(report.skipped_by_rule, 1);
        assert!(report.saved.is_empty());
    }

    #[test]
    fn uncropped_rgb_save() {
        let cache = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let table = fixture(cache.path());
        let options = SaveOptions {
            crop_images: false,
            convert_to_rgb: true,
            ..SaveOptions::default()
        };
        let rule = ConstantDirectory(out.path().to_path_buf());
        save_valid(&table, &FsImageSource, &rule, &options).unwrap();

        let saved = image::open(out.path().join("a.png")).unwrap();
        assert_eq!(saved.dimensions(), (20, 10));
        assert!(matches!(saved, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn save_requires_validity_decision() {
        let table = RecordTable::new(vec![ImageRecord::new("/cache/a.png")]);
        let rule = ConstantDirectory(PathBuf::from("/tmp"));
        let err = save_valid(&table, &FsImageSource, &rule, &SaveOptions::default()).unwrap_err();
        assert!(matches!(err, QcError::MissingDependency { column: "valid_image" }));
    }
}
