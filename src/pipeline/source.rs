use std::path::Path;

use image::DynamicImage;

use super::QcError;

/// Where the processor reads cached images from.
pub trait ImageSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<DynamicImage, QcError>;
}

/// Decodes images from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsImageSource;

impl ImageSource for FsImageSource {
    fn load(&self, path: &Path) -> Result<DynamicImage, QcError> {
        if !path.exists() {
            return Err(QcError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("image not found: {}", path.display()),
            )));
        }
        image::open(path).map_err(|e| QcError::ImageDecode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, GrayImage, Luma};

    #[test]
    fn loads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        GrayImage::from_pixel(7, 3, Luma([90])).save(&path).unwrap();

        let image = FsImageSource.load(&path).unwrap();
        assert_eq!(image.dimensions(), (7, 3));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = FsImageSource.load(Path::new("/nonexistent/img.png")).unwrap_err();
        assert!(matches!(err, QcError::Io(_)));
    }

    #[test]
    fn corrupt_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let err = FsImageSource.load(&path).unwrap_err();
        assert!(matches!(err, QcError::ImageDecode { .. }));
    }
}
