use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::records::BoundingBox;

/// Rows between which an image is kept: `upper_crop..lower_crop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropWindow {
    pub upper: Option<u32>,
    pub lower: Option<u32>,
}

/// Tightest window that excludes every detected border, bar and logo.
/// Boundaries only ever move inward.
pub fn reconcile_crop(
    hborder: Option<(u32, u32)>,
    hbar: Option<u32>,
    logo: Option<&BoundingBox>,
) -> CropWindow {
    let upper = [hborder.map(|(top, _)| top), logo.map(|b| b.bottom_left.1)]
        .into_iter()
        .flatten()
        .max();
    let lower = [hborder.map(|(_, bottom)| bottom), hbar]
        .into_iter()
        .flatten()
        .min();
    CropWindow { upper, lower }
}

/// Crop to `window` rows and `vborder` columns. Bounds are clamped to the
/// image; a window that leaves nothing is skipped and the image returned whole.
pub fn apply_crop(
    image: &DynamicImage,
    window: CropWindow,
    vborder: Option<(u32, u32)>,
) -> DynamicImage {
    let (width, height) = image.dimensions();

    let bottom = window.lower.map_or(height, |l| l.min(height));
    let top = window.upper.map_or(0, |u| u.min(bottom));
    let (left, right) = vborder.map_or((0, width), |(l, r)| (l.min(width), r.min(width)));

    if bottom <= top || right <= left {
        warn!(top, bottom, left, right, "crop window is empty, keeping full image");
        return image.clone();
    }
    if (top, bottom, left, right) == (0, height, 0, width) {
        return image.clone();
    }
    image.crop_imm(left, top, right - left, bottom - top)
}
