use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::pipeline_config::BorderConfig;

/// Solid bars and borders found around the image content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderReport {
    /// Row of a uniform horizontal bar cutting across the content.
    pub hbar: Option<u32>,
    /// Half-open `(top, bottom)` rows of the content.
    pub hborder: Option<(u32, u32)>,
    /// Half-open `(left, right)` columns of the content.
    pub vborder: Option<(u32, u32)>,
}

pub trait BorderDetector: Send + Sync {
    fn detect(&self, image: &GrayImage, config: &BorderConfig) -> BorderReport;
}

/// Reads borders off row and column standard-deviation profiles of the
/// min-max rescaled image: flat margins have near-zero spread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProjectionBorderDetector;

/// Spread below this counts as a uniform line.
const UNIFORM_EPSILON: f64 = 1e-9;

fn std_dev(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean = values.clone().sum::<f64>() / n;
    (values.map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Row and column spread of `image` rescaled to `[0, 1]`, or `None` for a
/// flat image.
fn profiles(image: &GrayImage) -> Option<(Vec<f64>, Vec<f64>)> {
    let (w, h) = image.dimensions();
    let raw = image.as_raw();
    let min = *raw.iter().min()?;
    let max = *raw.iter().max()?;
    if max == min {
        return None;
    }
    let range = f64::from(max - min);
    let scaled: Vec<f64> = raw.iter().map(|p| f64::from(p - min) / range).collect();

    let (w, h) = (w as usize, h as usize);
    let rows = (0..h)
        .map(|y| std_dev(scaled[y * w..(y + 1) * w].iter().copied()))
        .collect();
    let cols = (0..w)
        .map(|x| std_dev((0..h).map(|y| scaled[y * w + x])))
        .collect();
    Some((rows, cols))
}

/// First and last index whose spread exceeds `fraction` of the peak.
fn content_band(profile: &[f64], fraction: f32) -> Option<(usize, usize)> {
    let peak = profile.iter().copied().fold(0.0, f64::max);
    if peak <= UNIFORM_EPSILON {
        return None;
    }
    let cutoff = peak * f64::from(fraction);
    let first = profile.iter().position(|s| *s > cutoff)?;
    let last = profile.iter().rposition(|s| *s > cutoff)?;
    Some((first, last))
}

/// Half-open border extent, kept only if it trims something and leaves at
/// least `min_separation` of the dimension.
fn border_extent(band: (usize, usize), len: usize, min_separation: f32) -> Option<(u32, u32)> {
    let (first, last) = band;
    let end = last + 1;
    let trims = first > 0 || end < len;
    let wide_enough = (end - first) as f32 >= min_separation * len as f32;
    (trims && wide_enough).then_some((first as u32, end as u32))
}

impl BorderDetector for ProjectionBorderDetector {
    fn detect(&self, image: &GrayImage, config: &BorderConfig) -> BorderReport {
        let Some((rows, cols)) = profiles(image) else {
            return BorderReport::default();
        };
        let height = rows.len();

        let row_band = content_band(&rows, config.signal_strength_threshold);
        let col_band = content_band(&cols, config.signal_strength_threshold);

        let lowest_bar_row = height as f32 * (1.0 - config.search_space_fraction);
        let hbar = row_band.and_then(|(first, last)| {
            (first + 1..last)
                .find(|&y| rows[y] <= UNIFORM_EPSILON && y as f32 >= lowest_bar_row)
                .map(|y| y as u32)
        });

        BorderReport {
            hbar,
            hborder: row_band
                .and_then(|band| border_extent(band, height, config.min_border_separation)),
            vborder: col_band
                .and_then(|band| border_extent(band, cols.len(), config.min_border_separation)),
        }
    }
}
