//! Multi-scale template matching used to locate an embedded logo.

use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::debug;

use crate::pipeline_config::LogoConfig;
use crate::records::BoundingBox;

/// Best placement of a pattern within a base image.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Box in base-image pixel coordinates; `None` if the pattern never fit.
    pub bounding_box: Option<BoundingBox>,
    /// Correlation score clamped to `[0, 1]`.
    pub match_quality: f32,
    /// `(width, height)` of the full base image.
    pub base_image_shape: (u32, u32),
}

impl MatchResult {
    pub fn no_match(base: &GrayImage) -> Self {
        Self {
            bounding_box: None,
            match_quality: 0.0,
            base_image_shape: base.dimensions(),
        }
    }
}

/// Searches `base` for `pattern` across `config.scales()`, restricted to the
/// `config.crop_fractions` search region.
pub trait TemplateMatcher: Send + Sync {
    fn find(&self, pattern: &GrayImage, base: &GrayImage, config: &LogoConfig) -> MatchResult;
}

/// Zero-mean normalized cross-correlation. The search region is rescaled
/// rather than the pattern, so the pattern's own detail is never resampled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NccTemplateMatcher;

/// Top-left-anchored search window: `x` from `left_trim * w` to `w`,
/// `y` from `0` to `bottom_keep * h`.
fn search_region(base: &GrayImage, config: &LogoConfig) -> (u32, u32, u32, u32) {
    let (w, h) = base.dimensions();
    let (left_trim, bottom_keep) = config.crop_fractions;
    let x0 = ((w as f32 * left_trim).floor() as u32).min(w);
    let height = ((h as f32 * bottom_keep).ceil() as u32).min(h);
    (x0, 0, w - x0, height)
}

/// Summed-area table with a zero row and column prepended.
struct Integral {
    width: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sum_sq = vec![0.0; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = f64::from(image.get_pixel(x as u32, y as u32).0[0]);
                row += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sum_sq[(y + 1) * stride + x + 1] = sum_sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { width: stride, sum, sum_sq }
    }

    fn window(table: &[f64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> f64 {
        table[(y + h) * stride + x + w] - table[y * stride + x + w] - table[(y + h) * stride + x]
            + table[y * stride + x]
    }

    fn window_sums(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        (
            Self::window(&self.sum, self.width, x, y, w, h),
            Self::window(&self.sum_sq, self.width, x, y, w, h),
        )
    }
}

/// Patterns whose short side allows this many pixels after downsampling are
/// first searched at reduced resolution.
const COARSE_MIN_SIDE: u32 = 8;

/// Zero-mean pattern prepared for scoring against windows of one region.
struct NccPattern {
    width: usize,
    height: usize,
    centered: Vec<f64>,
    energy: f64,
}

impl NccPattern {
    fn new(pattern: &GrayImage) -> Self {
        let values: Vec<f64> = pattern.pixels().map(|p| f64::from(p.0[0])).collect();
        let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
        let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();
        let energy = centered.iter().map(|v| v * v).sum();
        Self {
            width: pattern.width() as usize,
            height: pattern.height() as usize,
            centered,
            energy,
        }
    }

    fn score(&self, integral: &Integral, raw: &[u8], region_width: usize, x: usize, y: usize) -> f32 {
        let n = (self.width * self.height) as f64;
        let (s, s2) = integral.window_sums(x, y, self.width, self.height);
        let denom = (self.energy * (s2 - s * s / n)).sqrt();
        if denom <= f64::EPSILON {
            return 0.0;
        }
        let mut num = 0.0;
        for py in 0..self.height {
            let row = (y + py) * region_width + x;
            for px in 0..self.width {
                num += f64::from(raw[row + px]) * self.centered[py * self.width + px];
            }
        }
        (num / denom) as f32
    }

    /// Best placement with its top-left inside `xs` x `ys`.
    fn best_in(
        &self,
        region: &GrayImage,
        xs: std::ops::RangeInclusive<usize>,
        ys: std::ops::RangeInclusive<usize>,
    ) -> Option<(u32, u32, f32)> {
        let integral = Integral::new(region);
        let raw = region.as_raw();
        let region_width = region.width() as usize;

        let mut best: Option<(u32, u32, f32)> = None;
        for y in ys {
            for x in xs.clone() {
                let score = self.score(&integral, raw, region_width, x, y);
                if best.map_or(true, |(_, _, q)| score > q) {
                    best = Some((x as u32, y as u32, score));
                }
            }
        }
        best
    }
}

/// Largest power-of-two downsampling that keeps the pattern's short side at
/// `COARSE_MIN_SIDE` pixels or more.
fn coarse_factor(pattern: &GrayImage) -> u32 {
    let short = pattern.width().min(pattern.height());
    let mut factor = 1;
    while short / (factor * 2) >= COARSE_MIN_SIDE {
        factor *= 2;
    }
    factor
}

/// Best `(x, y, score)` of `pattern` inside `region`. Large patterns are
/// located on a downsampled pair first, then refined at full resolution in
/// the neighbourhood of the coarse hit.
fn best_ncc(pattern: &GrayImage, region: &GrayImage) -> Option<(u32, u32, f32)> {
    let (pw, ph) = pattern.dimensions();
    let (rw, rh) = region.dimensions();
    if pw == 0 || ph == 0 || pw > rw || ph > rh {
        return None;
    }
    let (max_x, max_y) = ((rw - pw) as usize, (rh - ph) as usize);
    let full = NccPattern::new(pattern);

    let factor = coarse_factor(pattern);
    if factor == 1 {
        return full.best_in(region, 0..=max_x, 0..=max_y);
    }

    let small_pattern = imageops::resize(pattern, pw / factor, ph / factor, FilterType::Triangle);
    let small_region = imageops::resize(region, rw / factor, rh / factor, FilterType::Triangle);
    let (cx, cy) = match best_ncc(&small_pattern, &small_region) {
        Some((cx, cy, _)) => (cx * factor, cy * factor),
        None => return full.best_in(region, 0..=max_x, 0..=max_y),
    };

    let reach = 2 * factor as usize;
    let window = |centre: u32, max: usize| {
        let centre = centre as usize;
        centre.saturating_sub(reach).min(max)..=(centre + reach).min(max)
    };
    full.best_in(region, window(cx, max_x), window(cy, max_y))
}

impl TemplateMatcher for NccTemplateMatcher {
    fn find(&self, pattern: &GrayImage, base: &GrayImage, config: &LogoConfig) -> MatchResult {
        let (rx, ry, rw, rh) = search_region(base, config);
        if rw == 0 || rh == 0 {
            return MatchResult::no_match(base);
        }
        let region = imageops::crop_imm(base, rx, ry, rw, rh).to_image();

        let mut result = MatchResult::no_match(base);
        for scale in config.scales() {
            let sw = (rw as f32 * scale).round() as u32;
            let sh = (rh as f32 * scale).round() as u32;
            if sw < pattern.width() || sh < pattern.height() {
                continue;
            }
            let scaled = if (scale - 1.0).abs() < f32::EPSILON {
                region.clone()
            } else {
                imageops::resize(&region, sw, sh, FilterType::Triangle)
            };

            let Some((x, y, quality)) = best_ncc(pattern, &scaled) else {
                continue;
            };
            let quality = quality.clamp(0.0, 1.0);
            if result.bounding_box.is_some() && quality <= result.match_quality {
                continue;
            }

            // Map back through the rescale and the crop offset.
            let to_base = |v: u32| (v as f32 / scale).round() as u32;
            result.bounding_box = Some(BoundingBox::from_origin(
                rx + to_base(x),
                ry + to_base(y),
                to_base(pattern.width()),
                to_base(pattern.height()),
            ));
            result.match_quality = quality;

            if quality >= config.stop_threshold {
                debug!(scale, quality, "template search stopped early");
                break;
            }
        }
        result
    }
}
