use image::GrayImage;
use tracing::debug;

use super::template::{MatchResult, TemplateMatcher};
use crate::pipeline::text::medpix;
use crate::pipeline_config::LogoConfig;
use crate::records::BoundingBox;

/// Finds the archive logo in images from the one source known to embed it.
pub struct LogoDetector {
    matcher: Box<dyn TemplateMatcher>,
    template: GrayImage,
}

impl LogoDetector {
    pub fn new(matcher: Box<dyn TemplateMatcher>, template: GrayImage) -> Self {
        Self { matcher, template }
    }

    /// Bounding box of the logo, or `None` when the record is from another
    /// source (the matcher is not run) or the match is rejected.
    pub fn detect(
        &self,
        journal_title: Option<&str>,
        image: &GrayImage,
        config: &LogoConfig,
    ) -> Option<BoundingBox> {
        if !medpix::is_tagged_archive(journal_title) {
            return None;
        }
        let result = self.matcher.find(&self.template, image, config);
        accept_match(&result, config)
    }
}

/// Rejects weak matches and boxes outside the expected upper-right region.
pub fn accept_match(result: &MatchResult, config: &LogoConfig) -> Option<BoundingBox> {
    let bbox = result.bounding_box?;
    if result.match_quality < config.match_quality_threshold {
        debug!(quality = result.match_quality, "logo match below quality threshold");
        return None;
    }

    let (width, height) = result.base_image_shape;
    let (x_check, y_check) = config.xy_position_threshold;
    let (x, y) = bbox.bottom_left;
    if (x as f32) < width as f32 * x_check || (y as f32) > height as f32 * y_check {
        debug!(x, y, "logo match outside expected region");
        return None;
    }
    Some(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedMatcher {
        result: MatchResult,
        calls: Arc<AtomicUsize>,
    }

    impl TemplateMatcher for FixedMatcher {
        fn find(&self, _: &GrayImage, _: &GrayImage, _: &LogoConfig) -> MatchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn matched(x: u32, y: u32, quality: f32) -> MatchResult {
        MatchResult {
            bounding_box: Some(BoundingBox::from_origin(x, y, 20, 10)),
            match_quality: quality,
            base_image_shape: (300, 200),
        }
    }

    fn detector(result: MatchResult) -> (LogoDetector, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let matcher = FixedMatcher {
            result,
            calls: Arc::clone(&calls),
        };
        (LogoDetector::new(Box::new(matcher), GrayImage::new(20, 10)), calls)
    }

    #[test]
    fn upper_right_match_accepted() {
        let (detector, _) = detector(matched(200, 5, 0.9));
        let bbox = detector.detect(Some("MedPix"), &GrayImage::new(300, 200), &LogoConfig::default());
        assert_eq!(bbox.map(|b| b.bottom_left), Some((200, 15)));
    }

    #[test]
    fn other_sources_skip_matcher() {
        let (detector, calls) = detector(matched(200, 5, 0.9));
        let bbox = detector.detect(Some("Radiology"), &GrayImage::new(300, 200), &LogoConfig::default());
        assert_eq!(bbox, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn weak_match_rejected() {
        assert_eq!(accept_match(&matched(200, 5, 0.2), &LogoConfig::default()), None);
    }

    #[test]
    fn left_or_low_match_rejected() {
        let config = LogoConfig::default();
        // 300 / 3 = 100 is the leftmost accepted x
        assert_eq!(accept_match(&matched(90, 5, 0.9), &config), None);
        // 200 / 2.5 = 80 is the lowest accepted y
        assert_eq!(accept_match(&matched(200, 75, 0.9), &config), None);
    }

    #[test]
    fn missing_box_rejected() {
        let result = MatchResult {
            bounding_box: None,
            match_quality: 1.0,
            base_image_shape: (300, 200),
        };
        assert_eq!(accept_match(&result, &LogoConfig::default()), None);
    }
}
