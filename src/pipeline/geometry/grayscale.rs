use image::DynamicImage;

/// Decides whether an image carries any colour information.
pub trait GrayscaleDetector: Send + Sync {
    /// `None` when the image has no pixels to judge.
    fn is_grayscale(&self, image: &DynamicImage) -> Option<bool>;
}

/// Compares per-channel sums of the RGB rendering.
///
/// Conservative: any colour content, however faint, reads as colour. A
/// colour image whose three channel sums happen to be exactly equal is a
/// known false positive.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelSumGrayscale;

impl GrayscaleDetector for ChannelSumGrayscale {
    fn is_grayscale(&self, image: &DynamicImage) -> Option<bool> {
        let rgb = image.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return None;
        }

        let mut sums = [0u64; 3];
        for pixel in rgb.pixels() {
            for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                *sum += u64::from(channel);
            }
        }
        // Mean channel sum equals the first channel's sum.
        Some(sums.iter().sum::<u64>() == 3 * sums[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn luma_image_is_grayscale() {
        let img = GrayImage::from_fn(8, 8, |x, y| Luma([(x * 16 + y) as u8]));
        let detected = ChannelSumGrayscale.is_grayscale(&DynamicImage::ImageLuma8(img));
        assert_eq!(detected, Some(true));
    }

    #[test]
    fn neutral_rgb_is_grayscale() {
        let img = RgbImage::from_fn(4, 4, |x, _| {
            let v = (x * 50) as u8;
            Rgb([v, v, v])
        });
        assert_eq!(
            ChannelSumGrayscale.is_grayscale(&DynamicImage::ImageRgb8(img)),
            Some(true)
        );
    }

    #[test]
    fn faint_tint_is_colour() {
        let mut img = RgbImage::from_pixel(10, 10, Rgb([120, 120, 120]));
        img.put_pixel(3, 3, Rgb([120, 121, 120]));
        assert_eq!(
            ChannelSumGrayscale.is_grayscale(&DynamicImage::ImageRgb8(img)),
            Some(false)
        );
    }

    #[test]
    fn balanced_colour_is_known_false_positive() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([200, 0, 100]));
        img.put_pixel(1, 0, Rgb([0, 200, 100]));
        // R, G and B each sum to 200
        assert_eq!(
            ChannelSumGrayscale.is_grayscale(&DynamicImage::ImageRgb8(img)),
            Some(true)
        );
    }

    #[test]
    fn empty_image_undecided() {
        let img = RgbImage::new(0, 0);
        assert_eq!(ChannelSumGrayscale.is_grayscale(&DynamicImage::ImageRgb8(img)), None);
    }
}
