use image::{DynamicImage, GrayImage};
use imageproc::contrast::adaptive_threshold;
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;

/// Primary cleanup pass for meter photos.
///
/// Grayscale → adaptive threshold (handles uneven lighting across the
/// display) inverted so digits come out white on black → morphological
/// closing to fill speckle gaps in the strokes.
pub fn clean_for_recognition(img: &DynamicImage) -> GrayImage {
    let gray = img.to_luma8();

    // 11px neighbourhood, same tuning as a 2*5+1 block.
    let mut binary = adaptive_threshold(&gray, 5);
    for p in binary.pixels_mut() {
        p[0] = 255 - p[0];
    }

    close(&binary, Norm::LInf, 1)
}

/// Fallback pass: plain global threshold. Used only when the adaptive pass
/// produced no recognizable digits.
pub fn fixed_threshold(img: &DynamicImage) -> GrayImage {
    let mut gray = img.to_luma8();
    for p in gray.pixels_mut() {
        p[0] = if p[0] > 120 { 255 } else { 0 };
    }
    gray
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient_image() -> DynamicImage {
        let img = GrayImage::from_fn(32, 32, |x, _| Luma([(x * 8) as u8]));
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn clean_output_is_binary() {
        let out = clean_for_recognition(&gradient_image());
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(out.dimensions(), (32, 32));
    }

    #[test]
    fn fixed_threshold_splits_at_120() {
        let out = fixed_threshold(&gradient_image());
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(31, 0)[0], 255);
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }
}
