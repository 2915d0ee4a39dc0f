//! Image preparation shared by OCR and vision.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::borrow::Cow;
use std::io::Cursor;

/// Longest side, in pixels, of any image handed to OCR or the vision model.
pub const MAX_ANALYSIS_SIDE: u32 = 800;

/// Target size that fits `(width, height)` inside `max_side`, keeping the aspect ratio.
pub fn fit_within(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    if width <= max_side && height <= max_side {
        return (width, height);
    }
    if width >= height {
        let h = (u64::from(height) * u64::from(max_side) / u64::from(width)) as u32;
        (max_side, h.max(1))
    } else {
        let w = (u64::from(width) * u64::from(max_side) / u64::from(height)) as u32;
        (w.max(1), max_side)
    }
}

/// Downscale so the longest side is at most [`MAX_ANALYSIS_SIDE`].
pub fn downscale_for_analysis(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    let (width, height) = image.dimensions();
    let (w, h) = fit_within(width, height, MAX_ANALYSIS_SIDE);
    if (w, h) == (width, height) {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image.resize_exact(w, h, FilterType::Lanczos3))
    }
}

/// Encode as PNG in memory.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(1600, 900, 800), (800, 450));
        assert_eq!(fit_within(900, 2700, 800), (266, 800));
        assert_eq!(fit_within(640, 480, 800), (640, 480));
        assert_eq!(fit_within(800, 800, 800), (800, 800));
        assert_eq!(fit_within(10_000, 1, 800), (800, 1));
    }

    #[test]
    fn test_small_image_is_borrowed() {
        let img = DynamicImage::new_rgb8(320, 200);
        assert!(matches!(downscale_for_analysis(&img), Cow::Borrowed(_)));
    }

    #[test]
    fn test_large_image_is_downscaled() {
        let img = DynamicImage::new_rgb8(2000, 1000);
        let small = downscale_for_analysis(&img);
        assert_eq!(small.dimensions(), (800, 400));
    }

    #[test]
    fn test_encode_png_signature() {
        let png = encode_png(&DynamicImage::new_rgb8(4, 4)).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
