//! Cover resize to the fixed thumbnail size.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageResult};

/// Width and height of every stored thumbnail.
pub const THUMBNAIL_SIZE: u32 = 70;

/// JPEG quality used when re-encoding.
pub const JPEG_QUALITY: u8 = 90;

/// Scale `image` to cover a `THUMBNAIL_SIZE` square, crop the overflow
/// around the center and encode the result as JPEG.
///
/// # Errors
///
/// Returns an `ImageError` if encoding fails.
pub fn cover_thumbnail(image: &DynamicImage) -> ImageResult<Vec<u8>> {
    let resized = image.resize_to_fill(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
    Ok(buf)
}

/// Whether `bytes` decode as a `THUMBNAIL_SIZE` square JPEG.
#[must_use]
pub fn is_thumbnail(bytes: &[u8]) -> bool {
    if !matches!(image::guess_format(bytes), Ok(ImageFormat::Jpeg)) {
        return false;
    }
    image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .is_ok_and(|img| img.dimensions() == (THUMBNAIL_SIZE, THUMBNAIL_SIZE))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;
    use crate::test_support::jpeg_bytes;

    fn decode(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory_with_format(bytes, ImageFormat::Jpeg).unwrap()
    }

    #[test]
    fn test_any_aspect_ratio_becomes_square_jpeg() {
        for (w, h) in [(200, 200), (640, 70), (70, 900), (1234, 567)] {
            let source = image::load_from_memory(&jpeg_bytes(w, h)).unwrap();
            let thumbnail = cover_thumbnail(&source).unwrap();

            assert!(is_thumbnail(&thumbnail), "{w}x{h} did not become 70x70");
            assert_eq!(decode(&thumbnail).dimensions(), (70, 70));
        }
    }

    #[test]
    fn test_crop_keeps_the_center() {
        // Wide image: red left third, green middle, blue right third
        let source = RgbImage::from_fn(300, 100, |x, _| match x {
            0..100 => Rgb([255, 0, 0]),
            100..200 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let thumbnail = cover_thumbnail(&DynamicImage::ImageRgb8(source)).unwrap();
        let center = decode(&thumbnail).to_rgb8();

        let Rgb([r, g, b]) = *center.get_pixel(35, 35);
        assert!(g > 200 && r < 60 && b < 60, "center pixel was {r},{g},{b}");
    }

    #[test]
    fn test_alpha_is_flattened() {
        let source = RgbaImage::from_pixel(100, 100, Rgba([10, 20, 30, 128]));
        let thumbnail = cover_thumbnail(&DynamicImage::ImageRgba8(source)).unwrap();
        assert!(is_thumbnail(&thumbnail));
    }

    #[test]
    fn test_is_thumbnail_rejects_other_sizes_and_formats() {
        assert!(!is_thumbnail(&jpeg_bytes(71, 70)));
        assert!(!is_thumbnail(b"not an image"));
        assert!(!is_thumbnail(&crate::test_support::png_bytes(70, 70)));
    }
}
