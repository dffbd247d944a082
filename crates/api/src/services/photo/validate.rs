//! Upload checks run before any file is written.

use std::io::Cursor;

use image::metadata::Orientation;
use image::{
    DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader, ImageResult,
};
use thiserror::Error;

use super::normalize::THUMBNAIL_SIZE;
use crate::config::PhotoConfig;

/// Encodings an upload may arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoFormat {
    Jpeg,
    Png,
}

impl PhotoFormat {
    /// Parse a configuration name (`jpeg`, `jpg`, `png`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    const fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            _ => None,
        }
    }

    /// Decoder format for this encoding.
    #[must_use]
    pub const fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }

    /// File extensions shown to clients.
    #[must_use]
    pub const fn extensions(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg, jpg",
            Self::Png => "png",
        }
    }
}

/// Why an upload was refused. The `Display` text is sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhotoRejection {
    #[error("The photo must be an image.")]
    NotAnImage,

    #[error("The photo must be a file of type: {allowed}.")]
    UnsupportedFormat { allowed: String },

    #[error("The photo may not be greater than {max_kib} kilobytes.")]
    TooLarge { max_kib: usize },

    #[error("The photo has invalid image dimensions.")]
    TooSmall { width: u32, height: u32 },
}

/// A decoded upload that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedPhoto {
    /// Decoded pixels.
    pub image: DynamicImage,
    /// Encoding the upload arrived in.
    pub format: PhotoFormat,
    /// Size of the upload in bytes.
    pub byte_len: usize,
}

/// Check size, encoding and dimensions of an upload, decoding it once.
///
/// The EXIF orientation of the upload is applied before the dimensions are
/// checked, so a rotated phone photo is judged and cropped upright.
///
/// # Errors
///
/// Returns the first [`PhotoRejection`] the upload triggers.
pub fn validate_upload(bytes: &[u8], rules: &PhotoConfig) -> Result<ValidatedPhoto, PhotoRejection> {
    if bytes.len() > rules.max_bytes {
        return Err(PhotoRejection::TooLarge {
            max_kib: rules.max_bytes / 1024,
        });
    }

    let detected = image::guess_format(bytes).map_err(|_| PhotoRejection::NotAnImage)?;
    let format = PhotoFormat::from_image_format(detected)
        .filter(|format| rules.allowed_formats.contains(format))
        .ok_or_else(|| PhotoRejection::UnsupportedFormat {
            allowed: allowed_list(&rules.allowed_formats),
        })?;

    let image = decode_upright(bytes, format.image_format())
        .map_err(|_| PhotoRejection::NotAnImage)?;

    let (width, height) = image.dimensions();
    if width < THUMBNAIL_SIZE || height < THUMBNAIL_SIZE {
        return Err(PhotoRejection::TooSmall { width, height });
    }

    Ok(ValidatedPhoto {
        image,
        format,
        byte_len: bytes.len(),
    })
}

/// Decode `bytes` and rotate or flip the pixels as their EXIF tag asks.
fn decode_upright(bytes: &[u8], format: ImageFormat) -> ImageResult<DynamicImage> {
    let mut decoder = ImageReader::with_format(Cursor::new(bytes), format).into_decoder()?;
    // A malformed EXIF block leaves the pixels as stored
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

fn allowed_list(formats: &[PhotoFormat]) -> String {
    formats
        .iter()
        .map(|f| f.extensions())
        .collect::<Vec<_>>()
        .join(", ")
}
