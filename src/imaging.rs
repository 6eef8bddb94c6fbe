//! Image normalization: bounded-size JPEG working copies and square thumbnails.

use std::fmt;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use tracing::debug;

/// Media type of everything this module produces.
pub const JPEG_MEDIA_TYPE: &str = "image/jpeg";

/// Errors from decoding or encoding images.
#[derive(Debug)]
pub enum ImageError {
    /// The bytes could not be read as an image.
    Decode(String),
    /// Re-encoding failed.
    Encode(String),
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "Could not read image: {err}"),
            Self::Encode(err) => write!(f, "Could not encode image: {err}"),
        }
    }
}

impl std::error::Error for ImageError {}

/// A re-encoded working copy ready to send to the model.
#[derive(Clone, Debug)]
pub struct NormalizedImage {
    /// JPEG bytes.
    pub bytes: Vec<u8>,
    /// Final width in pixels.
    pub width: u32,
    /// Final height in pixels.
    pub height: u32,
    /// Always `image/jpeg`.
    pub media_type: &'static str,
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| {
            debug!("Failed to guess image format: {}", err);
            ImageError::Decode(err.to_string())
        })?;
    if reader.format().is_none() {
        return Err(ImageError::Decode("unrecognised image format".to_string()));
    }
    reader.decode().map_err(|err| {
        debug!("Failed to decode image: {}", err);
        ImageError::Decode(err.to_string())
    })
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    // jpeg has no alpha channel
    let rgb = image.to_rgb8();
    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, quality)
        .encode_image(&rgb)
        .map_err(|err| ImageError::Encode(err.to_string()))?;
    Ok(output)
}

/// Decodes `bytes`, shrinks it to fit inside `max_dimension` square (never
/// enlarging) and re-encodes it as JPEG at `quality`.
pub fn normalize(
    bytes: &[u8],
    max_dimension: u32,
    quality: u8,
) -> Result<NormalizedImage, ImageError> {
    let image = decode(bytes)?;
    let image = if image.width() > max_dimension || image.height() > max_dimension {
        image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        image
    };
    debug!(
        "Normalized image to {}x{} at quality {}",
        image.width(),
        image.height(),
        quality
    );

    Ok(NormalizedImage {
        bytes: encode_jpeg(&image, quality)?,
        width: image.width(),
        height: image.height(),
        media_type: JPEG_MEDIA_TYPE,
    })
}

/// Centre-cropped `size`×`size` JPEG preview of `bytes`.
pub fn thumbnail(bytes: &[u8], size: u32, quality: u8) -> Result<Vec<u8>, ImageError> {
    let image = decode(bytes)?;
    let thumb = image.resize_to_fill(size, size, FilterType::Triangle);
    encode_jpeg(&thumb, quality)
}
