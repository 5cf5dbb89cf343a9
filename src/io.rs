// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image decoding and JPEG encoding.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, RgbImage};

use crate::error::{InferenceError, Result};

/// Default JPEG quality for annotated images.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Decode uploaded bytes into an image, guessing the format from content.
///
/// # Errors
///
/// Returns [`InferenceError::DecodeError`] for empty, unrecognised or
/// corrupt input.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(InferenceError::DecodeError("empty upload".to_string()));
    }

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| InferenceError::DecodeError(e.to_string()))?
        .decode()
        .map_err(|e| InferenceError::DecodeError(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(InferenceError::DecodeError(
            "image has zero width or height".to_string(),
        ));
    }

    Ok(image)
}

/// Read and decode an image file.
///
/// # Errors
///
/// Returns [`InferenceError::Io`] if the file cannot be read and
/// [`InferenceError::DecodeError`] if it is not an image.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

/// Encode an RGB image as JPEG.
///
/// `quality` is clamped to 1..=100.
///
/// # Errors
///
/// Returns [`InferenceError::EncodingError`] if encoding fails.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    image
        .write_with_encoder(encoder)
        .map_err(|e| InferenceError::EncodingError(e.to_string()))?;
    Ok(buffer)
}

/// Encode as JPEG and write to `path`.
///
/// # Errors
///
/// Returns [`InferenceError::EncodingError`] or [`InferenceError::Io`].
pub fn save_jpeg<P: AsRef<Path>>(image: &RgbImage, quality: u8, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, encode_jpeg(image, quality)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_jpeg_round_trip_keeps_dimensions() {
        let img = RgbImage::from_pixel(64, 48, Rgb([120, 80, 40]));
        let bytes = encode_jpeg(&img, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = decode_image(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_image(b""), Err(InferenceError::DecodeError(_))));
        assert!(matches!(
            decode_image(b"this is a text file, not an image"),
            Err(InferenceError::DecodeError(_))
        ));
    }

    #[test]
    fn test_save_jpeg_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("predict.jpg");
        save_jpeg(&RgbImage::new(8, 8), 80, &path).unwrap();
        assert!(path.exists());
        assert_eq!(load_image(&path).unwrap().width(), 8);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            load_image("does/not/exist.jpg"),
            Err(InferenceError::Io(_))
        ));
    }
}
