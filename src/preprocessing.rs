// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image preprocessing for YOLO inference.
//!
//! Images are letterboxed: scaled to fit the square input while keeping their
//! aspect ratio, centred, and padded with the Ultralytics gray (114). The
//! result is an NCHW `f32` tensor normalized to [0, 1] together with the scale
//! and padding needed to map predictions back onto the original image.

use std::borrow::Cow;

use fast_image_resize::images::{Image, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

use crate::error::{InferenceError, Result};

/// Normalized letterbox padding value (114 / 255).
const LETTERBOX_NORM: f32 = 114.0 / 255.0;

/// Reciprocal of 255 for normalization.
const INV_255: f32 = 1.0 / 255.0;

/// Result of preprocessing an image.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Image tensor in NCHW format, normalized to [0, 1].
    pub tensor: Array4<f32>,
    /// Original image dimensions (height, width).
    pub orig_shape: (u32, u32),
    /// Scale factors applied (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
    /// Padding applied (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
}

impl PreprocessResult {
    /// Spatial size of the tensor (height, width).
    #[must_use]
    pub fn inference_shape(&self) -> (u32, u32) {
        let shape = self.tensor.shape();
        #[allow(clippy::cast_possible_truncation)]
        let dims = (shape[2] as u32, shape[3] as u32);
        dims
    }
}

/// Letterbox geometry for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    new_width: u32,
    new_height: u32,
    pad_left: u32,
    pad_top: u32,
    scale: (f32, f32),
}

/// Preprocess an image for inference.
///
/// # Arguments
///
/// * `image` - Decoded input image (any color type, converted to RGB).
/// * `target_size` - Tensor size as (height, width).
///
/// # Errors
///
/// Returns [`InferenceError::InferenceError`] if the image is empty or the
/// resize fails.
pub fn preprocess_image(image: &DynamicImage, target_size: (usize, usize)) -> Result<PreprocessResult> {
    // Borrow RGB8 input directly; everything else is converted once.
    let rgb: Cow<'_, RgbImage> = match image {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        other => Cow::Owned(other.to_rgb8()),
    };
    let (orig_width, orig_height) = rgb.dimensions();
    if orig_width == 0 || orig_height == 0 {
        return Err(InferenceError::InferenceError(
            "cannot run inference on an empty image".to_string(),
        ));
    }

    let letterbox = letterbox_params(orig_width, orig_height, target_size);
    let resized = resize_rgb(&rgb, letterbox.new_width, letterbox.new_height)?;
    let tensor = pack_tensor(&resized, &letterbox, target_size);

    #[allow(clippy::cast_precision_loss)]
    let padding = (letterbox.pad_top as f32, letterbox.pad_left as f32);

    Ok(PreprocessResult {
        tensor,
        orig_shape: (orig_height, orig_width),
        scale: letterbox.scale,
        padding,
    })
}

/// Compute the scaled size and centred padding for a letterbox.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn letterbox_params(orig_width: u32, orig_height: u32, target_size: (usize, usize)) -> Letterbox {
    let (target_h, target_w) = (target_size.0 as f32, target_size.1 as f32);
    let (orig_h, orig_w) = (orig_height as f32, orig_width as f32);

    let ratio = (target_h / orig_h).min(target_w / orig_w);

    let new_width = ((orig_w * ratio).round() as u32).clamp(1, target_size.1 as u32);
    let new_height = ((orig_h * ratio).round() as u32).clamp(1, target_size.0 as u32);

    let pad_left = (target_size.1 as u32 - new_width) / 2;
    let pad_top = (target_size.0 as u32 - new_height) / 2;

    Letterbox {
        new_width,
        new_height,
        pad_left,
        pad_top,
        scale: (new_height as f32 / orig_h, new_width as f32 / orig_w),
    }
}

/// Bilinear resize of an RGB image; returns the packed RGB bytes.
fn resize_rgb(rgb: &RgbImage, width: u32, height: u32) -> Result<Vec<u8>> {
    if rgb.dimensions() == (width, height) {
        return Ok(rgb.as_raw().clone());
    }

    let src = ImageRef::new(rgb.width(), rgb.height(), rgb.as_raw(), PixelType::U8x3)
        .map_err(|e| InferenceError::InferenceError(format!("Invalid source image: {e}")))?;
    let mut dst = Image::new(width, height, PixelType::U8x3);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    Resizer::new()
        .resize(&src, &mut dst, &options)
        .map_err(|e| InferenceError::InferenceError(format!("Resize failed: {e}")))?;

    Ok(dst.buffer().to_vec())
}

/// Place resized RGB bytes into a padded, normalized NCHW tensor.
fn pack_tensor(resized: &[u8], letterbox: &Letterbox, target_size: (usize, usize)) -> Array4<f32> {
    let (dst_h, dst_w) = target_size;
    let mut tensor = Array4::from_elem((1, 3, dst_h, dst_w), LETTERBOX_NORM);

    let width = letterbox.new_width as usize;
    let pad_top = letterbox.pad_top as usize;
    let pad_left = letterbox.pad_left as usize;

    for (i, px) in resized.chunks_exact(3).enumerate() {
        let y = pad_top + i / width;
        let x = pad_left + i % width;
        for (c, &value) in px.iter().enumerate() {
            tensor[[0, c, y, x]] = f32::from(value) * INV_255;
        }
    }

    tensor
}

/// Scale box coordinates from model input space back to the original image.
///
/// # Arguments
///
/// * `coords` - Box [x1, y1, x2, y2] in letterboxed space.
/// * `scale` - Scale factors (`scale_y`, `scale_x`) from preprocessing.
/// * `padding` - Padding (`pad_top`, `pad_left`) from preprocessing.
#[must_use]
pub fn scale_coords(coords: &[f32; 4], scale: (f32, f32), padding: (f32, f32)) -> [f32; 4] {
    let (scale_y, scale_x) = scale;
    let (pad_top, pad_left) = padding;

    [
        (coords[0] - pad_left) / scale_x,
        (coords[1] - pad_top) / scale_y,
        (coords[2] - pad_left) / scale_x,
        (coords[3] - pad_top) / scale_y,
    ]
}

/// Clip box coordinates to an image of shape (height, width).
#[must_use]
pub fn clip_coords(coords: &[f32; 4], shape: (u32, u32)) -> [f32; 4] {
    #[allow(clippy::cast_precision_loss)]
    let (h, w) = (shape.0 as f32, shape.1 as f32);
    [
        coords[0].clamp(0.0, w),
        coords[1].clamp(0.0, h),
        coords[2].clamp(0.0, w),
        coords[3].clamp(0.0, h),
    ]
}
