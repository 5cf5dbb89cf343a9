// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Raw inference output containers.
//!
//! [`Results`] is what the model produces for one image: boxes in original
//! pixel coordinates, optional instance masks, the class-name table and
//! timing. The public JSON shape is built from it in [`crate::detection`].

use std::collections::BTreeMap;
use std::collections::HashMap;

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::error::{InferenceError, Result};

/// Timing information for one inference (milliseconds).
#[derive(Debug, Clone, Default)]
pub struct Speed {
    /// Time spent on preprocessing.
    pub preprocess: Option<f64>,
    /// Time spent on model inference.
    pub inference: Option<f64>,
    /// Time spent on postprocessing.
    pub postprocess: Option<f64>,
}

impl Speed {
    /// Create a new Speed instance with all timings.
    #[must_use]
    pub const fn new(preprocess: f64, inference: f64, postprocess: f64) -> Self {
        Self {
            preprocess: Some(preprocess),
            inference: Some(inference),
            postprocess: Some(postprocess),
        }
    }

    /// Sum of all recorded stages.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.preprocess.unwrap_or(0.0)
            + self.inference.unwrap_or(0.0)
            + self.postprocess.unwrap_or(0.0)
    }
}

/// Output of one inference call on one image.
#[derive(Debug, Clone)]
pub struct Results {
    /// Original image shape (height, width).
    pub orig_shape: (u32, u32),
    /// Inference tensor shape (height, width) after letterboxing.
    pub inference_shape: (u32, u32),
    /// Detected boxes; `None` when nothing passed the thresholds.
    pub boxes: Option<Boxes>,
    /// Instance masks, aligned with `boxes` (segmentation models only).
    pub masks: Option<Masks>,
    /// Class ID to name mapping of the model.
    pub names: HashMap<usize, String>,
    /// Timing information.
    pub speed: Speed,
}

impl Results {
    /// Create an empty result for an image of `orig_shape` (height, width).
    #[must_use]
    pub fn new(
        orig_shape: (u32, u32),
        inference_shape: (u32, u32),
        names: HashMap<usize, String>,
        speed: Speed,
    ) -> Self {
        Self {
            orig_shape,
            inference_shape,
            boxes: None,
            masks: None,
            names,
            speed,
        }
    }

    /// Number of detections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boxes.as_ref().map_or(0, Boxes::len)
    }

    /// Whether nothing was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label for a class index, falling back to the index itself.
    #[must_use]
    pub fn class_name(&self, class_id: usize) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }

    /// Short description for logs, e.g. `"3 sandstone, 1 siltstone"`.
    #[must_use]
    pub fn verbose(&self) -> String {
        let Some(ref boxes) = self.boxes else {
            return "no detections".to_string();
        };
        if boxes.is_empty() {
            return "no detections".to_string();
        }

        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &c in boxes.cls() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let class_id = c as usize;
            *counts.entry(class_id).or_insert(0) += 1;
        }

        counts
            .iter()
            .map(|(class_id, count)| format!("{count} {}", self.class_name(*class_id)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Detection bounding boxes.
///
/// Stored as an `(N, 6)` array of `[x1, y1, x2, y2, conf, cls]` rows in
/// original image pixels, ordered by descending confidence.
#[derive(Debug, Clone)]
pub struct Boxes {
    /// Raw `(N, 6)` data.
    pub data: Array2<f32>,
    /// Original image shape (height, width).
    pub orig_shape: (u32, u32),
}

impl Boxes {
    /// Create a new Boxes instance from `(N, 6)` data.
    #[must_use]
    pub const fn new(data: Array2<f32>, orig_shape: (u32, u32)) -> Self {
        Self { data, orig_shape }
    }

    /// Number of boxes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    /// Whether there are no boxes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Box corners `[x1, y1, x2, y2]`.
    #[must_use]
    pub fn xyxy(&self) -> ArrayView2<'_, f32> {
        self.data.slice(s![.., 0..4])
    }

    /// Confidence scores.
    #[must_use]
    pub fn conf(&self) -> ArrayView1<'_, f32> {
        self.data.column(4)
    }

    /// Class indices (stored as `f32`).
    #[must_use]
    pub fn cls(&self) -> ArrayView1<'_, f32> {
        self.data.column(5)
    }
}

/// Instance segmentation masks.
#[derive(Debug, Clone)]
pub struct Masks {
    /// `(N, h, w)` per-pixel probabilities over the image area of the
    /// prototype grid, zeroed outside each instance's box.
    pub data: Array3<f32>,
    /// Original image shape (height, width).
    pub orig_shape: (u32, u32),
}

impl Masks {
    /// Create a new Masks instance.
    #[must_use]
    pub const fn new(data: Array3<f32>, orig_shape: (u32, u32)) -> Self {
        Self { data, orig_shape }
    }

    /// Number of masks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.shape()[0]
    }

    /// Whether there are no masks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mask `index` resized bilinearly to the original image, as `(H, W)`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InferenceError`] if `index` is out of range
    /// or the resize fails.
    #[allow(clippy::cast_possible_truncation)]
    pub fn upsample(&self, index: usize) -> Result<Array2<f32>> {
        if index >= self.len() {
            return Err(InferenceError::InferenceError(format!(
                "mask index {index} out of range for {} masks",
                self.len()
            )));
        }

        let mask = self.data.index_axis(Axis(0), index);
        let (oh, ow) = self.orig_shape;
        let (out_h, out_w) = (oh as usize, ow as usize);
        if mask.dim() == (out_h, out_w) {
            return Ok(mask.to_owned());
        }

        let (mh, mw) = mask.dim();
        let values: Vec<f32> = mask.iter().copied().collect();
        let src = Image::from_vec_u8(
            mw as u32,
            mh as u32,
            bytemuck::cast_slice(&values).to_vec(),
            PixelType::F32,
        )
        .map_err(|e| InferenceError::InferenceError(format!("mask buffer: {e}")))?;

        let mut dst = Image::new(ow, oh, PixelType::F32);
        let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        Resizer::new()
            .resize(&src, &mut dst, &options)
            .map_err(|e| InferenceError::InferenceError(format!("mask resize failed: {e}")))?;

        let resized: Vec<f32> = dst
            .buffer()
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Array2::from_shape_vec((out_h, out_w), resized)
            .map_err(|e| InferenceError::InferenceError(format!("mask resize failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn rock_names() -> HashMap<usize, String> {
        HashMap::from([(0, "sandstone".to_string()), (1, "siltstone".to_string())])
    }

    #[test]
    fn test_boxes_accessors() {
        let data = array![[10.0, 20.0, 100.0, 200.0, 0.95, 1.0]];
        let boxes = Boxes::new(data, (480, 640));

        assert_eq!(boxes.len(), 1);
        assert!((boxes.conf()[0] - 0.95).abs() < 1e-6);
        assert!((boxes.cls()[0] - 1.0).abs() < 1e-6);
        assert!((boxes.xyxy()[[0, 2]] - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_speed() {
        let speed = Speed::new(10.0, 20.0, 5.0);
        assert!((speed.total() - 35.0).abs() < 1e-6);
        assert!(Speed::default().total().abs() < 1e-9);
    }

    #[test]
    fn test_results_verbose() {
        let mut results = Results::new((480, 640), (640, 640), rock_names(), Speed::default());
        assert!(results.is_empty());
        assert_eq!(results.verbose(), "no detections");

        results.boxes = Some(Boxes::new(
            array![
                [0.0, 0.0, 1.0, 1.0, 0.9, 0.0],
                [0.0, 0.0, 1.0, 1.0, 0.8, 1.0],
                [0.0, 0.0, 1.0, 1.0, 0.7, 0.0],
                [0.0, 0.0, 1.0, 1.0, 0.6, 4.0],
            ],
            (480, 640),
        ));
        assert_eq!(results.len(), 4);
        assert_eq!(results.verbose(), "2 sandstone, 1 siltstone, 1 4");
    }

    #[test]
    fn test_class_name_fallback() {
        let results = Results::new((1, 1), (640, 640), rock_names(), Speed::default());
        assert_eq!(results.class_name(1), "siltstone");
        assert_eq!(results.class_name(7), "7");
    }

    #[test]
    fn test_masks_upsample() {
        let mut data = Array3::zeros((2, 10, 10));
        data.slice_mut(s![1, .., ..]).fill(0.8);
        let masks = Masks::new(data, (30, 40));

        let mask = masks.upsample(1).unwrap();
        assert_eq!(mask.dim(), (30, 40));
        assert!(mask.iter().all(|&v| (v - 0.8).abs() < 1e-4));

        assert!(masks.upsample(0).unwrap().iter().all(|&v| v.abs() < 1e-6));
        assert!(matches!(masks.upsample(2), Err(InferenceError::InferenceError(_))));
    }
}
