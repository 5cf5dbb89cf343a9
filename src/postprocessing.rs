// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing for YOLO model outputs.
//!
//! Turns raw prediction tensors into [`Results`]: confidence filtering,
//! per-class NMS, mapping boxes back through the letterbox, and for
//! segmentation models, assembling instance masks from the prototype output.

use std::collections::HashMap;

use ndarray::{s, Array2, Array3, ArrayView2};

use crate::error::{InferenceError, Result};
use crate::inference::InferenceConfig;
use crate::preprocessing::{clip_coords, scale_coords, PreprocessResult};
use crate::results::{Boxes, Masks, Results, Speed};
use crate::task::Task;
use crate::utils::{nms_per_class, Candidate};

/// Masks are binarized against this probability when rendered.
pub const MASK_THRESHOLD: f32 = 0.5;

/// Raw model output: flat data and its shape.
pub type RawOutput = (Vec<f32>, Vec<usize>);

/// Post-process raw model outputs for the given task.
///
/// Detections come back in descending confidence order, at most
/// `config.max_detections` of them.
///
/// # Errors
///
/// Returns [`InferenceError::InferenceError`] if the outputs do not have the
/// layout the task expects.
pub fn postprocess(
    outputs: &[RawOutput],
    task: Task,
    preprocess: &PreprocessResult,
    config: &InferenceConfig,
    names: &HashMap<usize, String>,
    speed: Speed,
) -> Result<Results> {
    let mut results = Results::new(
        preprocess.orig_shape,
        preprocess.inference_shape(),
        names.clone(),
        speed,
    );

    let Some((output, shape)) = outputs.first() else {
        return Err(InferenceError::InferenceError(
            "model produced no outputs".to_string(),
        ));
    };

    match task {
        Task::Detect => {
            let layout = parse_prediction_shape(shape, output.len(), names.len(), 0)?;
            let predictions = prediction_matrix(output, &layout)?;
            let (candidates, _) = collect_candidates(predictions.view(), &layout, preprocess, config);
            let keep = select(&candidates, config);

            if !keep.is_empty() {
                let data = boxes_array(&candidates, &keep);
                results.boxes = Some(Boxes::new(data, preprocess.orig_shape));
            }
        }
        Task::Segment => {
            let (protos_data, protos_shape) = outputs.get(1).ok_or_else(|| {
                InferenceError::InferenceError(format!(
                    "segmentation model must produce 2 outputs, got {}",
                    outputs.len()
                ))
            })?;
            let protos = Prototypes::new(protos_data, protos_shape)?;

            let layout = parse_prediction_shape(shape, output.len(), names.len(), protos.num_masks)?;
            let predictions = prediction_matrix(output, &layout)?;
            let (candidates, rows) = collect_candidates(predictions.view(), &layout, preprocess, config);
            let keep = select(&candidates, config);

            if !keep.is_empty() {
                let data = boxes_array(&candidates, &keep);

                let coeff_start = 4 + layout.num_classes;
                let mut coeffs = Array2::zeros((keep.len(), protos.num_masks));
                for (out_idx, &k) in keep.iter().enumerate() {
                    coeffs.row_mut(out_idx).assign(
                        &predictions.slice(s![rows[k], coeff_start..coeff_start + protos.num_masks]),
                    );
                }

                let masks = process_masks(&protos, &coeffs, &data, preprocess);
                results.boxes = Some(Boxes::new(data, preprocess.orig_shape));
                results.masks = Some(Masks::new(masks, preprocess.orig_shape));
            }
        }
    }

    Ok(results)
}

/// How a prediction tensor is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PredictionLayout {
    num_classes: usize,
    num_extra: usize,
    num_predictions: usize,
    /// `true` for `[preds, features]`, `false` for `[features, preds]`.
    transposed: bool,
}

impl PredictionLayout {
    const fn num_features(&self) -> usize {
        4 + self.num_classes + self.num_extra
    }
}

/// Work out the prediction layout from an output shape.
///
/// YOLO heads emit `[1, 4 + nc + extra, preds]` (or the transposed form),
/// where `extra` is the number of mask coefficients for segmentation. When
/// the model carries no names table the class count is inferred from the
/// smaller dimension.
fn parse_prediction_shape(
    shape: &[usize],
    data_len: usize,
    expected_classes: usize,
    num_extra: usize,
) -> Result<PredictionLayout> {
    let (a, b) = match shape {
        [1, a, b] | [a, b] => (*a, *b),
        _ => {
            return Err(InferenceError::InferenceError(format!(
                "unexpected prediction output shape {shape:?}"
            )))
        }
    };

    if a * b != data_len {
        return Err(InferenceError::InferenceError(format!(
            "prediction output has {data_len} values but shape {shape:?}"
        )));
    }

    let layout = |num_classes, num_predictions, transposed| PredictionLayout {
        num_classes,
        num_extra,
        num_predictions,
        transposed,
    };

    if a == 0 || b == 0 {
        return Ok(layout(expected_classes, 0, false));
    }

    if expected_classes > 0 {
        let features = 4 + expected_classes + num_extra;
        return if a == features {
            Ok(layout(expected_classes, b, false))
        } else if b == features {
            Ok(layout(expected_classes, a, true))
        } else {
            Err(InferenceError::InferenceError(format!(
                "prediction output shape {shape:?} does not match {expected_classes} classes"
            )))
        };
    }

    let (features, num_predictions, transposed) = if a < b { (a, b, false) } else { (b, a, true) };
    if features <= 4 + num_extra {
        return Err(InferenceError::InferenceError(format!(
            "cannot infer class count from prediction output shape {shape:?}"
        )));
    }
    Ok(layout(features - 4 - num_extra, num_predictions, transposed))
}

/// Reshape a flat prediction output into `[preds, features]`.
fn prediction_matrix(output: &[f32], layout: &PredictionLayout) -> Result<Array2<f32>> {
    let (n, f) = (layout.num_predictions, layout.num_features());
    if n == 0 {
        return Ok(Array2::zeros((0, f)));
    }

    let matrix = if layout.transposed {
        Array2::from_shape_vec((n, f), output.to_vec())
    } else {
        Array2::from_shape_vec((f, n), output.to_vec()).map(|arr| arr.reversed_axes())
    };
    matrix.map_err(|e| InferenceError::InferenceError(format!("bad prediction output: {e}")))
}

/// Candidates above the confidence threshold, in original image coordinates,
/// together with the prediction row each came from.
fn collect_candidates(
    predictions: ArrayView2<'_, f32>,
    layout: &PredictionLayout,
    preprocess: &PreprocessResult,
    config: &InferenceConfig,
) -> (Vec<Candidate>, Vec<usize>) {
    let mut candidates = Vec::new();
    let mut rows = Vec::new();

    for (i, row) in predictions.outer_iter().enumerate() {
        let scores = row.slice(s![4..4 + layout.num_classes]);

        // NaN scores count as zero
        let (best_class, best_score) = scores
            .iter()
            .map(|&s| if s.is_nan() { 0.0 } else { s })
            .enumerate()
            .fold((0, 0.0_f32), |best, (idx, s)| if s > best.1 { (idx, s) } else { best });

        if best_score < config.confidence_threshold || best_score <= 0.0 {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let xyxy = [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0];

        let scaled = scale_coords(&xyxy, preprocess.scale, preprocess.padding);
        let clipped = clip_coords(&scaled, preprocess.orig_shape);

        candidates.push((clipped, best_score, best_class));
        rows.push(i);
    }

    (candidates, rows)
}

/// NMS, then cap at `max_detections`.
fn select(candidates: &[Candidate], config: &InferenceConfig) -> Vec<usize> {
    let mut keep = nms_per_class(candidates, config.iou_threshold);
    keep.truncate(config.max_detections);
    keep
}

/// Pack kept candidates as `(N, 6)` rows of `[x1, y1, x2, y2, conf, cls]`.
fn boxes_array(candidates: &[Candidate], keep: &[usize]) -> Array2<f32> {
    let mut data = Array2::zeros((keep.len(), 6));
    for (out_idx, &k) in keep.iter().enumerate() {
        let (bbox, score, class) = &candidates[k];
        let mut row = data.row_mut(out_idx);
        row[0] = bbox[0];
        row[1] = bbox[1];
        row[2] = bbox[2];
        row[3] = bbox[3];
        row[4] = *score;
        #[allow(clippy::cast_precision_loss)]
        let class = *class as f32;
        row[5] = class;
    }
    data
}

/// Mask prototypes, `[1, num_masks, mh, mw]` flattened to `(num_masks, mh * mw)`.
struct Prototypes {
    data: Array2<f32>,
    num_masks: usize,
    height: usize,
    width: usize,
}

impl Prototypes {
    fn new(data: &[f32], shape: &[usize]) -> Result<Self> {
        let &[1, num_masks, height, width] = shape else {
            return Err(InferenceError::InferenceError(format!(
                "unexpected mask prototype shape {shape:?}"
            )));
        };
        if num_masks == 0 || height == 0 || width == 0 {
            return Err(InferenceError::InferenceError(format!(
                "empty mask prototype shape {shape:?}"
            )));
        }

        let data = Array2::from_shape_vec((num_masks, height * width), data.to_vec())
            .map_err(|e| InferenceError::InferenceError(format!("bad mask prototypes: {e}")))?;

        Ok(Self {
            data,
            num_masks,
            height,
            width,
        })
    }
}

/// Build `(N, h, w)` mask probabilities over the image area of the prototype grid.
///
/// Each mask is `sigmoid(coeffs · protos)`, cropped to the part of the grid
/// covered by the letterboxed image and zeroed outside its box. Masks stay at
/// prototype resolution; [`Masks::upsample`] scales one to the original image.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn process_masks(
    protos: &Prototypes,
    coeffs: &Array2<f32>,
    boxes: &Array2<f32>,
    preprocess: &PreprocessResult,
) -> Array3<f32> {
    let logits = coeffs.dot(&protos.data);

    let (oh, ow) = preprocess.orig_shape;
    let (th, tw) = preprocess.inference_shape();
    let (pad_top, pad_left) = preprocess.padding;
    let (mh, mw) = (protos.height, protos.width);

    // Same crop for every mask: the prototype area covered by the image
    let x0 = ((f64::from(pad_left) * mw as f64 / f64::from(tw)) as usize).min(mw - 1);
    let y0 = ((f64::from(pad_top) * mh as f64 / f64::from(th)) as usize).min(mh - 1);
    let cw = mw.saturating_sub(2 * x0).max(1);
    let ch = mh.saturating_sub(2 * y0).max(1);

    let sx = cw as f32 / ow as f32;
    let sy = ch as f32 / oh as f32;

    let mut masks = Array3::zeros((boxes.nrows(), ch, cw));
    for (i, (logit, mut mask)) in logits.outer_iter().zip(masks.outer_iter_mut()).enumerate() {
        let b = boxes.row(i);
        let (x1, y1, x2, y2) = (b[0] * sx, b[1] * sy, b[2] * sx, b[3] * sy);

        for ((y, x), value) in mask.indexed_iter_mut() {
            let (fx, fy) = (x as f32, y as f32);
            if fx >= x1 && fx < x2 && fy >= y1 && fy < y2 {
                *value = sigmoid(logit[(y + y0) * mw + x + x0]);
            }
        }
    }

    masks
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
