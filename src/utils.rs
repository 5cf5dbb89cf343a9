// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Box geometry helpers and non-maximum suppression.

/// A candidate box: `[x1, y1, x2, y2]`, score, class index.
pub type Candidate = ([f32; 4], f32, usize);

/// Calculate `IoU` (Intersection over Union) between two `[x1, y1, x2, y2]` boxes.
///
/// Returns 0.0 for degenerate boxes with no area.
#[must_use]
pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);

    let area1 = (box1[2] - box1[0]).max(0.0) * (box1[3] - box1[1]).max(0.0);
    let area2 = (box2[2] - box2[0]).max(0.0) * (box2[3] - box2[1]).max(0.0);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Per-class Non-Maximum Suppression.
///
/// Boxes are only suppressed by higher-scoring boxes of the same class.
/// Returns the indices of the kept boxes in descending score order.
#[must_use]
pub fn nms_per_class(boxes: &[Candidate], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| boxes[b].1.total_cmp(&boxes[a].1));

    let mut keep: Vec<usize> = Vec::new();
    for &i in &order {
        let (bbox, _, class) = &boxes[i];
        let suppressed = keep.iter().any(|&k| {
            let (kept_box, _, kept_class) = &boxes[k];
            kept_class == class && calculate_iou(kept_box, bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(i);
        }
    }

    keep
}
