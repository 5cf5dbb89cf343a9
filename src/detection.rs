// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Public detection schema returned by `POST /predict`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::results::Results;

/// Label counted as `sandstone_count`.
pub const SANDSTONE: &str = "sandstone";
/// Label counted as `siltstone_count`.
pub const SILTSTONE: &str = "siltstone";

/// One detected instance, in original image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Detection {
    /// Label from the model's class-name table.
    #[schema(example = "sandstone")]
    pub class_name: String,
    /// Class index of the label.
    #[schema(example = 0)]
    pub class_id: usize,
    /// Score in [0, 1].
    #[schema(example = 0.87)]
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Class-count summary over all detections.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Summary {
    pub sandstone_count: usize,
    pub siltstone_count: usize,
    pub total_instances: usize,
    /// `sandstone_count / total_instances * 100`, or 0 with no detections.
    pub sandstone_percentage: f64,
    /// `siltstone_count / total_instances * 100`, or 0 with no detections.
    pub siltstone_percentage: f64,
}

impl Summary {
    /// Count the tracked labels among `detections`.
    #[must_use]
    pub fn from_detections(detections: &[Detection]) -> Self {
        let count = |label: &str| detections.iter().filter(|d| d.class_name == label).count();
        let sandstone_count = count(SANDSTONE);
        let siltstone_count = count(SILTSTONE);
        let total_instances = detections.len();

        Self {
            sandstone_count,
            siltstone_count,
            total_instances,
            sandstone_percentage: percentage(sandstone_count, total_instances),
            siltstone_percentage: percentage(siltstone_count, total_instances),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Response body of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictionResult {
    /// Original image width in pixels.
    #[schema(example = 640)]
    pub width: u32,
    /// Original image height in pixels.
    #[schema(example = 480)]
    pub height: u32,
    /// Detections in model ranking order (descending confidence).
    pub detections: Vec<Detection>,
    pub summary: Summary,
}

impl PredictionResult {
    /// Map model output onto the public schema.
    #[must_use]
    pub fn from_results(results: &Results) -> Self {
        let (height, width) = results.orig_shape;

        let detections: Vec<Detection> = results
            .boxes
            .iter()
            .flat_map(|boxes| {
                let xyxy = boxes.xyxy();
                let conf = boxes.conf();
                let cls = boxes.cls();
                (0..boxes.len())
                    .map(|i| {
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let class_id = cls[i] as usize;
                        Detection {
                            class_name: results.class_name(class_id),
                            class_id,
                            confidence: conf[i],
                            x1: xyxy[[i, 0]],
                            y1: xyxy[[i, 1]],
                            x2: xyxy[[i, 2]],
                            y2: xyxy[[i, 3]],
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let summary = Summary::from_detections(&detections);
        Self {
            width,
            height,
            detections,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ndarray::array;

    use super::*;
    use crate::results::{Boxes, Speed};

    fn detection(class_name: &str, class_id: usize) -> Detection {
        Detection {
            class_name: class_name.to_string(),
            class_id,
            confidence: 0.9,
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
        }
    }

    #[test]
    fn test_summary_empty_is_all_zero() {
        let summary = Summary::from_detections(&[]);
        assert_eq!(summary, Summary::default());
        assert_eq!(summary.sandstone_percentage, 0.0);
        assert_eq!(summary.siltstone_percentage, 0.0);
    }

    #[test]
    fn test_summary_counts_and_percentages() {
        let detections = vec![
            detection("sandstone", 0),
            detection("sandstone", 0),
            detection("siltstone", 1),
            detection("shale", 2),
        ];
        let summary = Summary::from_detections(&detections);

        assert_eq!(summary.sandstone_count, 2);
        assert_eq!(summary.siltstone_count, 1);
        assert_eq!(summary.total_instances, 4);
        assert!((summary.sandstone_percentage - 50.0).abs() < 1e-9);
        assert!((summary.siltstone_percentage - 25.0).abs() < 1e-9);
        assert!(summary.sandstone_percentage + summary.siltstone_percentage < 100.0);
    }

    #[test]
    fn test_summary_only_tracked_classes_sum_to_100() {
        let detections = vec![detection("sandstone", 0), detection("siltstone", 1), detection("siltstone", 1)];
        let summary = Summary::from_detections(&detections);
        assert!((summary.sandstone_percentage + summary.siltstone_percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_results_empty() {
        let names = HashMap::from([(0, SANDSTONE.to_string()), (1, SILTSTONE.to_string())]);
        let results = Results::new((480, 640), (640, 640), names, Speed::default());
        let prediction = PredictionResult::from_results(&results);

        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "width": 640,
                "height": 480,
                "detections": [],
                "summary": {
                    "sandstone_count": 0,
                    "siltstone_count": 0,
                    "total_instances": 0,
                    "sandstone_percentage": 0.0,
                    "siltstone_percentage": 0.0
                }
            })
        );
    }

    #[test]
    fn test_from_results_resolves_names() {
        let names = HashMap::from([(0, SANDSTONE.to_string()), (1, SILTSTONE.to_string())]);
        let mut results = Results::new((100, 200), (640, 640), names, Speed::default());
        results.boxes = Some(Boxes::new(
            array![
                [10.0, 20.0, 30.0, 40.0, 0.9, 1.0],
                [50.0, 60.0, 70.0, 80.0, 0.6, 0.0],
                [1.0, 2.0, 3.0, 4.0, 0.58, 5.0],
            ],
            (100, 200),
        ));

        let prediction = PredictionResult::from_results(&results);
        assert_eq!((prediction.width, prediction.height), (200, 100));
        assert_eq!(prediction.detections.len(), 3);

        let first = &prediction.detections[0];
        assert_eq!(first.class_name, "siltstone");
        assert_eq!(first.class_id, 1);
        assert!((first.confidence - 0.9).abs() < 1e-6);
        assert_eq!((first.x1, first.y1, first.x2, first.y2), (10.0, 20.0, 30.0, 40.0));

        assert_eq!(prediction.detections[2].class_name, "5");
        assert_eq!(prediction.summary.total_instances, 3);
        assert_eq!(prediction.summary.sandstone_count, 1);
        assert_eq!(prediction.summary.siltstone_count, 1);
    }
}
