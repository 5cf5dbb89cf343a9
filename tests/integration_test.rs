// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Integration tests for the inference library

use std::collections::HashMap;

use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array2;

use cutting_inference::io::{decode_image, encode_jpeg};
use cutting_inference::{
    Annotator, Boxes, Detection, InferenceConfig, InferenceError, PredictionResult, Results, Speed,
    Summary, YOLOModel,
};

fn detection(class_name: &str, class_id: usize) -> Detection {
    Detection {
        class_name: class_name.to_string(),
        class_id,
        confidence: 0.9,
        x1: 0.0,
        y1: 0.0,
        x2: 10.0,
        y2: 10.0,
    }
}

fn results_with(rows: &[[f32; 6]], shape: (u32, u32)) -> Results {
    let names = HashMap::from([(0, "sandstone".to_string()), (1, "siltstone".to_string())]);
    let mut results = Results::new(shape, (640, 640), names, Speed::default());
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    results.boxes = Some(Boxes::new(
        Array2::from_shape_vec((rows.len(), 6), flat).unwrap(),
        shape,
    ));
    results
}

#[test]
fn test_inference_config_defaults() {
    let config = InferenceConfig::default();
    assert_eq!(config.confidence_threshold, 0.55);
    assert_eq!(config.iou_threshold, 0.45);
    assert_eq!(config.imgsz, 640);
    assert_eq!(config.max_detections, 300);
    assert!(config.validate().is_ok());
}

#[test]
fn test_inference_config_rejects_out_of_range() {
    let config = InferenceConfig::new().with_confidence(1.5);
    assert!(matches!(config.validate(), Err(InferenceError::ConfigError(_))));
}

#[test]
fn test_summary_invariants() {
    let detections = vec![
        detection("sandstone", 0),
        detection("sandstone", 0),
        detection("siltstone", 1),
        detection("2", 2),
        detection("2", 2),
    ];
    let summary = Summary::from_detections(&detections);

    assert_eq!(summary.total_instances, detections.len());
    assert!(summary.sandstone_count + summary.siltstone_count <= summary.total_instances);
    assert!((summary.sandstone_percentage - 40.0).abs() < 1e-9);
    assert!((summary.siltstone_percentage - 20.0).abs() < 1e-9);
}

#[test]
fn test_summary_of_nothing_is_zero() {
    assert_eq!(Summary::from_detections(&[]), Summary::default());
}

#[test]
fn test_prediction_result_from_results() {
    let results = results_with(
        &[
            [1.0, 2.0, 30.0, 40.0, 0.91, 1.0],
            [50.0, 60.0, 70.0, 80.0, 0.6, 0.0],
        ],
        (100, 200),
    );
    let prediction = PredictionResult::from_results(&results);

    assert_eq!((prediction.width, prediction.height), (200, 100));
    assert_eq!(prediction.detections.len(), 2);
    assert_eq!(prediction.detections[0].class_name, "siltstone");
    assert_eq!(prediction.detections[0].class_id, 1);
    assert_eq!(prediction.summary.total_instances, 2);
    assert_eq!(prediction.summary.sandstone_count, 1);

    let value = serde_json::to_value(&prediction).unwrap();
    assert_eq!(value["detections"][0]["x1"], 1.0);
    assert_eq!(value["summary"]["siltstone_percentage"], 50.0);
}

#[test]
fn test_annotated_jpeg_keeps_dimensions() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 80, Rgb([200, 200, 200])));
    let results = results_with(&[[10.0, 10.0, 60.0, 50.0, 0.8, 0.0]], (80, 120));

    let rendered = Annotator::new(None).annotate(&image, &results);
    let bytes = encode_jpeg(&rendered, 90).unwrap();
    let decoded = decode_image(&bytes).unwrap();

    assert_eq!((decoded.width(), decoded.height()), (120, 80));
}

#[test]
fn test_decode_rejects_garbage() {
    let err = decode_image(b"not an image").unwrap_err();
    assert!(err.is_client_error());
}

#[test]
fn test_load_missing_model() {
    let err = YOLOModel::load("does/not/exist.onnx", InferenceConfig::default()).unwrap_err();
    assert!(matches!(err, InferenceError::ModelLoadError(_)));
}
