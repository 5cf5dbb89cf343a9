// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP contract tests driving the router with a fake detector.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::Router;
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array2;
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot`

use cutting_inference::io::encode_jpeg;
use cutting_inference::{
    create_app, Annotator, AppState, Boxes, Detector, InferenceError, Results, ServerConfig, Speed,
};

const BOUNDARY: &str = "cutting-test-boundary";
const MODEL_PATH: &str = "models/fixModel.onnx";

/// Returns the same detections for every image.
struct FakeDetector {
    rows: Vec<[f32; 6]>,
    fail: bool,
    panics_left: usize,
}

impl FakeDetector {
    fn empty() -> Self {
        Self::with_rows(Vec::new())
    }

    fn with_rows(rows: Vec<[f32; 6]>) -> Self {
        Self {
            rows,
            fail: false,
            panics_left: 0,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::empty()
        }
    }

    /// Panics on the first `count` calls.
    fn panicking(count: usize) -> Self {
        Self {
            panics_left: count,
            ..Self::with_rows(vec![[10.0, 10.0, 20.0, 20.0, 0.9, 0.0]])
        }
    }
}

impl Detector for FakeDetector {
    fn predict(&mut self, image: &DynamicImage) -> cutting_inference::Result<Results> {
        if self.panics_left > 0 {
            self.panics_left -= 1;
            panic!("onnxruntime aborted");
        }
        if self.fail {
            return Err(InferenceError::InferenceError("session crashed".to_string()));
        }

        let shape = (image.height(), image.width());
        let names = HashMap::from([(0, "sandstone".to_string()), (1, "siltstone".to_string())]);
        let mut results = Results::new(shape, (640, 640), names, Speed::default());

        if !self.rows.is_empty() {
            let flat: Vec<f32> = self.rows.iter().flatten().copied().collect();
            let data = Array2::from_shape_vec((self.rows.len(), 6), flat).unwrap();
            results.boxes = Some(Boxes::new(data, shape));
        }
        Ok(results)
    }

    fn model_path(&self) -> &str {
        MODEL_PATH
    }
}

fn app_with(detector: FakeDetector, config: &ServerConfig) -> Router {
    let state = AppState::new(Box::new(detector), Annotator::new(None));
    create_app(Arc::new(state), config).unwrap()
}

fn app(detector: FakeDetector) -> Router {
    app_with(detector, &ServerConfig::default())
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encode_jpeg(&RgbImage::from_pixel(width, height, Rgb([128, 128, 128])), 90).unwrap()
}

fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app(FakeDetector::empty()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"status": "ok", "model": MODEL_PATH}));
}

#[tokio::test]
async fn test_predict_without_detections() {
    let body = multipart_body("file", "empty.jpg", "image/jpeg", &jpeg(640, 480));
    let response = app(FakeDetector::empty())
        .oneshot(upload("/predict", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({
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

#[tokio::test]
async fn test_predict_with_detections() {
    let detector = FakeDetector::with_rows(vec![
        [10.0, 20.0, 110.0, 120.0, 0.9, 0.0],
        [200.0, 50.0, 260.0, 90.0, 0.8, 1.0],
        [300.0, 100.0, 340.0, 150.0, 0.7, 0.0],
        [5.0, 5.0, 15.0, 15.0, 0.6, 7.0],
    ]);
    let body = multipart_body("file", "cutting.jpg", "image/jpeg", &jpeg(400, 300));
    let response = app(detector).oneshot(upload("/predict", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let value = json_body(response).await;

    assert_eq!(value["width"], 400);
    assert_eq!(value["height"], 300);

    let detections = value["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 4);
    assert_eq!(detections[0]["class_name"], "sandstone");
    assert_eq!(detections[0]["class_id"], 0);
    assert_eq!(detections[0]["x2"], 110.0);
    assert_eq!(detections[1]["class_name"], "siltstone");
    assert_eq!(detections[3]["class_name"], "7");
    for d in detections {
        let conf = d["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&conf));
    }

    let summary = &value["summary"];
    assert_eq!(summary["sandstone_count"], 2);
    assert_eq!(summary["siltstone_count"], 1);
    assert_eq!(summary["total_instances"], 4);
    assert_eq!(summary["sandstone_percentage"], 50.0);
    assert_eq!(summary["siltstone_percentage"], 25.0);
}

#[tokio::test]
async fn test_predict_rejects_non_image() {
    let body = multipart_body("file", "notes.txt", "text/plain", b"definitely not pixels");
    let response = app(FakeDetector::empty())
        .oneshot(upload("/predict", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let value = json_body(response).await;
    assert!(value["error"].as_str().unwrap().starts_with("Invalid image"));
}

#[tokio::test]
async fn test_predict_rejects_empty_upload() {
    let body = multipart_body("file", "empty.jpg", "image/jpeg", b"");
    let response = app(FakeDetector::empty())
        .oneshot(upload("/predict", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_predict_missing_file_field() {
    let body = multipart_body("image", "cutting.jpg", "image/jpeg", &jpeg(32, 32));
    let response = app(FakeDetector::empty())
        .oneshot(upload("/predict", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Missing 'file' field");
}

#[tokio::test]
async fn test_predict_inference_failure_is_server_error() {
    let body = multipart_body("file", "cutting.jpg", "image/jpeg", &jpeg(32, 32));
    let response = app(FakeDetector::failing())
        .oneshot(upload("/predict", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Inference error: session crashed");
}

#[tokio::test]
async fn test_service_recovers_after_panicked_inference() {
    let app = app(FakeDetector::panicking(1));
    let image = jpeg(64, 48);

    let response = app
        .clone()
        .oneshot(upload("/predict", multipart_body("file", "a.jpg", "image/jpeg", &image)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app
        .clone()
        .oneshot(upload("/predict", multipart_body("file", "b.jpg", "image/jpeg", &image)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = json_body(response).await;
    assert_eq!(value["summary"]["sandstone_count"], 1);

    let response = app
        .clone()
        .oneshot(upload("/predict-image", multipart_body("file", "c.jpg", "image/jpeg", &image)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_predict_image_returns_jpeg() {
    let detector = FakeDetector::with_rows(vec![[10.0, 10.0, 100.0, 80.0, 0.9, 1.0]]);
    let body = multipart_body("file", "cutting.jpg", "image/jpeg", &jpeg(160, 120));
    let response = app(detector)
        .oneshot(upload("/predict-image", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        response.headers()[CONTENT_DISPOSITION],
        "inline; filename=predict.jpg"
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (160, 120));
}

#[tokio::test]
async fn test_predict_image_rejects_non_image() {
    let body = multipart_body("file", "notes.txt", "text/plain", b"hello");
    let response = app(FakeDetector::empty())
        .oneshot(upload("/predict-image", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let config = ServerConfig {
        max_upload_bytes: 1024,
        ..ServerConfig::default()
    };
    let body = multipart_body("file", "big.bin", "image/jpeg", &vec![0u8; 16 * 1024]);
    let response = app_with(FakeDetector::empty(), &config)
        .oneshot(upload("/predict", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let request = Request::builder()
        .uri("/health")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app(FakeDetector::empty()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_openapi_document() {
    let request = Request::builder().uri("/openapi.json").body(Body::empty()).unwrap();
    let response = app(FakeDetector::empty()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let value = json_body(response).await;
    assert!(value["paths"]["/predict"].is_object());
    assert!(value["paths"]["/predict-image"].is_object());
    assert!(value["paths"]["/health"].is_object());
}
