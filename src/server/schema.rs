// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Response bodies and the OpenAPI document.

use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::detection::{Detection, PredictionResult, Summary};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    #[schema(example = "ok")]
    pub status: String,
    /// Path of the loaded model artifact.
    #[schema(example = "../model-ai/fixModel.onnx")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

/// Multipart upload accepted by both prediction endpoints.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// Image file (JPEG, PNG, BMP, WebP, ...).
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cutting Inference Service",
        description = "Automated cutting description: YOLO segmentation of sandstone and siltstone in rock-cutting images.",
        version = "0.1.0",
        license(name = "AGPL-3.0")
    ),
    paths(
        crate::server::handlers::health,
        crate::server::handlers::predict,
        crate::server::handlers::predict_image
    ),
    components(schemas(
        HealthResponse,
        ErrorResponse,
        UploadForm,
        Detection,
        Summary,
        PredictionResult
    )),
    tags(
        (name = "inference", description = "Model inference endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;
