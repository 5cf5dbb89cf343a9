// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Request handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Json, Response};
use tracing::debug;

use super::error::ApiError;
use super::schema::{ErrorResponse, HealthResponse, UploadForm};
use super::AppState;
use crate::detection::PredictionResult;
use crate::error::{InferenceError, Result};
use crate::io::{decode_image, encode_jpeg};

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

/// Health check
///
/// Reports that the service is up and which model it serves. Never waits on
/// an in-flight inference.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.model_path().to_string(),
    })
}

/// Detect objects in an uploaded image
///
/// Returns every detection with its class, confidence and box in original
/// image pixels, plus a sandstone / siltstone summary.
#[utoipa::path(
    post,
    path = "/predict",
    tag = "inference",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Inference successful", body = PredictionResult),
        (status = 400, description = "Missing file field or undecodable image", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the body limit", body = ErrorResponse),
        (status = 500, description = "Inference failed", body = ErrorResponse)
    )
)]
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> std::result::Result<Json<PredictionResult>, ApiError> {
    let bytes = read_upload(multipart).await?;

    let prediction = run_blocking(move || {
        let image = decode_image(&bytes)?;
        let results = state.detect(&image)?;
        Ok(PredictionResult::from_results(&results))
    })
    .await?;

    Ok(Json(prediction))
}

/// Render detections onto an uploaded image
///
/// Returns the original image with masks, boxes and labels drawn, as JPEG.
#[utoipa::path(
    post,
    path = "/predict-image",
    tag = "inference",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Annotated image", content_type = "image/jpeg", body = Vec<u8>),
        (status = 400, description = "Missing file field or undecodable image", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the body limit", body = ErrorResponse),
        (status = 500, description = "Inference or encoding failed", body = ErrorResponse)
    )
)]
pub async fn predict_image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> std::result::Result<Response, ApiError> {
    let bytes = read_upload(multipart).await?;

    let jpeg = run_blocking(move || {
        let image = decode_image(&bytes)?;
        let results = state.detect(&image)?;
        let annotated = state.annotator().annotate(&image, &results);
        encode_jpeg(&annotated, state.jpeg_quality())
    })
    .await?;

    Ok((
        [
            (CONTENT_TYPE, "image/jpeg"),
            (CONTENT_DISPOSITION, "inline; filename=predict.jpg"),
        ],
        jpeg,
    )
        .into_response())
}

/// Bytes of the `file` field.
async fn read_upload(mut multipart: Multipart) -> std::result::Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field.bytes().await?;
            debug!(size = bytes.len(), "Received upload");
            return Ok(bytes);
        }
    }
    Err(ApiError::bad_request(format!("Missing '{UPLOAD_FIELD}' field")))
}

/// Run decoding, inference and encoding off the async workers.
async fn run_blocking<T, F>(work: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| InferenceError::InferenceError(format!("worker task failed: {e}")))?
        .map_err(ApiError::from)
}
