// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP mapping of service errors.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use tracing::{error, warn};

use super::schema::ErrorResponse;
use crate::error::InferenceError;

/// Error returned by the request handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Client error (400).
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Error message sent to the client.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        let status = if err.is_client_error() {
            warn!("Rejected upload: {err}");
            StatusCode::BAD_REQUEST
        } else {
            error!("Request failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        // 413 when the body limit is hit, 400 for malformed bodies
        Self {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let decode = ApiError::from(InferenceError::DecodeError("bad bytes".to_string()));
        assert_eq!(decode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(decode.message(), "Invalid image: bad bytes");

        let inference = ApiError::from(InferenceError::InferenceError("boom".to_string()));
        assert_eq!(inference.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let encoding = ApiError::from(InferenceError::EncodingError("jpeg".to_string()));
        assert_eq!(encoding.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::bad_request("Missing 'file' field").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
