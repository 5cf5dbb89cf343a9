// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the inference service.

use std::fmt;

/// Result type alias for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Main error type for the inference service.
#[derive(Debug)]
pub enum InferenceError {
    /// Error loading the ONNX model.
    ModelLoadError(String),
    /// Error parsing model metadata.
    MetadataError(String),
    /// Invalid configuration provided.
    ConfigError(String),
    /// Uploaded bytes are not a decodable image.
    DecodeError(String),
    /// Error during model inference or output decoding.
    InferenceError(String),
    /// Error rendering or re-encoding an annotated image.
    EncodingError(String),
    /// Wrapped `std::io::Error`.
    Io(std::io::Error),
}

impl InferenceError {
    /// Whether the error was caused by the caller's input rather than the service.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::DecodeError(_))
    }
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoadError(msg) => write!(f, "Model load error: {msg}"),
            Self::MetadataError(msg) => write!(f, "Metadata error: {msg}"),
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::DecodeError(msg) => write!(f, "Invalid image: {msg}"),
            Self::InferenceError(msg) => write!(f, "Inference error: {msg}"),
            Self::EncodingError(msg) => write!(f, "Encoding error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for InferenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for InferenceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InferenceError::DecodeError("unsupported format".to_string());
        assert_eq!(err.to_string(), "Invalid image: unsupported format");

        let err = InferenceError::InferenceError("test".to_string());
        assert_eq!(err.to_string(), "Inference error: test");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(InferenceError::DecodeError(String::new()).is_client_error());
        assert!(!InferenceError::InferenceError(String::new()).is_client_error());
        assert!(!InferenceError::EncodingError(String::new()).is_client_error());
    }

    #[test]
    fn test_io_source() {
        use std::error::Error;

        let err = InferenceError::from(std::io::Error::other("disk"));
        assert!(err.source().is_some());
    }
}
