// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX model metadata parsing.
//!
//! Ultralytics exports store their configuration as individual custom
//! metadata properties on the ONNX graph, e.g.
//!
//! ```text
//! task   = segment
//! stride = 32
//! imgsz  = [640, 640]
//! names  = {0: 'sandstone', 1: 'siltstone'}
//! ```
//!
//! The class-name table is treated as an opaque contract of the model
//! artifact: the same index always maps to the same label.

use std::collections::HashMap;

use crate::error::{InferenceError, Result};
use crate::task::Task;

/// Metadata keys read from an Ultralytics ONNX export.
pub const METADATA_KEYS: [&str; 6] = ["description", "version", "task", "stride", "imgsz", "names"];

/// Metadata extracted from the model artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMetadata {
    /// Free-form model description.
    pub description: String,
    /// Exporter version.
    pub version: String,
    /// Task the model performs.
    pub task: Task,
    /// Model stride (32 for YOLO).
    pub stride: u32,
    /// Export input size as `(height, width)`.
    pub imgsz: (usize, usize),
    /// Class index to label.
    pub names: HashMap<usize, String>,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            version: String::new(),
            task: Task::Detect,
            stride: 32,
            imgsz: (640, 640),
            names: HashMap::new(),
        }
    }
}

impl ModelMetadata {
    /// Build metadata from the model's custom properties.
    ///
    /// Missing keys keep their defaults; present but malformed values are errors.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::MetadataError`] for an unsupported task or an
    /// unparsable stride, image size or names table.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut metadata = Self::default();

        if let Some(value) = props.get("description") {
            metadata.description = unquote(value).to_string();
        }
        if let Some(value) = props.get("version") {
            metadata.version = unquote(value).to_string();
        }
        if let Some(value) = props.get("task") {
            metadata.task = unquote(value)
                .parse()
                .map_err(|e| InferenceError::MetadataError(format!("{e}")))?;
        }
        if let Some(value) = props.get("stride") {
            metadata.stride = value.trim().parse().map_err(|_| {
                InferenceError::MetadataError(format!("Invalid stride value: {value}"))
            })?;
        }
        if let Some(value) = props.get("imgsz") {
            metadata.imgsz = parse_imgsz(value)?;
        }
        if let Some(value) = props.get("names") {
            metadata.names = parse_names(value)?;
        }

        Ok(metadata)
    }

    /// Number of classes in the names table.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// Label for a class index.
    #[must_use]
    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '\'' || c == '"')
}

/// Parse `[640, 640]` or a bare `640`.
fn parse_imgsz(value: &str) -> Result<(usize, usize)> {
    let inner = value.trim().trim_start_matches('[').trim_end_matches(']');
    let dims = inner
        .split(',')
        .map(|s| s.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| InferenceError::MetadataError(format!("Invalid imgsz value: {value}")))?;

    match dims.as_slice() {
        [side] => Ok((*side, *side)),
        [h, w] => Ok((*h, *w)),
        _ => Err(InferenceError::MetadataError(format!(
            "Invalid imgsz value: {value}"
        ))),
    }
}

/// Parse a Python dict literal `{0: 'sandstone', 1: 'siltstone'}`.
fn parse_names(value: &str) -> Result<HashMap<usize, String>> {
    let inner = value.trim().trim_start_matches('{').trim_end_matches('}');
    let mut names = HashMap::new();

    for entry in inner.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, label) = entry.split_once(':').ok_or_else(|| {
            InferenceError::MetadataError(format!("Invalid names entry: {entry}"))
        })?;
        let class_id = key.trim().parse::<usize>().map_err(|_| {
            InferenceError::MetadataError(format!("Invalid class index: {key}"))
        })?;
        names.insert(class_id, unquote(label).to_string());
    }

    Ok(names)
}
