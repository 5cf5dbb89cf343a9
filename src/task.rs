// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Model task types supported by the service.
//!
//! A cutting model is either a plain detector or an instance-segmentation
//! model. Other Ultralytics tasks (pose, classify, obb) have no meaning for
//! rock-type counting and are rejected when the model is loaded.

use std::fmt;
use std::str::FromStr;

/// Task performed by the loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Task {
    /// Object detection: boxes, class labels and scores.
    #[default]
    Detect,
    /// Instance segmentation: detection plus one mask per instance.
    Segment,
}

impl Task {
    /// String form used in ONNX model metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Segment => "segment",
        }
    }

    /// Whether this task produces segmentation masks.
    #[must_use]
    pub const fn has_masks(&self) -> bool {
        matches!(self, Self::Segment)
    }

    /// Number of model outputs the task expects (segment adds the mask protos).
    #[must_use]
    pub const fn num_outputs(&self) -> usize {
        match self {
            Self::Detect => 1,
            Self::Segment => 2,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = TaskParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "detect" | "detection" => Ok(Self::Detect),
            "segment" | "segmentation" => Ok(Self::Segment),
            _ => Err(TaskParseError(s.to_string())),
        }
    }
}

/// Error returned when the model declares a task the service cannot serve.
#[derive(Debug, Clone)]
pub struct TaskParseError(String);

impl fmt::Display for TaskParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported task '{}', expected detect or segment", self.0)
    }
}

impl std::error::Error for TaskParseError {}
