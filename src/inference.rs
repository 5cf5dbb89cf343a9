// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Inference configuration.
//!
//! [`InferenceConfig`] carries the fixed hyperparameters every request is run
//! with. The defaults are the thresholds chosen for the cutting model
//! (confidence 0.55, `IoU` 0.45, 640 px input).

use crate::device::Device;
use crate::error::{InferenceError, Result};

/// Default confidence threshold.
pub const DEFAULT_CONF: f32 = 0.55;
/// Default NMS `IoU` threshold.
pub const DEFAULT_IOU: f32 = 0.45;
/// Default inference input size (longer side, square letterbox).
pub const DEFAULT_IMGSZ: usize = 640;
/// Default cap on detections per image.
pub const DEFAULT_MAX_DET: usize = 300;

/// Configuration for model inference.
///
/// # Example
///
/// ```rust
/// use cutting_inference::InferenceConfig;
///
/// let config = InferenceConfig::new()
///     .with_confidence(0.5)
///     .with_iou(0.45)
///     .with_imgsz(640);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// Minimum score for a candidate detection to be kept.
    pub confidence_threshold: f32,
    /// Boxes of the same class overlapping more than this are suppressed.
    pub iou_threshold: f32,
    /// Square input size the image is letterboxed to.
    pub imgsz: usize,
    /// Maximum number of detections returned per image.
    pub max_detections: usize,
    /// Intra-op threads for ONNX Runtime (`0` lets the runtime decide).
    pub num_threads: usize,
    /// Execution device.
    pub device: Device,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONF,
            iou_threshold: DEFAULT_IOU,
            imgsz: DEFAULT_IMGSZ,
            max_detections: DEFAULT_MAX_DET,
            num_threads: 0,
            device: Device::Cpu,
        }
    }
}

impl InferenceConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the `IoU` threshold used by NMS.
    #[must_use]
    pub const fn with_iou(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Set the square input size.
    #[must_use]
    pub const fn with_imgsz(mut self, imgsz: usize) -> Self {
        self.imgsz = imgsz;
        self
    }

    /// Set the maximum number of detections per image.
    #[must_use]
    pub const fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    /// Set the number of intra-op threads.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Set the execution device.
    #[must_use]
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Input size as `(height, width)`.
    #[must_use]
    pub const fn target_size(&self) -> (usize, usize) {
        (self.imgsz, self.imgsz)
    }

    /// Check that every value is within its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(InferenceError::ConfigError(format!(
                "confidence threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(InferenceError::ConfigError(format!(
                "IoU threshold must be in [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if self.imgsz == 0 {
            return Err(InferenceError::ConfigError(
                "input size must be a positive integer".to_string(),
            ));
        }
        if self.max_detections == 0 {
            return Err(InferenceError::ConfigError(
                "max detections must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}
