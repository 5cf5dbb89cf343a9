// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLO model loading and inference.
//!
//! [`YOLOModel`] wraps one ONNX Runtime session. It is loaded once, warmed up,
//! and then used for every request through the [`Detector`] trait.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use image::DynamicImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use tracing::{debug, info, warn};

use crate::error::{InferenceError, Result};
use crate::inference::InferenceConfig;
use crate::metadata::{ModelMetadata, METADATA_KEYS};
use crate::postprocessing::{postprocess, RawOutput};
use crate::preprocessing::preprocess_image;
use crate::results::{Results, Speed};
use crate::task::Task;

/// Something that turns a decoded image into detections.
///
/// Inference needs exclusive access to the underlying session, hence `&mut`.
pub trait Detector: Send {
    /// Run detection on one image.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InferenceError`] if the model fails to run or
    /// produces output that cannot be decoded.
    fn predict(&mut self, image: &DynamicImage) -> Result<Results>;

    /// Path of the loaded model artifact, as reported by `/health`.
    fn model_path(&self) -> &str;
}

/// YOLO model for inference.
///
/// # Example
///
/// ```no_run
/// use cutting_inference::{Detector, InferenceConfig, YOLOModel};
///
/// let mut model = YOLOModel::load("fixModel.onnx", InferenceConfig::default())?;
/// let image = image::open("cutting.jpg").map_err(|e| cutting_inference::InferenceError::DecodeError(e.to_string()))?;
/// let results = model.predict(&image)?;
/// println!("{}", results.verbose());
/// # Ok::<(), cutting_inference::InferenceError>(())
/// ```
pub struct YOLOModel {
    session: Session,
    metadata: ModelMetadata,
    input_name: String,
    output_names: Vec<String>,
    config: InferenceConfig,
    model_path: String,
}

impl YOLOModel {
    /// Load a YOLO model from an ONNX file and warm it up.
    ///
    /// Class names, task and export size are read from the ONNX custom
    /// metadata. The configured input size wins over the exported one.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ConfigError`] for an invalid configuration,
    /// [`InferenceError::ModelLoadError`] if the file is missing or cannot be
    /// loaded, and [`InferenceError::MetadataError`] for malformed metadata.
    pub fn load<P: AsRef<Path>>(path: P, config: InferenceConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;

        if !path.exists() {
            return Err(InferenceError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let builder = Session::builder().map_err(|e| {
            InferenceError::ModelLoadError(format!("Failed to create session builder: {e}"))
        })?;
        let builder = config.device.register(builder)?;

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                InferenceError::ModelLoadError(format!("Failed to set optimization level: {e}"))
            })?
            .with_intra_threads(config.num_threads)
            .map_err(|e| {
                InferenceError::ModelLoadError(format!("Failed to set intra-thread count: {e}"))
            })?
            .commit_from_file(path)
            .map_err(|e| InferenceError::ModelLoadError(format!("Failed to load model: {e}")))?;

        let metadata = Self::extract_metadata(&session)?;

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "images".to_string(), |i| i.name.clone());
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        if output_names.len() < metadata.task.num_outputs() {
            return Err(InferenceError::ModelLoadError(format!(
                "{} model must have {} outputs, found {}",
                metadata.task,
                metadata.task.num_outputs(),
                output_names.len()
            )));
        }

        if metadata.imgsz != config.target_size() {
            warn!(
                exported = ?metadata.imgsz,
                configured = config.imgsz,
                "Configured input size differs from the model export"
            );
        }

        let mut model = Self {
            session,
            metadata,
            input_name,
            output_names,
            config,
            model_path: path.display().to_string(),
        };
        model.warmup()?;

        info!(
            model = %model.model_path,
            task = %model.metadata.task,
            classes = model.metadata.num_classes(),
            device = %model.config.device,
            "Model loaded"
        );

        Ok(model)
    }

    /// Run one inference on a zero tensor so the first request is not slow.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InferenceError`] if the session fails to run.
    pub fn warmup(&mut self) -> Result<()> {
        let (h, w) = self.config.target_size();
        let start = Instant::now();
        let _ = self.run_inference(&Array4::<f32>::zeros((1, 3, h, w)))?;
        debug!(elapsed_ms = start.elapsed().as_secs_f64() * 1000.0, "Warmup done");
        Ok(())
    }

    fn extract_metadata(session: &Session) -> Result<ModelMetadata> {
        let model_metadata = session.metadata().map_err(|e| {
            InferenceError::ModelLoadError(format!("Failed to get model metadata: {e}"))
        })?;

        let props: HashMap<String, String> = METADATA_KEYS
            .iter()
            .filter_map(|key| match model_metadata.custom(key) {
                Ok(Some(value)) => Some(((*key).to_string(), value)),
                _ => None,
            })
            .collect();

        if props.is_empty() {
            warn!("Model has no Ultralytics metadata, falling back to defaults");
        }

        ModelMetadata::from_properties(&props)
    }

    /// Run inference on a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InferenceError`] if preprocessing, the session
    /// run or output decoding fails.
    pub fn predict_image(&mut self, image: &DynamicImage) -> Result<Results> {
        let start_preprocess = Instant::now();
        let preprocess_result = preprocess_image(image, self.config.target_size())?;
        let preprocess_time = start_preprocess.elapsed().as_secs_f64() * 1000.0;

        let start_inference = Instant::now();
        let outputs = self.run_inference(&preprocess_result.tensor)?;
        let inference_time = start_inference.elapsed().as_secs_f64() * 1000.0;

        let start_postprocess = Instant::now();
        let mut results = postprocess(
            &outputs,
            self.metadata.task,
            &preprocess_result,
            &self.config,
            &self.metadata.names,
            Speed::new(preprocess_time, inference_time, 0.0),
        )?;
        results.speed.postprocess = Some(start_postprocess.elapsed().as_secs_f64() * 1000.0);

        Ok(results)
    }

    /// Run the session and copy out every output as `(data, shape)`.
    fn run_inference(&mut self, input: &Array4<f32>) -> Result<Vec<RawOutput>> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous).map_err(|e| {
            InferenceError::InferenceError(format!("Failed to create input tensor: {e}"))
        })?;

        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| InferenceError::InferenceError(format!("Inference failed: {e}")))?;

        let mut raw = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let output = outputs
                .get(name.as_str())
                .ok_or_else(|| InferenceError::InferenceError(format!("Output '{name}' not found")))?;
            let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
                InferenceError::InferenceError(format!("Failed to extract output '{name}': {e}"))
            })?;

            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let shape_vec: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            raw.push((data.to_vec(), shape_vec));
        }

        Ok(raw)
    }

    /// Task performed by the model.
    #[must_use]
    pub const fn task(&self) -> Task {
        self.metadata.task
    }

    /// Class index to label table.
    #[must_use]
    pub fn names(&self) -> &HashMap<usize, String> {
        &self.metadata.names
    }

    /// Model metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Inference configuration in use.
    #[must_use]
    pub const fn config(&self) -> &InferenceConfig {
        &self.config
    }
}

impl Detector for YOLOModel {
    fn predict(&mut self, image: &DynamicImage) -> Result<Results> {
        self.predict_image(image)
    }

    fn model_path(&self) -> &str {
        &self.model_path
    }
}

impl std::fmt::Debug for YOLOModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YOLOModel")
            .field("model_path", &self.model_path)
            .field("task", &self.metadata.task)
            .field("num_classes", &self.metadata.num_classes())
            .field("imgsz", &self.config.imgsz)
            .field("device", &self.config.device)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found() {
        let result = YOLOModel::load("nonexistent.onnx", InferenceConfig::default());
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }

    #[test]
    fn test_invalid_config_rejected_before_loading() {
        let config = InferenceConfig::default().with_confidence(2.0);
        let result = YOLOModel::load("nonexistent.onnx", config);
        assert!(matches!(result, Err(InferenceError::ConfigError(_))));
    }
}
