// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Cutting Inference
//!
//! HTTP inference service for YOLO segmentation models trained on rock-cutting
//! images. The model (an Ultralytics ONNX export) is loaded once at startup and
//! every upload is run through it, returning either structured detections with
//! a sandstone / siltstone summary or an annotated JPEG.
//!
//! ## HTTP API
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `GET` | `/health` | | `{"status": "ok", "model": "<path>"}` |
//! | `POST` | `/predict` | multipart field `file` | [`PredictionResult`] as JSON |
//! | `POST` | `/predict-image` | multipart field `file` | annotated `image/jpeg` |
//! | `GET` | `/openapi.json`, `/docs` | | OpenAPI document, Swagger UI |
//!
//! Undecodable uploads and a missing `file` field are `400`, inference and
//! encoding failures are `500`. Error bodies are `{"error": "<message>"}`.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Serve on 0.0.0.0:8000 with the default thresholds (conf 0.55, iou 0.45, imgsz 640)
//! cutting-inference serve --model ../model-ai/fixModel.onnx
//!
//! # Same, configured from the environment
//! MODEL_PATH=fixModel.onnx PORT=9000 CONF_THRESHOLD=0.5 cutting-inference serve
//!
//! # One-shot prediction, prints the /predict JSON and saves the rendering
//! cutting-inference predict --source cutting.jpg --save predict.jpg
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use cutting_inference::{Detector, InferenceConfig, PredictionResult, YOLOModel};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InferenceConfig::new().with_confidence(0.55).with_iou(0.45);
//!     let mut model = YOLOModel::load("fixModel.onnx", config)?;
//!
//!     let image = cutting_inference::io::load_image("cutting.jpg")?;
//!     let results = model.predict(&image)?;
//!
//!     let prediction = PredictionResult::from_results(&results);
//!     println!(
//!         "{} sandstone, {} siltstone of {}",
//!         prediction.summary.sandstone_count,
//!         prediction.summary.siltstone_count,
//!         prediction.summary.total_instances
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Hardware Acceleration
//!
//! ```bash
//! cargo build --release --features cuda      # then --device cuda:0
//! cargo build --release --features tensorrt  # then --device tensorrt:0
//! cargo build --release --features coreml    # then --device coreml
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`server`] | axum router, handlers and OpenAPI document |
//! | [`model`] | [`YOLOModel`] and the [`Detector`] trait |
//! | [`detection`] | Public response schema ([`Detection`], [`Summary`], [`PredictionResult`]) |
//! | [`annotate`] | Mask, box and label rendering |
//! | [`results`] | Raw output types ([`Results`], [`Boxes`], [`Masks`]) |
//! | [`inference`] | [`InferenceConfig`] |
//! | [`preprocessing`] / [`postprocessing`] | Letterboxing, decoding and NMS |
//! | [`metadata`] | ONNX model metadata parsing |
//! | [`cli`] | Command-line interface |

// Modules
pub mod annotate;
pub mod cli;
pub mod detection;
pub mod device;
pub mod error;
pub mod inference;
pub mod io;
pub mod metadata;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod results;
pub mod server;
pub mod task;
pub mod utils;

// Re-export main types for convenience
pub use annotate::Annotator;
pub use detection::{Detection, PredictionResult, Summary};
pub use device::Device;
pub use error::{InferenceError, Result};
pub use inference::InferenceConfig;
pub use metadata::ModelMetadata;
pub use model::{Detector, YOLOModel};
pub use results::{Boxes, Masks, Results, Speed};
pub use server::{create_app, AppState, ServerConfig};
pub use task::Task;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
