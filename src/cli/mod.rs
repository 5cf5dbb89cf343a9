// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Command-line interface: argument parsing, logging setup and the `serve`
//! and `predict` commands.

// Modules
/// CLI arguments.
pub mod args;

/// Tracing subscriber setup.
pub mod logging;

/// One-shot prediction.
pub mod predict;

/// HTTP service startup.
pub mod serve;

use tracing::info;

use crate::annotate::Annotator;
use crate::error::Result;
use crate::model::YOLOModel;

use self::args::ModelArgs;

/// Load the model and label font described by `args`.
///
/// # Errors
///
/// Returns [`crate::InferenceError::ConfigError`] for invalid options and any
/// model or font loading error.
pub fn load_model(args: &ModelArgs) -> Result<(YOLOModel, Annotator)> {
    let config = args.inference_config();
    info!(
        "Loading {} (conf={}, iou={}, imgsz={}, device={})",
        args.model.display(),
        config.confidence_threshold,
        config.iou_threshold,
        config.imgsz,
        config.device
    );

    let model = YOLOModel::load(&args.model, config)?;
    let annotator = Annotator::resolve(args.font.as_deref(), model.names())?;
    Ok((model, annotator))
}
