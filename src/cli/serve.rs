// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::Arc;

use crate::cli::args::ServeArgs;
use crate::cli::load_model;
use crate::error::{InferenceError, Result};
use crate::server::{serve, AppState};

/// Load the model once and serve until shutdown.
///
/// # Errors
///
/// Returns a startup error (configuration, model load, bind) or a server
/// I/O error.
pub async fn run_server(args: &ServeArgs) -> Result<()> {
    let server_config = args.server_config();
    // Validate CORS origins before loading the model
    server_config.cors_layer()?;

    let model_args = args.model.clone();
    let (model, annotator) = tokio::task::spawn_blocking(move || load_model(&model_args))
        .await
        .map_err(|e| InferenceError::ModelLoadError(format!("Model loader failed: {e}")))??;

    let state = AppState::new(Box::new(model), annotator).with_jpeg_quality(args.model.jpeg_quality);
    serve(Arc::new(state), &server_config).await
}
