// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use tracing::info;

use crate::cli::args::PredictArgs;
use crate::cli::load_model;
use crate::detection::PredictionResult;
use crate::error::{InferenceError, Result};
use crate::io::{load_image, save_jpeg};
use crate::model::Detector;

/// Run [`run_prediction`] on the blocking pool.
///
/// # Errors
///
/// Returns the prediction error, or [`InferenceError::InferenceError`] if
/// the worker task panicked.
pub async fn run(args: PredictArgs) -> Result<()> {
    tokio::task::spawn_blocking(move || run_prediction(&args))
        .await
        .map_err(|e| InferenceError::InferenceError(format!("Prediction task failed: {e}")))?
}

/// Run the `/predict` pipeline once on a local image.
///
/// Prints the JSON response to stdout and optionally writes the annotated
/// image.
///
/// # Errors
///
/// Returns any model loading, decoding, inference or encoding error.
pub fn run_prediction(args: &PredictArgs) -> Result<()> {
    let (mut model, annotator) = load_model(&args.model)?;

    let image = load_image(&args.source)?;
    let results = model.predict(&image)?;
    info!(
        "{}: {} ({:.1}ms preprocess, {:.1}ms inference, {:.1}ms postprocess)",
        args.source.display(),
        results.verbose(),
        results.speed.preprocess.unwrap_or_default(),
        results.speed.inference.unwrap_or_default(),
        results.speed.postprocess.unwrap_or_default(),
    );

    let prediction = PredictionResult::from_results(&results);
    let json = serde_json::to_string_pretty(&prediction)
        .map_err(|e| InferenceError::EncodingError(format!("Failed to serialize result: {e}")))?;
    println!("{json}");

    if let Some(ref save) = args.save {
        let annotated = annotator.annotate(&image, &results);
        save_jpeg(&annotated, args.model.jpeg_quality, save)?;
        info!("Results saved to {}", save.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::args::{Cli, Commands};

    fn predict_args(argv: &[&str]) -> PredictArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Predict(args) => args,
            Commands::Serve(_) => panic!("expected predict"),
        }
    }

    #[tokio::test]
    async fn test_run_reports_missing_model() {
        let args = predict_args(&[
            "cutting-inference",
            "predict",
            "--model",
            "does/not/exist.onnx",
            "--source",
            "cutting.jpg",
        ]);

        let err = run(args).await.unwrap_err();
        assert!(matches!(err, InferenceError::ModelLoadError(_)));
    }
}
