// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::device::Device;
use crate::inference::{InferenceConfig, DEFAULT_CONF, DEFAULT_IMGSZ, DEFAULT_IOU, DEFAULT_MAX_DET};
use crate::io::DEFAULT_JPEG_QUALITY;
use crate::server::{ServerConfig, DEFAULT_HOST, DEFAULT_MAX_UPLOAD_MB, DEFAULT_PORT};

/// Default model artifact, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "../model-ai/fixModel.onnx";

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Every option can also be set through the environment variable shown in its help.

Examples:
    cutting-inference serve --model ../model-ai/fixModel.onnx
    MODEL_PATH=fixModel.onnx PORT=9000 cutting-inference serve
    cutting-inference serve --cors-origin http://localhost:3000 --device cuda:0
    cutting-inference predict --source cutting.jpg --save runs/predict.jpg"#)]
pub struct Cli {
    /// Enable debug logging (`RUST_LOG` takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP inference service
    Serve(ServeArgs),
    /// Run the /predict pipeline once on a local image and print the JSON
    Predict(PredictArgs),
}

/// Model and inference options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Path to ONNX model file
    #[arg(short, long, env = "MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Confidence threshold
    #[arg(long, env = "CONF_THRESHOLD", default_value_t = DEFAULT_CONF)]
    pub conf: f32,

    /// `IoU` threshold for NMS
    #[arg(long, env = "IOU_THRESHOLD", default_value_t = DEFAULT_IOU)]
    pub iou: f32,

    /// Inference image size
    #[arg(long, env = "IMG_SIZE", default_value_t = DEFAULT_IMGSZ)]
    pub imgsz: usize,

    /// Maximum detections per image
    #[arg(long, env = "MAX_DET", default_value_t = DEFAULT_MAX_DET)]
    pub max_det: usize,

    /// Device to use (cpu, cuda:0, tensorrt:0, coreml)
    #[arg(long, env = "DEVICE", default_value = "cpu")]
    pub device: Device,

    /// ONNX Runtime intra-op threads (0 lets the runtime decide)
    #[arg(long, env = "NUM_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// JPEG quality of annotated images
    #[arg(long, env = "JPEG_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// TrueType font for labels (default: cached Arial, downloaded on first use)
    #[arg(long, env = "FONT_PATH")]
    pub font: Option<PathBuf>,
}

impl ModelArgs {
    /// Inference configuration from these options.
    #[must_use]
    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig::new()
            .with_confidence(self.conf)
            .with_iou(self.iou)
            .with_imgsz(self.imgsz)
            .with_max_detections(self.max_det)
            .with_threads(self.threads)
            .with_device(self.device.clone())
    }
}

/// Arguments for the serve command.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Allowed CORS origin, repeatable (`*` allows any)
    #[arg(long = "cors-origin", env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Maximum upload size in MiB
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_MB,
          value_parser = parse_positive)]
    pub max_upload_mb: usize,
}

impl ServeArgs {
    /// Network settings from these options.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            max_upload_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
        }
    }
}

/// Arguments for the predict command.
#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Image to run inference on
    #[arg(short, long)]
    pub source: PathBuf,

    /// Also write the annotated JPEG to this path
    #[arg(long)]
    pub save: Option<PathBuf>,
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be greater than 0".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
