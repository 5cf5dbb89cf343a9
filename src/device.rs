// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Execution device selection for ONNX Runtime.

use std::fmt;
use std::str::FromStr;

use ort::session::builder::SessionBuilder;

use crate::error::{InferenceError, Result};

/// Hardware device used to run the model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Device {
    /// Default CPU execution provider.
    #[default]
    Cpu,
    /// NVIDIA GPU through CUDA, with device index.
    Cuda(usize),
    /// NVIDIA GPU through `TensorRT`, with device index.
    TensorRt(usize),
    /// Apple `CoreML`.
    CoreMl,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(i) => write!(f, "cuda:{i}"),
            Self::TensorRt(i) => write!(f, "tensorrt:{i}"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (kind, index) = match s.split_once(':') {
            Some((kind, index)) => {
                let index = index
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid device index in '{s}'"))?;
                (kind, index)
            }
            None => (s.as_str(), 0),
        };

        match kind {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(index)),
            "tensorrt" | "trt" => Ok(Self::TensorRt(index)),
            "coreml" | "mps" => Ok(Self::CoreMl),
            _ => Err(format!("Unknown device: {s}")),
        }
    }
}

impl Device {
    /// Register the execution provider for this device on a session builder.
    ///
    /// GPU providers are only compiled in with the matching cargo feature
    /// (`cuda`, `tensorrt`, `coreml`); asking for one that is not compiled in
    /// is a configuration error rather than a silent CPU fallback.
    pub(crate) fn register(&self, builder: SessionBuilder) -> Result<SessionBuilder> {
        match self {
            Self::Cpu => Ok(builder),
            #[cfg(feature = "cuda")]
            Self::Cuda(index) => {
                use ort::execution_providers::CUDAExecutionProvider;
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let provider = CUDAExecutionProvider::default()
                    .with_device_id(*index as i32)
                    .build()
                    .error_on_failure();
                builder.with_execution_providers([provider]).map_err(|e| {
                    InferenceError::ModelLoadError(format!("Failed to register CUDA EP: {e}"))
                })
            }
            #[cfg(feature = "tensorrt")]
            Self::TensorRt(index) => {
                use ort::execution_providers::TensorRTExecutionProvider;
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let provider = TensorRTExecutionProvider::default()
                    .with_device_id(*index as i32)
                    .build()
                    .error_on_failure();
                builder.with_execution_providers([provider]).map_err(|e| {
                    InferenceError::ModelLoadError(format!("Failed to register TensorRT EP: {e}"))
                })
            }
            #[cfg(feature = "coreml")]
            Self::CoreMl => {
                use ort::execution_providers::CoreMLExecutionProvider;
                let provider = CoreMLExecutionProvider::default()
                    .with_subgraphs(true)
                    .build()
                    .error_on_failure();
                builder.with_execution_providers([provider]).map_err(|e| {
                    InferenceError::ModelLoadError(format!("Failed to register CoreML EP: {e}"))
                })
            }
            #[allow(unreachable_patterns)]
            other => Err(InferenceError::ConfigError(format!(
                "device '{other}' requires building with the matching cargo feature"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device() {
        assert_eq!(Device::from_str("cpu").unwrap(), Device::Cpu);
        assert_eq!(Device::from_str("CUDA").unwrap(), Device::Cuda(0));
        assert_eq!(Device::from_str("cuda:1").unwrap(), Device::Cuda(1));
        assert_eq!(Device::from_str("tensorrt:2").unwrap(), Device::TensorRt(2));
        assert_eq!(Device::from_str("mps").unwrap(), Device::CoreMl);
    }

    #[test]
    fn test_parse_invalid_device() {
        assert!(Device::from_str("tpu").is_err());
        assert!(Device::from_str("cuda:x").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for device in [Device::Cpu, Device::Cuda(3), Device::TensorRt(0), Device::CoreMl] {
            assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
        }
    }
}
