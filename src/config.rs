use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

/// Environment variable consulted for the model path when none is given.
pub const MODEL_PATH_ENV: &str = "INFERNUM_MODEL_PATH";

/// Model path used when neither a flag nor the environment names one.
pub const DEFAULT_MODEL_PATH: &str = "models/mnist.onnx";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("model file {0} does not exist")]
    ModelNotFound(PathBuf),
    #[error("model path {0} is not a file")]
    NotAFile(PathBuf),
}

/// Settings read once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
    /// Location of the serialized ONNX model.
    pub model_path: PathBuf,
    /// Upper bound on a single inference, `None` to wait indefinitely.
    pub inference_timeout: Option<Duration>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            inference_timeout: None,
        }
    }
}

impl ModelConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            inference_timeout: None,
        }
    }

    /// Sets the timeout from milliseconds, where `0` disables it.
    pub fn with_timeout_ms(mut self, millis: u64) -> Self {
        self.inference_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        self
    }

    /// Checks that the model path points to an existing file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let path: &Path = &self.model_path;
        if !path.exists() {
            return Err(ConfigError::ModelNotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(ConfigError::NotAFile(path.to_path_buf()));
        }
        Ok(())
    }
}

/// The model path from [`MODEL_PATH_ENV`], falling back to [`DEFAULT_MODEL_PATH`].
pub fn default_model_path() -> PathBuf {
    std::env::var_os(MODEL_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH))
}
