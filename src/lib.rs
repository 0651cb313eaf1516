//! Handwritten digit classification served over HTTP.
//!
//! A 28x28 grayscale image is framed as a `[1, 1, 28, 28]` tensor, run
//! through a pre-trained network by an [`InferenceProvider`], and reduced to
//! the most likely digit. The model lives on the worker thread of an
//! [`InfernumEngine`]; the [`server`] module exposes it with axum.

pub mod config;
pub mod engine;
pub mod image;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod predictor;
pub mod provider;
pub mod server;

pub use config::{ConfigError, ModelConfig};
pub use engine::{EngineError, InfernumEngine, InfernumEngineResponse, InfernumEngineState};
pub use image::{DigitImage, IMAGE_SIZE, ImageError, PixelEncoding, normalize};
pub use model::{InfernumModel, RequestMetadata};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxError, OnnxProvider};
pub use predictor::{DigitRequest, PredictError, Prediction, Predictor, argmax};
pub use provider::{InferenceProvider, Tensor, TensorInfo, TensorMap};
pub use server::{DigitEngine, ServiceError, router};
