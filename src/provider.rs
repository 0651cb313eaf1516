use std::collections::HashMap;

use thiserror::Error;

/// Name of the input binding the classifier feeds.
pub const INPUT_BINDING: &str = "input";

/// Name of the output binding holding the class scores.
pub const OUTPUT_BINDING: &str = "output";

/// Named tensors passed to, or returned by, an [`InferenceProvider`].
pub type TensorMap = HashMap<String, Tensor>;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("tensor shape {shape:?} holds {expected} values, got {actual}")]
pub struct ShapeError {
    pub shape: Vec<usize>,
    pub expected: usize,
    pub actual: usize,
}

/// A dense, row-major `f32` tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Builds a tensor, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, ShapeError> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(ShapeError {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Dimensions, outermost first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Values in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Consumes the tensor, returning its values.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Description of one model binding, reported for diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorInfo {
    pub name: String,
    pub description: String,
}

impl std::fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

/// A loaded model that maps named input tensors to named output tensors.
///
/// This is the only surface through which the rest of the crate touches an
/// inference runtime.
pub trait InferenceProvider {
    /// The error type returned by the runtime.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Input bindings expected by the model.
    fn inputs(&self) -> Vec<TensorInfo>;

    /// Output bindings produced by the model.
    fn outputs(&self) -> Vec<TensorInfo>;

    /// Runs the model synchronously.
    fn run(&mut self, inputs: TensorMap) -> Result<TensorMap, Self::Error>;
}
