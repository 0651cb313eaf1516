//! ONNX models executed with `tract-onnx`.

use std::path::Path;

use thiserror::Error;
use tract_onnx::prelude::*;

use crate::image::IMAGE_SIZE;
use crate::provider::{
    INPUT_BINDING, InferenceProvider, OUTPUT_BINDING, Tensor, TensorInfo, TensorMap,
};

/// Shape of the input tensor: one single-channel 28x28 image.
const INPUT_SHAPE: [usize; 4] = [1, 1, IMAGE_SIZE, IMAGE_SIZE];

#[derive(Debug, Error)]
pub enum OnnxError {
    #[error("failed to load model from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("missing input binding `{0}`")]
    MissingInput(String),
    #[error("unexpected input bindings: {0:?}")]
    UnexpectedInputs(Vec<String>),
    #[error("input `{name}` has shape {actual:?}, model expects {expected:?}")]
    InputShape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("model produced {actual} outputs, expected {expected}")]
    OutputCount { expected: usize, actual: usize },
    #[error(transparent)]
    Runtime(#[from] TractError),
}

/// A single-input, single-output ONNX model.
///
/// The graph input is bound to `"input"` and the graph output to `"output"`;
/// loading fails when the model does not use those names.
pub struct OnnxProvider {
    plan: TypedRunnableModel<TypedModel>,
}

impl OnnxProvider {
    /// Loads, optimizes and prepares the model stored at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OnnxError> {
        let path = path.as_ref();
        let load_err = |e: TractError| OnnxError::Load {
            path: path.display().to_string(),
            reason: format!("{e:#}"),
        };

        log::debug!("Loading ONNX model from {}", path.display());

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_names([INPUT_BINDING]))
            .and_then(|model| model.with_output_names([OUTPUT_BINDING]))
            .and_then(|model| {
                let fact =
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 1, IMAGE_SIZE, IMAGE_SIZE));
                model.with_input_fact(0, fact)
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(load_err)?;

        log::info!("Created ONNX session for {}", path.display());

        Ok(Self { plan })
    }

    fn describe(&self, outlets: &[OutletId]) -> Vec<TensorInfo> {
        let model = self.plan.model();
        outlets
            .iter()
            .map(|outlet| TensorInfo {
                name: model.node(outlet.node).name.clone(),
                description: model
                    .outlet_fact(*outlet)
                    .map(|fact| format!("{fact:?}"))
                    .unwrap_or_else(|e| format!("unknown ({e})")),
            })
            .collect()
    }
}

impl InferenceProvider for OnnxProvider {
    type Error = OnnxError;

    fn inputs(&self) -> Vec<TensorInfo> {
        self.describe(self.plan.model().input_outlets().unwrap_or(&[]))
    }

    fn outputs(&self) -> Vec<TensorInfo> {
        self.describe(self.plan.model().output_outlets().unwrap_or(&[]))
    }

    fn run(&mut self, mut inputs: TensorMap) -> Result<TensorMap, Self::Error> {
        let input = inputs
            .remove(INPUT_BINDING)
            .ok_or_else(|| OnnxError::MissingInput(INPUT_BINDING.to_string()))?;
        if !inputs.is_empty() {
            return Err(OnnxError::UnexpectedInputs(inputs.into_keys().collect()));
        }
        if input.shape() != INPUT_SHAPE.as_slice() {
            return Err(OnnxError::InputShape {
                name: INPUT_BINDING.to_string(),
                expected: INPUT_SHAPE.to_vec(),
                actual: input.shape().to_vec(),
            });
        }

        let tensor = tract_onnx::prelude::Tensor::from_shape(input.shape(), input.data())?;
        let outputs = self.plan.run(tvec!(tensor.into()))?;

        let [output] = outputs.as_slice() else {
            return Err(OnnxError::OutputCount {
                expected: 1,
                actual: outputs.len(),
            });
        };

        let scores = Tensor::new(output.shape().to_vec(), output.as_slice::<f32>()?.to_vec())
            .map_err(|e| OnnxError::Runtime(TractError::msg(e)))?;

        let mut result = TensorMap::new();
        result.insert(OUTPUT_BINDING.to_string(), scores);
        Ok(result)
    }
}
