use thiserror::Error;

use crate::image::{DigitImage, IMAGE_SIZE, PixelEncoding};
use crate::model::{InfernumModel, RequestMetadata};
use crate::provider::{
    INPUT_BINDING, InferenceProvider, OUTPUT_BINDING, ShapeError, Tensor, TensorMap,
};

/// Number of classes the classifier scores, one per digit.
pub const NUM_CLASSES: usize = 10;

/// Errors raised while turning an image into a prediction.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("could not frame input tensor: {0}")]
    Frame(#[from] ShapeError),
    #[error("inference provider failed: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("model produced no `{0}` binding")]
    MissingOutput(&'static str),
    #[error("expected one row of 10 scores, model produced shape {0:?}")]
    OutputShape(Vec<usize>),
}

/// A predicted digit together with the scores it was chosen from.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub digit: u8,
    pub scores: Vec<f32>,
}

/// A digit image queued for classification.
pub struct DigitRequest {
    pub image: DigitImage,
    pub encoding: PixelEncoding,
}

/// What the engine remembers about a [`DigitRequest`] for telemetry.
#[derive(Clone, Debug)]
pub struct DigitMetadata {
    pub encoding: PixelEncoding,
    pub ink_coverage: f32,
}

impl RequestMetadata for DigitRequest {
    type Metadata = DigitMetadata;

    fn metadata(&self) -> Self::Metadata {
        DigitMetadata {
            encoding: self.encoding,
            ink_coverage: self.image.ink_coverage(),
        }
    }
}

/// Returns the index of the largest value, or `None` for an empty slice.
///
/// On ties the first index holding the maximum wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let (first, rest) = values.split_first()?;
    let mut best = (0, *first);
    for (i, &value) in rest.iter().enumerate() {
        if value > best.1 {
            best = (i + 1, value);
        }
    }
    Some(best.0)
}

/// Classifies digit images with an [`InferenceProvider`].
pub struct Predictor<P> {
    provider: P,
}

impl<P: InferenceProvider> Predictor<P> {
    pub fn new(provider: P) -> Self {
        for info in provider.inputs() {
            log::info!("Input: {info}");
        }
        for info in provider.outputs() {
            log::info!("Output: {info}");
        }
        Self { provider }
    }

    #[cfg(test)]
    fn provider(&self) -> &P {
        &self.provider
    }

    /// Predicts the digit drawn in `image`.
    pub fn predict(&mut self, image: &DigitImage) -> Result<Prediction, PredictError> {
        let mut inputs = TensorMap::new();
        inputs.insert(INPUT_BINDING.to_string(), frame(image)?);

        let mut outputs = self
            .provider
            .run(inputs)
            .map_err(|e| PredictError::Provider(Box::new(e)))?;

        let output = outputs
            .remove(OUTPUT_BINDING)
            .ok_or(PredictError::MissingOutput(OUTPUT_BINDING))?;

        // a batch of one: either [1, 10] or a bare [10]
        if !matches!(output.shape(), [1, NUM_CLASSES] | [NUM_CLASSES]) {
            return Err(PredictError::OutputShape(output.shape().to_vec()));
        }

        let scores = output.into_data();
        log::info!("Image processed with probabilities: {scores:?}");

        // non-empty, checked above
        let digit = argmax(&scores).unwrap_or_default() as u8;
        log::debug!("Predicted digit {digit}");

        Ok(Prediction { digit, scores })
    }
}

impl<P: InferenceProvider> InfernumModel for Predictor<P> {
    type Request = DigitRequest;
    type Response = Prediction;
    type Error = PredictError;

    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
        self.predict(&request.image)
    }
}

/// Wraps the image into a batch of one single-channel image.
fn frame(image: &DigitImage) -> Result<Tensor, ShapeError> {
    Tensor::new(
        vec![1, 1, IMAGE_SIZE, IMAGE_SIZE],
        image.as_slice().to_vec(),
    )
}
