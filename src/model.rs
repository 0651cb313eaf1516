/// Trait for implementing inference models that can be used with the InfernumEngine.
///
/// Implementors define the request and response types and the inference
/// logic. The engine moves the model onto its worker thread, so `run` takes
/// `&mut self` and is never called concurrently.
pub trait InfernumModel {
    /// The request type that the model accepts for inference.
    type Request;
    /// The response type that the model returns after inference.
    type Response;
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns a response or error.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

/// Trait for extracting lightweight metadata from inference requests.
///
/// This lets the engine keep what it needs for telemetry (like where a
/// request came from) without cloning the pixel data.
pub trait RequestMetadata {
    /// The lightweight metadata type that represents the request.
    type Metadata: Send + 'static;

    /// Extracts lightweight metadata from the request.
    fn metadata(&self) -> Self::Metadata;
}
