//! HTTP surface of the classifier.
//!
//! | Method | Path     | Body                       | Reply                 |
//! |--------|----------|----------------------------|-----------------------|
//! | POST   | `/float` | 28x28 floats in `[0, 1]`   | predicted digit       |
//! | POST   | `/int`   | 28x28 integers in `0..=255`| predicted digit       |
//! | GET    | `/`      |                            | engine status         |
//!
//! Malformed bodies are answered with `400`, inference failures with `500`,
//! both carrying `{"error": "..."}`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::engine::{EngineError, InfernumEngine};
use crate::image::{DigitImage, ImageError, PixelEncoding};
use crate::predictor::{DigitRequest, Predictor};
use crate::provider::InferenceProvider;

/// The engine type served by the router.
pub type DigitEngine<P> = InfernumEngine<Predictor<P>>;

/// Errors reported to HTTP clients.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request body does not describe a valid 28x28 image.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// The model could not produce a prediction.
    #[error("inference failed: {0}")]
    InferenceFailure(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::InferenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ImageError> for ServiceError {
    fn from(e: ImageError) -> Self {
        ServiceError::MalformedInput(e.to_string())
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(e: JsonRejection) -> Self {
        ServiceError::MalformedInput(e.body_text())
    }
}

impl<E: std::error::Error + 'static> From<EngineError<E>> for ServiceError {
    fn from(e: EngineError<E>) -> Self {
        ServiceError::InferenceFailure(e.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::debug!("{self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    served: u64,
}

/// Builds the router serving predictions from `engine`.
pub fn router<P>(engine: Arc<DigitEngine<P>>) -> Router
where
    P: InferenceProvider + Send + 'static,
{
    Router::new()
        .route("/", get(get_status::<P>))
        .route("/float", post(post_float::<P>))
        .route("/int", post(post_int::<P>))
        .with_state(engine)
}

async fn get_status<P>(State(engine): State<Arc<DigitEngine<P>>>) -> Json<StatusResponse>
where
    P: InferenceProvider + Send + 'static,
{
    Json(StatusResponse {
        status: engine.state().as_str(),
        served: engine.served(),
    })
}

async fn post_float<P>(
    State(engine): State<Arc<DigitEngine<P>>>,
    payload: Result<Json<Vec<Vec<f32>>>, JsonRejection>,
) -> Result<Json<u8>, ServiceError>
where
    P: InferenceProvider + Send + 'static,
{
    let Json(rows) = payload?;
    let image = DigitImage::from_rows(&rows)?;
    predict(&engine, image, PixelEncoding::Float).await
}

async fn post_int<P>(
    State(engine): State<Arc<DigitEngine<P>>>,
    payload: Result<Json<Vec<Vec<i64>>>, JsonRejection>,
) -> Result<Json<u8>, ServiceError>
where
    P: InferenceProvider + Send + 'static,
{
    let Json(rows) = payload?;
    let image = DigitImage::from_intensities(&rows)?;
    predict(&engine, image, PixelEncoding::Int).await
}

async fn predict<P>(
    engine: &DigitEngine<P>,
    image: DigitImage,
    encoding: PixelEncoding,
) -> Result<Json<u8>, ServiceError>
where
    P: InferenceProvider + Send + 'static,
{
    let reply = engine.infer(DigitRequest { image, encoding }).await?;

    log::info!(
        "Processed {} image #{} with result {} in {:?} (ink coverage {:.2})",
        reply.request_metadata.encoding.as_str(),
        reply.id,
        reply.response.digit,
        reply.duration,
        reply.request_metadata.ink_coverage,
    );

    Ok(Json(reply.response.digit))
}
