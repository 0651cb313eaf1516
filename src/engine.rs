use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::model::{InfernumModel, RequestMetadata};

/// Represents the current state of the inference engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InfernumEngineState {
    /// The engine is idle and ready to accept new inference requests.
    Idle,
    /// The engine is currently processing an inference request.
    Processing,
}

impl InfernumEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfernumEngineState::Idle => "idle",
            InfernumEngineState::Processing => "processing",
        }
    }
}

/// Errors returned by [`InfernumEngine::infer`].
#[derive(Debug, Error)]
pub enum EngineError<E: std::error::Error + 'static> {
    /// The engine was stopped, or its worker is gone.
    #[error("inference engine is stopped")]
    Stopped,
    /// No reply arrived within the configured timeout.
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    /// The model panicked while handling this request.
    #[error("inference panicked")]
    Panicked,
    /// The model returned an error for this request.
    #[error(transparent)]
    Model(E),
}

/// Response returned by the engine containing both the model's response and telemetry data.
#[derive(Debug)]
pub struct InfernumEngineResponse<Metadata, Res> {
    /// Unique identifier of the request.
    pub id: u64,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Time spent inside the model.
    pub duration: Duration,
    /// Lightweight metadata extracted from the original request.
    pub request_metadata: Metadata,
    /// The actual response from the model.
    pub response: Res,
}

type EngineResponse<M> = InfernumEngineResponse<
    <<M as InfernumModel>::Request as RequestMetadata>::Metadata,
    <M as InfernumModel>::Response,
>;

type EngineResult<M> = Result<EngineResponse<M>, EngineError<<M as InfernumModel>::Error>>;

struct InfernumEngineRequest<M: InfernumModel>
where
    M::Request: RequestMetadata,
{
    id: u64,
    request: M::Request,
    reply: oneshot::Sender<EngineResult<M>>,
}

/// Runs a model on a dedicated worker thread.
///
/// The worker owns the model, so requests are served one at a time in the
/// order they were submitted. Callers await their own reply. A failing or
/// panicking request only affects its own caller.
pub struct InfernumEngine<M: InfernumModel + Send + 'static>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    state: Arc<Mutex<InfernumEngineState>>,
    req_tx: Option<mpsc::Sender<InfernumEngineRequest<M>>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
    served: Arc<AtomicU64>,
    timeout: Option<Duration>,
}

impl<M: InfernumModel + Send + 'static> InfernumEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    /// Creates a new inference engine with the given model.
    ///
    /// The model is moved to a background thread that serves requests until
    /// the engine is stopped or dropped.
    pub fn new(mut model: M) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<InfernumEngineRequest<M>>();
        let state = Arc::new(Mutex::new(InfernumEngineState::Idle));
        let served = Arc::new(AtomicU64::new(0));

        let inference_handle = std::thread::spawn({
            let state = state.clone();
            let served = served.clone();
            move || {
                while let Ok(InfernumEngineRequest { id, request, reply }) = req_rx.recv() {
                    if reply.is_closed() {
                        log::debug!("Skipping inference {id}, caller went away");
                        continue;
                    }

                    let request_metadata = request.metadata();

                    set_state(&state, InfernumEngineState::Processing);
                    let start_time = Instant::now();

                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| model.run(request)));

                    let duration = start_time.elapsed();
                    set_state(&state, InfernumEngineState::Idle);
                    served.fetch_add(1, Ordering::Relaxed);

                    let result = match outcome {
                        Ok(Ok(response)) => {
                            log::debug!("Inference {id} completed in {duration:?}");
                            Ok(InfernumEngineResponse {
                                id,
                                start_time,
                                duration,
                                request_metadata,
                                response,
                            })
                        }
                        Ok(Err(e)) => {
                            log::error!("Inference {id} failed: {e}");
                            Err(EngineError::Model(e))
                        }
                        Err(_) => {
                            log::error!("Inference {id} panicked");
                            Err(EngineError::Panicked)
                        }
                    };

                    if reply.send(result).is_err() {
                        log::warn!("Inference {id} finished after its caller gave up");
                    }
                }
                log::debug!("Inference worker shutting down");
            }
        });

        Self {
            state,
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: AtomicU64::new(0),
            served,
            timeout: None,
        }
    }

    /// Bounds how long [`infer`](Self::infer) waits for a reply.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> InfernumEngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of requests the worker has run so far, failed ones included.
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Queues `request` and waits for the model's reply.
    pub async fn infer(&self, request: M::Request) -> EngineResult<M> {
        let tx = self.req_tx.as_ref().ok_or(EngineError::Stopped)?;

        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(InfernumEngineRequest {
            id,
            request,
            reply: reply_tx,
        })
        .map_err(|_| EngineError::Stopped)?;

        log::debug!("Scheduled inference {id}");

        let reply = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, reply_rx).await.map_err(|_| {
                log::warn!("Inference {id} timed out after {limit:?}");
                EngineError::Timeout(limit)
            })?,
            None => reply_rx.await,
        };

        reply.map_err(|_| EngineError::Stopped)?
    }

    /// Stops the inference engine and shuts down the background thread.
    ///
    /// Requests already queued are still served before the worker exits.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            let _ = handle.join();
        }
    }
}

impl<M: InfernumModel + Send + 'static> Drop for InfernumEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_state(state: &Mutex<InfernumEngineState>, value: InfernumEngineState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("negative input {0}")]
    struct NegativeInput(i32);

    struct Doubler {
        delay: Duration,
    }

    struct Number(i32);

    impl RequestMetadata for Number {
        type Metadata = i32;

        fn metadata(&self) -> i32 {
            self.0
        }
    }

    impl InfernumModel for Doubler {
        type Request = Number;
        type Response = i32;
        type Error = NegativeInput;

        fn run(&mut self, request: Number) -> Result<i32, NegativeInput> {
            std::thread::sleep(self.delay);
            match request.0 {
                0 => panic!("zero is not allowed"),
                n if n < 0 => Err(NegativeInput(n)),
                n => Ok(n * 2),
            }
        }
    }

    fn engine() -> InfernumEngine<Doubler> {
        InfernumEngine::new(Doubler {
            delay: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn infer_returns_response_with_telemetry() {
        let engine = engine();
        let first = engine.infer(Number(21)).await.unwrap();
        let second = engine.infer(Number(4)).await.unwrap();

        assert_eq!(first.response, 42);
        assert_eq!(first.request_metadata, 21);
        assert_eq!(second.response, 8);
        assert!(second.id > first.id);
        assert_eq!(engine.served(), 2);
        assert_eq!(engine.state(), InfernumEngineState::Idle);
    }

    #[tokio::test]
    async fn model_errors_do_not_stop_the_worker() {
        let engine = engine();
        assert!(matches!(
            engine.infer(Number(-3)).await,
            Err(EngineError::Model(NegativeInput(-3)))
        ));
        assert!(matches!(
            engine.infer(Number(0)).await,
            Err(EngineError::Panicked)
        ));
        assert_eq!(engine.infer(Number(5)).await.unwrap().response, 10);
    }

    #[tokio::test]
    async fn infer_times_out() {
        let engine = InfernumEngine::new(Doubler {
            delay: Duration::from_millis(200),
        })
        .with_timeout(Some(Duration::from_millis(20)));

        assert!(matches!(
            engine.infer(Number(1)).await,
            Err(EngineError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn stopped_engine_rejects_requests() {
        let mut engine = engine();
        engine.stop();
        assert!(matches!(
            engine.infer(Number(1)).await,
            Err(EngineError::Stopped)
        ));
    }

    #[test]
    fn state_names() {
        assert_eq!(InfernumEngineState::Idle.as_str(), "idle");
        assert_eq!(InfernumEngineState::Processing.as_str(), "processing");
    }
}
