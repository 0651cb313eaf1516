use std::{sync::Arc, time::Duration};

use infernum_mnist::{
    InferenceProvider, InfernumEngine, Predictor, Tensor, TensorInfo, TensorMap, normalize, router,
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("mock runtime refused the image")]
struct MockError;

#[derive(Clone, Copy)]
enum Behavior {
    /// One-hot scores for `round(sum of pixels) % 10`, failing on negative pixels.
    PixelSum,
    /// Produces the given number of scores.
    Scores(usize),
    /// Produces nothing under `"output"`.
    NoOutput,
    /// Sleeps before answering.
    Slow(Duration),
}

struct MockProvider(Behavior);

impl InferenceProvider for MockProvider {
    type Error = MockError;

    fn inputs(&self) -> Vec<TensorInfo> {
        vec![TensorInfo {
            name: "input".to_string(),
            description: "f32 [1, 1, 28, 28]".to_string(),
        }]
    }

    fn outputs(&self) -> Vec<TensorInfo> {
        vec![TensorInfo {
            name: "output".to_string(),
            description: "f32 [1, 10]".to_string(),
        }]
    }

    fn run(&mut self, inputs: TensorMap) -> Result<TensorMap, MockError> {
        let input = &inputs["input"];
        assert_eq!(input.shape(), &[1, 1, 28, 28]);

        let scores = match self.0 {
            Behavior::PixelSum => {
                if input.data().iter().any(|&p| p < 0.0) {
                    return Err(MockError);
                }
                let sum: f32 = input.data().iter().sum();
                let mut scores = vec![0.0; 10];
                scores[sum.round() as usize % 10] = 1.0;
                scores
            }
            Behavior::Scores(n) => vec![0.1; n],
            Behavior::NoOutput => return Ok(TensorMap::new()),
            Behavior::Slow(delay) => {
                std::thread::sleep(delay);
                vec![0.1; 10]
            }
        };

        let mut outputs = TensorMap::new();
        let tensor = Tensor::new(vec![1, scores.len()], scores).unwrap();
        outputs.insert("output".to_string(), tensor);
        Ok(outputs)
    }
}

async fn spawn_server(behavior: Behavior, timeout: Option<Duration>) -> String {
    let engine = InfernumEngine::new(Predictor::new(MockProvider(behavior))).with_timeout(timeout);
    let app = router(Arc::new(engine));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

async fn post(base: &str, path: &str, body: &Value) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(format!("{base}{path}"))
        .json(body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

fn int_image(value: i64) -> Vec<Vec<i64>> {
    vec![vec![value; 28]; 28]
}

/// A 28x28 image whose pixels sum to `digit` once normalized.
fn float_digit(digit: usize) -> Vec<Vec<f32>> {
    let mut rows = vec![vec![0.0f32; 28]; 28];
    for pixel in rows.iter_mut().flatten().take(digit) {
        *pixel = 1.0;
    }
    rows
}

#[tokio::test]
async fn float_endpoint_returns_bare_digit() {
    let base = spawn_server(Behavior::PixelSum, None).await;

    for digit in [0, 3, 7, 9] {
        let (status, body) = post(&base, "/float", &json!(float_digit(digit))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(digit));
    }
}

#[tokio::test]
async fn int_endpoint_matches_float_endpoint_on_normalized_image() {
    let base = spawn_server(Behavior::PixelSum, None).await;

    let mut image = int_image(0);
    image[0][..5].fill(255);
    image[10][3] = 128;
    image[20][20] = 127;

    let (int_status, int_body) = post(&base, "/int", &json!(image)).await;
    let (float_status, float_body) = post(&base, "/float", &json!(normalize(&image))).await;

    assert_eq!(int_status, StatusCode::OK);
    assert_eq!(float_status, StatusCode::OK);
    assert_eq!(int_body, float_body);
    assert_eq!(int_body, json!(6));
}

#[tokio::test]
async fn wrong_dimensions_are_client_errors() {
    let base = spawn_server(Behavior::PixelSum, None).await;

    let bodies = [
        json!(vec![vec![0.0; 28]; 27]),
        json!(vec![vec![0.0; 27]; 28]),
        json!([]),
        json!([[0.5]]),
    ];
    for body in &bodies {
        let (status, reply) = post(&base, "/float", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(reply["error"].as_str().unwrap().starts_with("malformed input"));
    }

    let (status, _) = post(&base, "/int", &json!(vec![vec![0; 29]; 28])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // still serving
    let (status, body) = post(&base, "/float", &json!(float_digit(2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(2));
}

#[tokio::test]
async fn undecodable_bodies_are_client_errors() {
    let base = spawn_server(Behavior::PixelSum, None).await;

    let (status, _) = post(&base, "/int", &json!(vec![vec![0.5; 28]; 28])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&base, "/float", &json!({ "image": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = reqwest::Client::new()
        .post(format!("{base}/float"))
        .header("content-type", "application/json")
        .body("[[0.0, 0.1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn out_of_range_intensities_are_rejected() {
    let base = spawn_server(Behavior::PixelSum, None).await;

    for value in [-1, 256] {
        let mut image = int_image(0);
        image[3][4] = value;
        let (status, reply) = post(&base, "/int", &json!(image)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reply["error"].as_str().unwrap().contains("pixel (3, 4)"));
    }
}

#[tokio::test]
async fn provider_failure_does_not_affect_later_requests() {
    let base = spawn_server(Behavior::PixelSum, None).await;

    let mut poisoned = float_digit(1);
    poisoned[5][5] = -1.0;
    let (status, reply) = post(&base, "/float", &json!(poisoned)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply["error"].as_str().unwrap().starts_with("inference failed"));

    let (status, body) = post(&base, "/float", &json!(float_digit(4))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(4));

    let (status, body) = post(&base, "/int", &json!(int_image(0))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(0));
}

#[tokio::test]
async fn bad_model_output_is_a_server_error() {
    for behavior in [Behavior::Scores(9), Behavior::Scores(11), Behavior::NoOutput] {
        let base = spawn_server(behavior, None).await;
        let (status, _) = post(&base, "/float", &json!(float_digit(0))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

#[tokio::test]
async fn slow_inference_times_out() {
    let base = spawn_server(
        Behavior::Slow(Duration::from_millis(300)),
        Some(Duration::from_millis(30)),
    )
    .await;

    let (status, reply) = post(&base, "/int", &json!(int_image(10))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply["error"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn concurrent_requests_are_all_answered() {
    let base = spawn_server(Behavior::PixelSum, None).await;

    let requests = (0..10).map(|digit| {
        let base = base.clone();
        async move {
            let (status, body) = post(&base, "/float", &json!(float_digit(digit))).await;
            (digit, status, body)
        }
    });

    for (digit, status, body) in join_all(requests).await {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(digit));
    }
}

#[tokio::test]
async fn status_reports_served_requests() {
    let base = spawn_server(Behavior::PixelSum, None).await;
    post(&base, "/float", &json!(float_digit(1))).await;

    let status: Value = reqwest::get(format!("{base}/")).await.unwrap().json().await.unwrap();
    assert_eq!(status, json!({ "status": "idle", "served": 1 }));
}

async fn join_all<F, T>(futures: impl IntoIterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}
