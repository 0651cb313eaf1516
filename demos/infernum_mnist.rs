use argh::FromArgs;
use infernum_mnist::{InfernumEngine, ModelConfig, OnnxProvider, Predictor, config, router};
use std::{path::PathBuf, sync::Arc};

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Serves handwritten digit predictions from an ONNX model.
struct InfernumArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// path to the ONNX model (defaults to $INFERNUM_MODEL_PATH or models/mnist.onnx)
    #[argh(option, short = 'm', default = "config::default_model_path()")]
    model: PathBuf,

    /// inference timeout in milliseconds, 0 to wait indefinitely
    #[argh(option, short = 't', default = "0")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: InfernumArgs = argh::from_env();

    let config = ModelConfig::new(args.model).with_timeout_ms(args.timeout_ms);
    config.validate()?;

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let provider = OnnxProvider::load(&config.model_path)?;
    let engine = InfernumEngine::new(Predictor::new(provider)).with_timeout(config.inference_timeout);
    let app = router(Arc::new(engine));

    log::info!("Starting the server with model {}", config.model_path.display());
    log::info!("Listening on: {}", addr);
    log::info!("Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
