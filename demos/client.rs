use argh::FromArgs;
use std::path::PathBuf;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Client that asks the server which digit an image shows
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "float", "int" or "status"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Float(FloatCommand),
    Int(IntCommand),
    Status(StatusCommand),
}

#[derive(FromArgs)]
/// Predict a digit from a JSON file holding 28x28 floats in [0, 1]
#[argh(subcommand, name = "float")]
struct FloatCommand {
    /// the path to the JSON image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Predict a digit from a JSON file holding 28x28 integers in 0..=255
#[argh(subcommand, name = "int")]
struct IntCommand {
    /// the path to the JSON image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Show the engine status
#[argh(subcommand, name = "status")]
struct StatusCommand {}

fn read_image(path: &PathBuf) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let response = match args.command {
        ClientCommands::Float(command) => {
            client
                .post(format!("http://{}/float", addr))
                .json(&read_image(&command.image_path)?)
                .send()
                .await?
        }
        ClientCommands::Int(command) => {
            client
                .post(format!("http://{}/int", addr))
                .json(&read_image(&command.image_path)?)
                .send()
                .await?
        }
        ClientCommands::Status(_) => client.get(format!("http://{}/", addr)).send().await?,
    };

    let status = response.status();
    let result = response.json::<serde_json::Value>().await?;
    println!("{}: {}", status, serde_json::to_string_pretty(&result)?);

    Ok(())
}
