use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "captcha-authz-cli")]
#[command(about = "Operator CLI for the reCAPTCHA authorization service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service health, breaker state and cache counters
    Health,
    /// Show breaker and cache counters
    Metrics,
    /// Ask the service for a decision on a token
    Check {
        /// Captcha token to evaluate
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_json(res).await?;
        }
        Commands::Metrics => {
            let res = client.get(format!("{}/metrics", cli.url)).send().await?;
            print_json(res).await?;
        }
        Commands::Check { token } => {
            let mut headers = HeaderMap::new();
            headers.insert("x-recaptcha-token", HeaderValue::from_str(&token)?);
            let res = client
                .post(format!("{}/authz", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_decision(res).await?;
        }
    }

    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// 403 is a decision, not an error.
async fn print_decision(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    for name in ["x-recaptcha-status", "x-recaptcha-score", "x-recaptcha-cache"] {
        if let Some(value) = res.headers().get(name).and_then(|v| v.to_str().ok()) {
            println!("{}: {}", name, value);
        }
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !text.is_empty() => println!("{}", text),
        Err(_) => {}
    }

    if !(status.is_success() || status == reqwest::StatusCode::FORBIDDEN) {
        eprintln!("Error: service returned status {}", status);
    }
    Ok(())
}
