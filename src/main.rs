use anyhow::{Context, Result};
use reqwest::Method;

use apigee_client::config::Config;
use apigee_client::{ApiError, ApigeeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(bundle = ?config.bundle, "Configuration loaded");

    // Resolve credentials before touching the network
    let client = match ApigeeClient::new(&config.bundle, &config.http) {
        Ok(client) => client,
        Err(ApiError::ConfigError(msg)) => {
            tracing::error!("❌ Invalid configuration: {}", msg);
            anyhow::bail!("Invalid configuration: {}", msg);
        }
        Err(e) => return Err(e.into()),
    };

    let method: Method = config
        .request
        .method
        .parse()
        .with_context(|| format!("Invalid HTTP method: {}", config.request.method))?;

    let body = config
        .request
        .data
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--data must be valid JSON")?;

    match client.request(method, &config.request.path, body.as_ref()).await {
        Ok(response) => {
            tracing::info!(status = %response.status, "✅ Request completed");
            match response.json::<serde_json::Value>() {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => println!("{}", response.text()),
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(retryable = e.is_retryable(), "❌ Request failed: {}", e);
            Err(e.into())
        }
    }
}
