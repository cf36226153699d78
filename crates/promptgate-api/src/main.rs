//! Binary entrypoint for the promptgate API server.
use promptgate_api::{run, AppState};
use promptgate_stages::{PipelineServices, ServerConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // PROMPTGATE_CONFIG points at a YAML snapshot; without it the server runs
    // with an empty catalog and in-memory sessions
    let config = match std::env::var("PROMPTGATE_CONFIG") {
        Ok(path) => ServerConfig::load(path)?,
        Err(_) => {
            tracing::warn!("PROMPTGATE_CONFIG not set, using default configuration");
            ServerConfig::default()
        }
    };
    let services = Arc::new(PipelineServices::from_config(config)?);
    tracing::info!(fingerprint = services.config_fingerprint(), "services wired");

    let addr = std::env::var("PROMPTGATE_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
    run(&addr, AppState::new(services)?).await
}
