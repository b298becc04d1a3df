use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "uni-api", about = "Unified OpenAI-compatible LLM gateway")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "API_YAML_PATH", default_value = "./api.yaml")]
    config: PathBuf,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = uniapi_core::load_config(&cli.config).await?;
    info!(
        event = "config_loaded",
        providers = config.providers.len(),
        api_keys = config.api_keys.len(),
    );

    let state = Arc::new(uniapi_core::AppState::from_config(config)?);
    let app = uniapi_router::gateway_router(state);

    let bind = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(event = "listening", bind = %bind);
    axum::serve(listener, app).await?;
    Ok(())
}
