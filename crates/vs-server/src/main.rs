//! VeSync cloud API mock
//!
//! Main entry point: loads `mock.yaml`, builds the engine and serves it.
//!
//! Environment:
//! - `VESYNC_MOCK_CONFIG` - path to the config file (default `config/mock.yaml`)
//! - `VESYNC_MOCK_BIND` - listen address, overriding `server.bind`
//! - `RUST_LOG` - log filter (default `info`)

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vs_api::{start_server, AppState, Engine};
use vs_config::MockConfig;

const DEFAULT_CONFIG: &str = "config/mock.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting VeSync mock {}", env!("CARGO_PKG_VERSION"));

    let config_path =
        std::env::var("VESYNC_MOCK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let config = MockConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path))?;
    let engine = Engine::from_config(&config).context("invalid endpoint specs")?;

    let bind = std::env::var("VESYNC_MOCK_BIND").unwrap_or_else(|_| config.server.bind.clone());

    tokio::select! {
        result = start_server(AppState::new(engine), &bind) => {
            result.with_context(|| format!("server on {} failed", bind))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}
