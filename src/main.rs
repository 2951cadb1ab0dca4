mod config;
mod error;
mod memory;
mod platform;
mod server;
mod verify;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::memory::MessageLog;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,webhook_gateway=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Config file is optional: explicit path argument, else ./config.toml if present
    let config_path = std::env::args().nth(1).map(PathBuf::from).or_else(|| {
        let default = PathBuf::from("config.toml");
        default.exists().then_some(default)
    });

    match &config_path {
        Some(path) => info!("Loading configuration from: {}", path.display()),
        None => info!("No config file, using environment and defaults"),
    }
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;
    config.validate()?;

    for name in config.insecure_defaults() {
        warn!(
            "!!! {} is using its built-in default value. Do NOT run like this in production !!!",
            name
        );
    }

    info!("Configuration loaded successfully");
    info!("  Listen: {}", config.bind_addr());

    let log = MessageLog::new();
    server::serve(&config, log).await?;

    Ok(())
}
