use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use homecloud::{config::LoggingConfig, Config, FileStore, Server, StorageTracker};

#[derive(Parser)]
#[command(name = "homecloud")]
#[command(about = "HomeCloud - personal file server with live storage accounting")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path (TOML); environment variables still override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::from_env().await?,
    };

    init_tracing(&config.logging);
    info!("Starting HomeCloud server...");

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("Server will listen on: {}:{}", config.server.host, config.server.port);

    let (tracker, tasks) = StorageTracker::start(&config.storage, &config.watcher)
        .await
        .map_err(|e| {
            error!("Failed to start storage tracker: {}", e);
            e
        })?;

    let server = Server::new(config, FileStore::new(tracker)).await?;
    let result = server.run().await;

    tasks.abort();
    result?;

    info!("HomeCloud server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("homecloud=debug,{}", logging.level)));

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
