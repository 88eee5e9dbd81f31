//! Web server for hosting the Redraft editing session engine
//!
//! This binary wires the engine together from a YAML configuration file:
//! an OpenAI-compatible completion generator, a filesystem session store,
//! and the HTTP surface. Sessions survive restarts because every mutating
//! operation persists the whole aggregate to disk.

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use std::sync::Arc;

use redraft_core::engine::{EngineConfig, SessionEngine};
use redraft_core::generator::openai::create_generator;
use redraft_core::repository::FsSessionRepository;
use redraft_core::ConfigLoader;
use redraft_server::{shutdown_signal, RedraftServer, ServerConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Redraft Server - AI-assisted content editing sessions")]
struct Cli {
    #[clap(long, short, default_value = "redraft.yaml", help = "Path to the YAML configuration file")]
    config: String,

    #[clap(long, help = "Override the configured bind address")]
    bind_addr: Option<String>,

    #[clap(long, help = "Override the configured session storage directory")]
    storage_dir: Option<String>,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    log::info!("Loading configuration from: {}", cli.config);
    let config = ConfigLoader::from_file(&cli.config).await?;

    let generator = create_generator(&config.generator)?;
    log::info!(
        "Completion generator ready (model: {})",
        config.generator.model
    );

    let storage_dir = cli
        .storage_dir
        .unwrap_or_else(|| config.storage.path.clone());
    let repository = Arc::new(FsSessionRepository::new(storage_dir.clone()).await?);
    log::info!("Session storage at: {}", storage_dir);

    let engine = Arc::new(SessionEngine::new(
        generator,
        repository,
        EngineConfig::from(&config.generator),
    ));

    let bind_addr = cli.bind_addr.unwrap_or_else(|| config.server.bind_addr.clone());
    let server_config = ServerConfig::default()
        .with_bind_addr_str(&bind_addr)?
        .with_cors(config.server.enable_cors);

    let server = RedraftServer::with_config(engine, server_config);
    server.serve_with_shutdown(shutdown_signal()).await?;

    Ok(())
}
