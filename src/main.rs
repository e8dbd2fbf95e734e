// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use multimodal_rag_node::{
    api::start_server,
    config::{bootstrap_collections, build_pipeline, NodeConfig},
    version,
};
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Multimodal RAG node
#[derive(Parser, Debug)]
#[command(name = "mmrag-node", version = version::VERSION_NUMBER)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "MMRAG_CONFIG", default_value = "mmrag.toml")]
    config: PathBuf,

    /// Override the listen address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting {}", version::get_version_string());

    let mut config = if cli.config.exists() {
        NodeConfig::from_file(&cli.config)?
    } else {
        tracing::warn!(
            "Config file {} not found, using defaults",
            cli.config.display()
        );
        NodeConfig::default()
    };
    config.apply_env();
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    let pipeline = Arc::new(build_pipeline(&config)?);
    bootstrap_collections(&pipeline, &config).await?;

    let health = pipeline.health().await;
    if !health.healthy() {
        tracing::warn!("Some backends are not ready yet: {:?}", health);
    }

    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind))?;

    start_server(pipeline, addr, config.max_body_bytes, async {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
    })
    .await?;

    tracing::info!("Node stopped");
    Ok(())
}
