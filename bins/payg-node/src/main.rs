//! payg sync node binary.
//!
//! Keeps the local channel ledger in step with the channel contract: applies
//! contract events as they arrive, reconciles against the channel index on a
//! fixed interval, and serves JSON-RPC queries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use payg_node_lib::{start_rpc_server, Node, NodeConfig};
use tracing::info;

/// payg channel sync node.
#[derive(Parser, Debug)]
#[command(
    name = "payg-node",
    version,
    about = "Payment channel sync node with RocksDB storage and JSON-RPC server"
)]
struct Args {
    /// Data directory for channel storage and config
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to <data-dir>/payg.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// RPC server bind address
    #[arg(long)]
    rpc_bind: Option<String>,

    /// RPC server port
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Contract gateway JSON-RPC endpoint
    #[arg(long)]
    chain_url: Option<String>,

    /// Channel index GraphQL endpoint
    #[arg(long)]
    index_url: Option<String>,

    /// Seconds between reconciliation sweeps
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// First block to read events from when no cursor is stored
    #[arg(long)]
    start_block: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Args {
    /// Load the layered config, then apply CLI overrides on top.
    fn into_config(self) -> Result<(NodeConfig, String)> {
        let data_dir = self
            .data_dir
            .unwrap_or_else(payg_node_lib::config::default_data_dir);
        let file = self
            .config
            .unwrap_or_else(|| NodeConfig::default_file(&data_dir));

        let mut config = NodeConfig::load(Some(&file))
            .with_context(|| format!("failed to load config from {}", file.display()))?;
        config.data_dir = data_dir;

        if let Some(bind) = self.rpc_bind {
            config.rpc_bind = bind;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(url) = self.chain_url {
            config.chain_url = url;
        }
        if let Some(url) = self.index_url {
            config.index_url = url;
        }
        if let Some(secs) = self.sweep_interval {
            config.sweep_interval_secs = secs;
        }
        if let Some(block) = self.start_block {
            config.event_start_block = block;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.validate().context("invalid configuration")?;

        Ok((config, self.log_format))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, log_format) = Args::parse().into_config()?;

    init_logging(&config.log_level, &log_format);

    info!("payg node v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);
    info!("rpc_addr: {}", config.rpc_addr());
    info!("chain_url: {}", config.chain_url);
    info!("index_url: {}", config.index_url);
    info!("sweep_interval_secs: {}", config.sweep_interval_secs);

    std::fs::create_dir_all(&config.data_dir).context("failed to create data_dir")?;

    let node = Node::new(config.clone())
        .await
        .context("failed to start node")?;
    info!("Node initialized");

    let rpc_handle = start_rpc_server(&config.rpc_addr(), node.clone())
        .await
        .context("failed to start RPC server")?;
    info!("RPC server listening on {}", config.rpc_addr());

    info!("payg node running (Ctrl+C to stop)");

    tokio::select! {
        stats = node.run() => {
            info!(?stats, "sync engine exited");
        }
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            info!("received Ctrl+C, shutting down...");
        }
    }

    rpc_handle.stop().ok();
    info!("RPC server stopped");
    info!("payg node shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
