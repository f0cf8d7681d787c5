//! Node configuration for the payg sync node.
//!
//! [`NodeConfig`] carries defaults for every field. [`NodeConfig::load`]
//! layers an optional TOML file and `PAYG_*` environment variables on top of
//! those defaults; CLI flags are applied by the binary afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use payg_core::constants::{
    DEFAULT_EVENT_POLL_INTERVAL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RPC_PORT,
    DEFAULT_SWEEP_INTERVAL_SECS,
};

/// Name of the config file looked up in the data directory.
pub const CONFIG_FILE_NAME: &str = "payg.toml";

/// Prefix for environment overrides (`PAYG_CHAIN_URL`, ...).
pub const ENV_PREFIX: &str = "PAYG";

/// Configuration for a sync node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// IP address for the JSON-RPC server to bind to.
    pub rpc_bind: String,
    /// Port for the JSON-RPC server.
    pub rpc_port: u16,
    /// Log level filter string (e.g. "info", "debug", "payg_sync=trace").
    pub log_level: String,
    /// JSON-RPC endpoint of the contract gateway.
    pub chain_url: String,
    /// GraphQL endpoint of the authoritative channel index.
    pub index_url: String,
    /// Seconds between reconciliation sweeps.
    pub sweep_interval_secs: u64,
    /// Seconds between event feed polls.
    pub event_poll_interval_secs: u64,
    /// First block to read events from when no cursor is stored.
    pub event_start_block: u64,
    /// Timeout for every outbound HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            rpc_bind: "127.0.0.1".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            log_level: "info".to_string(),
            chain_url: "http://127.0.0.1:8545".to_string(),
            index_url: "http://127.0.0.1:3000/graphql".to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            event_poll_interval_secs: DEFAULT_EVENT_POLL_INTERVAL_SECS,
            event_start_block: 0,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// `<platform data dir>/payg`, or `./payg` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("payg")
}

impl NodeConfig {
    /// Load defaults, then `file` (if it exists), then `PAYG_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let loaded: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the run loops cannot work with.
    ///
    /// Intervals and the request timeout must be at least one second.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let positive = [
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("event_poll_interval_secs", self.event_poll_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(config::ConfigError::Message(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    /// Path of the config file inside `data_dir`.
    pub fn default_file(data_dir: &Path) -> PathBuf {
        data_dir.join(CONFIG_FILE_NAME)
    }

    /// Path to the RocksDB channel data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("channeldata")
    }

    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_bind, self.rpc_port)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_secs(self.event_poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
