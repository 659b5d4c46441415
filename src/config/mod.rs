//! Application configuration

pub mod client;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use client::{ClientConfig, ConfigError};

use crate::stream::TransportConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_url: String,
    pub stream_timeout_ms: u64,
    pub data_dir: PathBuf,
    pub config_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let base_url = var("MOXIE_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:8080".into());
        client::check_base_url("MOXIE_BASE_URL", &base_url)?;

        Ok(Self {
            base_url,
            stream_timeout_ms: var("MOXIE_STREAM_TIMEOUT_MS")
                .and_then(|t| t.parse().ok())
                .filter(|&t: &u64| t > 0)
                .unwrap_or(60_000),
            data_dir: var("MOXIE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            config_file: var("MOXIE_CONFIG").map(PathBuf::from),
        })
    }

    /// Let values set in the TOML file win over environment defaults
    pub fn merge(&mut self, client: &ClientConfig) {
        if let Some(ref base_url) = client.server.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(timeout_ms) = client.stream.timeout_ms {
            self.stream_timeout_ms = timeout_ms;
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_millis(self.stream_timeout_ms),
        }
    }

    /// Where the local state database lives
    pub fn state_db_path(&self, client: &ClientConfig) -> PathBuf {
        client
            .storage
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("moxie-chat.db"))
    }
}
