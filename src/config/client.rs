//! Client configuration loaded from TOML files
//!
//! Every section is optional:
//!
//! ```toml
//! [server]
//! base_url = "https://chat.example.com"
//!
//! [stream]
//! timeout_ms = 60000
//!
//! [conversation]
//! greeting = "Hi! Ask me anything."
//! cleared_greeting = "Fresh start!"
//! failure_message = "Something went wrong, please retry."
//!
//! [storage]
//! enabled = true
//! path = "./data/moxie-chat.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::chat::{
    EngineConfig, DEFAULT_CLEARED_GREETING, DEFAULT_FAILURE_MESSAGE, DEFAULT_GREETING,
};

/// Root client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref url) = self.server.base_url {
            check_base_url("server.base_url", url)?;
        }

        if self.stream.timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "stream.timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Reject anything that is not an http(s) URL
pub(crate) fn check_base_url(name: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{} must be an http(s) URL, got {:?}",
            name, url
        )))
    }
}

/// Assistant service location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Overrides `MOXIE_BASE_URL`
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Overrides `MOXIE_STREAM_TIMEOUT_MS`
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Texts the client writes into the transcript itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_greeting")]
    pub greeting: String,

    #[serde(default = "default_cleared_greeting")]
    pub cleared_greeting: String,

    #[serde(default = "default_failure_message")]
    pub failure_message: String,
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_cleared_greeting() -> String {
    DEFAULT_CLEARED_GREETING.to_string()
}

fn default_failure_message() -> String {
    DEFAULT_FAILURE_MESSAGE.to_string()
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            cleared_greeting: default_cleared_greeting(),
            failure_message: default_failure_message(),
        }
    }
}

impl ConversationConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            greeting: self.greeting.clone(),
            cleared_greeting: self.cleared_greeting.clone(),
            failure_message: self.failure_message.clone(),
        }
    }
}

/// Local state persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// When false the conversation id only lives for this process
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite file; defaults to `<data_dir>/moxie-chat.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
