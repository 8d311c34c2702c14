//! Relay server configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use larder_logging::LogConfig;
use larder_storage::DEFAULT_NAMESPACE;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: SocketAddr,
    /// Root directory for per-group stores; memory only when unset
    pub data_dir: Option<PathBuf>,
    /// Slot namespace inside each group store
    pub namespace: String,
    /// Byte budget per group
    pub max_group_bytes: usize,
    /// Largest accepted request body
    pub max_body_bytes: usize,
    /// Logging
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8787)),
            data_dir: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_group_bytes: 64 * 1024 * 1024,
            max_body_bytes: 1024 * 1024,
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        if config.namespace.trim().is_empty() {
            return Err(ServerError::Config("namespace must not be empty".into()));
        }
        Ok(config)
    }

    /// Listen on `bind`
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Persist groups under `dir`
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the per-group byte budget
    pub fn with_max_group_bytes(mut self, bytes: usize) -> Self {
        self.max_group_bytes = bytes;
        self
    }

    /// Set the logging configuration
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}
