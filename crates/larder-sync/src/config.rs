//! Configuration for a sync engine
//!
//! Every struct has sensible defaults, builder-style `with_*` setters and
//! loads from TOML. Missing keys fall back to the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use larder_core::collections;
use larder_storage::quota::DEFAULT_MAX_TOTAL_BYTES;
use larder_storage::{DEFAULT_NAMESPACE, QuotaManager, QuotaManagerBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Slot namespace (`<namespace>_<collection>`)
    pub namespace: String,
    /// Local storage settings
    pub storage: StorageConfig,
    /// Remote relay settings
    pub relay: RelayConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            storage: StorageConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Memory-only storage, no relay
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File storage under `dir`, watched for changes by other processes
    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::default().with_data_dir(dir).with_watch(true),
            ..Self::default()
        }
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".into()));
        }
        if self.storage.watch && self.storage.data_dir.is_none() {
            return Err(ConfigError::Invalid(
                "storage.watch requires storage.data_dir".into(),
            ));
        }
        if self.storage.max_total_bytes == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_total_bytes must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Set the slot namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the storage configuration
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Set the relay configuration
    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }
}

/// Local storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for slot files; memory storage when unset
    pub data_dir: Option<PathBuf>,
    /// Fsync each slot write before renaming it into place
    pub sync_writes: bool,
    /// Watch the directory for writes by other processes
    pub watch: bool,
    /// Total byte budget across all slots
    pub max_total_bytes: usize,
    /// Byte budget for a single slot; defaults to the total budget
    pub max_slot_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_writes: true,
            watch: false,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            max_slot_bytes: None,
        }
    }
}

impl StorageConfig {
    /// Store slots as files under `dir`
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Enable or disable fsync on write
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    /// Enable or disable the directory watcher
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Set the total byte budget
    pub fn with_max_total_bytes(mut self, bytes: usize) -> Self {
        self.max_total_bytes = bytes;
        self
    }

    /// Set the per-slot byte budget
    pub fn with_max_slot_bytes(mut self, bytes: usize) -> Self {
        self.max_slot_bytes = Some(bytes);
        self
    }

    /// The quota these settings describe
    pub fn quota(&self) -> QuotaManager {
        QuotaManagerBuilder::new()
            .max_total_bytes(self.max_total_bytes)
            .max_slot_bytes(self.max_slot_bytes.unwrap_or(self.max_total_bytes))
            .build()
    }
}

/// Remote relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of a relay server; no HTTP relay when unset
    pub endpoint: Option<String>,
    /// Group to join on startup
    pub group: Option<String>,
    /// Collections pulled when joining a group
    pub collections: Vec<String>,
    /// Payload fields never sent to the remote
    pub strip_fields: Vec<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            group: None,
            collections: collections::ALL.iter().map(|c| c.to_string()).collect(),
            strip_fields: vec!["isLoggedIn".to_string()],
            timeout_secs: 10,
        }
    }
}

impl RelayConfig {
    /// Relay through a server at `endpoint`
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Join `group` on startup
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Collections pulled on join
    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    /// Fields removed from outbound documents
    pub fn with_strip_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strip_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.namespace, "pf");
        assert!(config.storage.data_dir.is_none());
        assert_eq!(config.storage.max_total_bytes, 5 * 1024 * 1024);
        assert_eq!(config.relay.collections.len(), 4);
        assert_eq!(config.relay.strip_fields, vec!["isLoggedIn".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            namespace = "shop"

            [storage]
            data_dir = "/var/lib/shop"
            watch = true

            [relay]
            endpoint = "http://localhost:8787"
            group = "family-42"
            "#,
        )
        .unwrap();

        assert_eq!(config.namespace, "shop");
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/var/lib/shop")));
        assert!(config.storage.sync_writes);
        assert_eq!(config.relay.group.as_deref(), Some("family-42"));
        assert_eq!(config.relay.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SyncConfig::on_disk("/tmp/larder")
            .with_namespace("app")
            .with_relay(RelayConfig::default().with_group("g").with_collections(["orders"]));
        let text = config.to_toml_string().unwrap();
        assert_eq!(SyncConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let err = SyncConfig::from_toml_str(r#"namespace = "  ""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = SyncConfig::from_toml_str("[storage]\nwatch = true").unwrap_err();
        assert!(err.to_string().contains("data_dir"));

        let err = SyncConfig::from_toml_str("namespace = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_quota_from_storage_config() {
        let quota = StorageConfig::default()
            .with_max_total_bytes(1000)
            .with_max_slot_bytes(100)
            .quota();
        assert_eq!(quota.max_total_bytes(), 1000);
        assert_eq!(quota.max_slot_bytes(), 100);
    }
}
