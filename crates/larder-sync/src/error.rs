//! Error types for larder-sync

use larder_core::{RelayError, StorageError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the sync layer
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to encode document: {0}")]
    Encode(String),

    #[error("Failed to decode document {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("Slot watcher error: {0}")]
    Watch(String),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
