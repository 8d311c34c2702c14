//! Error types shared across Larder crates

use thiserror::Error;

/// A persistence layer rejected a read or write.
///
/// Surfaced to the direct caller of a mutation; the engine never retries.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Storage quota exceeded for slot {slot}: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded {
        slot: String,
        needed: usize,
        limit: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt slot {slot}: {reason}")]
    Corrupt { slot: String, reason: String },
}

impl StorageError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new Corrupt error for a slot that failed to parse
    pub fn corrupt(slot: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            slot: slot.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// A push or pull to the remote shared store failed.
///
/// Contained inside the relay: logged, never propagated into the result of
/// the local mutation that triggered it.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Remote store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode remote response: {0}")]
    Decode(String),

    #[error("Relay is not joined to a group")]
    Disabled,
}

impl RelayError {
    /// Create a new Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create a new Decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}
