//! # Larder Storage
//!
//! Durable collection storage for the Larder sync engine.
//!
//! ## Features
//!
//! - **StorageBackend trait**: whole-slot persistence, one slot per collection
//! - **MemoryBackend**: in-memory slots for tests and same-process contexts
//! - **FileBackend**: one JSON file per slot with atomic temp-file-and-rename writes
//! - **QuotaManager**: per-slot and total byte budgets
//! - **DocumentStore**: upsert/update/delete/get/list with change publishing
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use larder_core::LocalNotifier;
//! use larder_storage::{DocumentStore, FileBackend};
//!
//! let backend = Arc::new(FileBackend::open("./data")?);
//! let store = DocumentStore::new(backend, Arc::new(LocalNotifier::new()));
//!
//! let mut fields = serde_json::Map::new();
//! fields.insert("status".into(), "Pending".into());
//! store.upsert("orders", "ORD-1", fields)?;
//!
//! assert!(store.get("orders", "ORD-1")?.is_some());
//! ```

pub mod backend;
pub mod memory;
pub mod persistent;
pub mod quota;
pub mod store;

// Re-exports
pub use backend::{DEFAULT_NAMESPACE, StorageBackend, collection_of, slot_name};
pub use memory::MemoryBackend;
pub use persistent::FileBackend;
pub use quota::{QuotaManager, QuotaManagerBuilder};
pub use store::{DocumentStore, UpdateOutcome};

// Re-export the error type from larder-core for convenience
pub use larder_core::StorageError;

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the StorageBackend trait is object-safe
    fn _assert_object_safe(_: &dyn StorageBackend) {}
}
