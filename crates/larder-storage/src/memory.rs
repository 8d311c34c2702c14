//! In-memory slot backend
//!
//! Suitable for tests and for several contexts in one process sharing the
//! same "physical" storage: clone the `Arc<MemoryBackend>` into each store.

use dashmap::DashMap;
use larder_core::StorageError;
use parking_lot::Mutex;
use tracing::trace;

use crate::backend::StorageBackend;

/// In-memory implementation of [`StorageBackend`]
///
/// Uses `DashMap` for concurrent access to slots. Writes can be made to fail
/// on demand to exercise storage-failure paths.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: DashMap<String, String>,
    write_failure: Mutex<Option<StorageError>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `error` until cleared.
    pub fn fail_writes_with(&self, error: StorageError) {
        *self.write_failure.lock() = Some(error);
    }

    /// Let writes succeed again.
    pub fn clear_write_failure(&self) {
        *self.write_failure.lock() = None;
    }

    /// Number of stored slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.get(slot).map(|s| s.value().clone()))
    }

    fn write_slot(&self, slot: &str, contents: &str) -> Result<(), StorageError> {
        if let Some(error) = self.write_failure.lock().clone() {
            return Err(error);
        }
        trace!(slot, bytes = contents.len(), "Writing slot");
        self.slots.insert(slot.to_string(), contents.to_string());
        Ok(())
    }

    fn remove_slot(&self, slot: &str) -> Result<(), StorageError> {
        if let Some(error) = self.write_failure.lock().clone() {
            return Err(error);
        }
        self.slots.remove(slot);
        Ok(())
    }

    fn slots(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    fn slot_len(&self, slot: &str) -> Result<usize, StorageError> {
        Ok(self.slots.get(slot).map(|s| s.len()).unwrap_or(0))
    }

    fn total_len(&self) -> Result<usize, StorageError> {
        Ok(self.slots.iter().map(|e| e.value().len()).sum())
    }
}
