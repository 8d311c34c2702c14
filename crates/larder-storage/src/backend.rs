//! Slot-level persistence
//!
//! A backend stores named slots of text. The document store keeps one slot
//! per collection, named `<namespace>_<collection>`, holding the JSON array
//! of that collection's documents. Every write replaces a slot as a whole.

use std::fmt;

use larder_core::StorageError;

/// Default slot namespace.
pub const DEFAULT_NAMESPACE: &str = "pf";

/// Durable storage of whole-slot strings.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Read a slot, or `None` if it has never been written.
    fn read_slot(&self, slot: &str) -> Result<Option<String>, StorageError>;

    /// Replace a slot's contents.
    ///
    /// Must be atomic: after a crash the slot holds either the old or the
    /// new contents, never a mix.
    fn write_slot(&self, slot: &str, contents: &str) -> Result<(), StorageError>;

    /// Remove a slot. Removing a missing slot is not an error.
    fn remove_slot(&self, slot: &str) -> Result<(), StorageError>;

    /// Names of every stored slot.
    fn slots(&self) -> Result<Vec<String>, StorageError>;

    /// Size of a slot in bytes (0 if missing).
    fn slot_len(&self, slot: &str) -> Result<usize, StorageError> {
        Ok(self.read_slot(slot)?.map(|s| s.len()).unwrap_or(0))
    }

    /// Total size of all slots in bytes.
    fn total_len(&self) -> Result<usize, StorageError> {
        let mut total = 0;
        for slot in self.slots()? {
            total += self.slot_len(&slot)?;
        }
        Ok(total)
    }
}

/// Slot name for a collection.
pub fn slot_name(namespace: &str, collection: &str) -> String {
    format!("{namespace}_{collection}")
}

/// Collection name for a slot, if the slot belongs to `namespace`.
pub fn collection_of<'a>(namespace: &str, slot: &'a str) -> Option<&'a str> {
    slot.strip_prefix(namespace)?.strip_prefix('_')
}
