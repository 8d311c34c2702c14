//! Quota management for storage
//!
//! Models the fixed storage budget of a client device: a write that would
//! push a slot, or all slots together, past the limit is rejected before it
//! touches the backend.

use larder_core::StorageError;

/// Default budget: 5 MiB, shared by all slots.
pub const DEFAULT_MAX_TOTAL_BYTES: usize = 5 * 1024 * 1024;

/// Manages storage quotas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaManager {
    /// Maximum serialized size of one slot
    max_slot_bytes: usize,
    /// Maximum serialized size of all slots together
    max_total_bytes: usize,
}

impl Default for QuotaManager {
    fn default() -> Self {
        Self {
            max_slot_bytes: DEFAULT_MAX_TOTAL_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

impl QuotaManager {
    /// Create a QuotaManager with specified limits
    pub fn new(max_slot_bytes: usize, max_total_bytes: usize) -> Self {
        Self {
            max_slot_bytes,
            max_total_bytes,
        }
    }

    /// A quota that never rejects
    pub fn unlimited() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }

    /// Get the maximum size of one slot
    pub fn max_slot_bytes(&self) -> usize {
        self.max_slot_bytes
    }

    /// Get the maximum size of all slots
    pub fn max_total_bytes(&self) -> usize {
        self.max_total_bytes
    }

    /// Check a pending slot write.
    ///
    /// `current_slot_len` is the slot's size before the write and
    /// `current_total` the size of every slot before the write. A write that
    /// does not grow the slot is always allowed, even over budget.
    pub fn check_write(
        &self,
        slot: &str,
        new_len: usize,
        current_slot_len: usize,
        current_total: usize,
    ) -> Result<(), StorageError> {
        if new_len <= current_slot_len {
            return Ok(());
        }

        if new_len > self.max_slot_bytes {
            return Err(StorageError::QuotaExceeded {
                slot: slot.to_string(),
                needed: new_len,
                limit: self.max_slot_bytes,
            });
        }

        let new_total = current_total
            .saturating_sub(current_slot_len)
            .saturating_add(new_len);
        if new_total > self.max_total_bytes {
            return Err(StorageError::QuotaExceeded {
                slot: slot.to_string(),
                needed: new_total,
                limit: self.max_total_bytes,
            });
        }

        Ok(())
    }
}

/// Builder for QuotaManager
#[derive(Debug, Default)]
pub struct QuotaManagerBuilder {
    max_slot_bytes: Option<usize>,
    max_total_bytes: Option<usize>,
}

impl QuotaManagerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-slot limit
    pub fn max_slot_bytes(mut self, bytes: usize) -> Self {
        self.max_slot_bytes = Some(bytes);
        self
    }

    /// Set the total limit
    pub fn max_total_bytes(mut self, bytes: usize) -> Self {
        self.max_total_bytes = Some(bytes);
        self
    }

    /// Build the QuotaManager. Unset limits take the defaults; a per-slot
    /// limit larger than the total is clamped to the total.
    pub fn build(self) -> QuotaManager {
        let defaults = QuotaManager::default();
        let max_total_bytes = self.max_total_bytes.unwrap_or(defaults.max_total_bytes);
        let max_slot_bytes = self
            .max_slot_bytes
            .unwrap_or(defaults.max_slot_bytes)
            .min(max_total_bytes);
        QuotaManager {
            max_slot_bytes,
            max_total_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quota() {
        let quota = QuotaManager::default();
        assert_eq!(quota.max_total_bytes(), 5 * 1024 * 1024);
        assert!(quota.check_write("pf_orders", 1024, 0, 0).is_ok());
    }

    #[test]
    fn test_slot_limit() {
        let quota = QuotaManager::new(100, 1000);
        assert!(quota.check_write("pf_orders", 100, 0, 0).is_ok());
        let err = quota.check_write("pf_orders", 101, 0, 0).unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded { needed: 101, limit: 100, .. }
        ));
    }

    #[test]
    fn test_total_limit_accounts_for_replaced_slot() {
        let quota = QuotaManager::new(500, 1000);
        // Slot currently 400 of a 900 total; rewriting it to 500 gives 1000.
        assert!(quota.check_write("pf_orders", 500, 400, 900).is_ok());
        // Another slot growing by 101 overflows.
        let err = quota.check_write("pf_users", 101, 0, 900).unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded { needed: 1001, limit: 1000, .. }
        ));
    }

    #[test]
    fn test_shrinking_write_always_fits() {
        let quota = QuotaManager::new(100, 100);
        assert!(quota.check_write("pf_orders", 10, 90, 150).is_ok());
        // Other slots alone already exceed the total.
        assert!(quota.check_write("pf_orders", 10, 90, 5_000).is_ok());
        assert!(quota.check_write("pf_orders", 90, 90, 5_000).is_ok());
        // A slot left over the per-slot limit by an older budget can shrink.
        assert!(quota.check_write("pf_orders", 150, 300, 300).is_ok());

        let err = quota.check_write("pf_orders", 91, 90, 5_000).unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded { needed: 5_001, limit: 100, .. }
        ));
    }

    #[test]
    fn test_unlimited() {
        let quota = QuotaManager::unlimited();
        assert!(quota.check_write("x", usize::MAX / 2, 0, usize::MAX / 2).is_ok());
    }

    #[test]
    fn test_builder() {
        let quota = QuotaManagerBuilder::new()
            .max_slot_bytes(10_000)
            .max_total_bytes(2_000)
            .build();
        assert_eq!(quota.max_total_bytes(), 2_000);
        assert_eq!(quota.max_slot_bytes(), 2_000);

        let quota = QuotaManagerBuilder::new().max_slot_bytes(64).build();
        assert_eq!(quota.max_slot_bytes(), 64);
        assert_eq!(quota.max_total_bytes(), DEFAULT_MAX_TOTAL_BYTES);
    }
}
