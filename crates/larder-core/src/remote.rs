//! Remote shared store contract
//!
//! The relay only needs two operations from a remote backend, both scoped by
//! an opaque group id. The transport is the implementor's choice.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::RelayError;

/// Opaque identifier of a sync group (the devices sharing remote state).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Create a group id. Surrounding whitespace is trimmed.
    pub fn new(group: impl AsRef<str>) -> Self {
        Self(group.as_ref().trim().to_string())
    }

    /// View the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty after trimming (treated as "no group").
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for GroupId {
    fn from(group: &str) -> Self {
        Self::new(group)
    }
}

impl From<String> for GroupId {
    fn from(group: String) -> Self {
        Self::new(group)
    }
}

/// A remote document store shared by every device in a group.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or shallow-merge `document` into the group's collection.
    async fn upsert(
        &self,
        group: &GroupId,
        collection: &str,
        document: &Document,
    ) -> Result<(), RelayError>;

    /// Every document the group holds for `collection`.
    async fn list_all(&self, group: &GroupId, collection: &str) -> Result<Vec<Document>, RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn RemoteStore) {}

    #[test]
    fn test_group_id_is_trimmed() {
        let group = GroupId::new("  shop-42 ");
        assert_eq!(group.as_str(), "shop-42");
        assert_eq!(group.to_string(), "shop-42");
        assert!(GroupId::new("   ").is_empty());
    }
}
