//! In-process remote store
//!
//! Stands in for a shared backend when several relays in one process (or
//! one test) need to see the same remote state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use larder_core::{Document, GroupId, RelayError, RemoteStore};
use tracing::trace;

/// Remote store held in memory, keyed by group and collection.
#[derive(Debug)]
pub struct InMemoryRemoteStore {
    collections: DashMap<(GroupId, String), Vec<Document>>,
    available: AtomicBool,
    upserts: AtomicU64,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self {
            collections: DashMap::new(),
            available: AtomicBool::new(true),
            upserts: AtomicU64::new(0),
        }
    }
}

impl InMemoryRemoteStore {
    /// Create an empty, reachable store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`RelayError::Unavailable`] (or succeed again)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether calls currently succeed
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Successful upserts so far
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Current remote contents of one collection
    pub fn documents(&self, group: &GroupId, collection: &str) -> Vec<Document> {
        self.collections
            .get(&(group.clone(), collection.to_string()))
            .map(|docs| docs.value().clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), RelayError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(RelayError::unavailable("remote store offline"))
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn upsert(
        &self,
        group: &GroupId,
        collection: &str,
        document: &Document,
    ) -> Result<(), RelayError> {
        self.check_available()?;
        let mut docs = self
            .collections
            .entry((group.clone(), collection.to_string()))
            .or_default();
        match docs.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => existing.merge(document.data.clone(), document.last_updated),
            None => docs.push(document.clone()),
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        trace!(group = %group, collection, id = %document.id, "Remote upsert");
        Ok(())
    }

    async fn list_all(&self, group: &GroupId, collection: &str) -> Result<Vec<Document>, RelayError> {
        self.check_available()?;
        Ok(self.documents(group, collection))
    }
}
