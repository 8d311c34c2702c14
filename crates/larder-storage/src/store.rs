//! The document store
//!
//! Collections live in backend slots as JSON arrays. Every mutation is a
//! read-modify-write of the whole slot under the store's write lock, stamped
//! from the store's clock, and followed by a publish of the fresh snapshot.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use larder_core::{
    Clock, Document, DocumentId, Fields, Notifier, StorageError, SystemClock,
};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::backend::{DEFAULT_NAMESPACE, StorageBackend, collection_of, slot_name};
use crate::quota::QuotaManager;

/// Result of [`DocumentStore::update`].
///
/// Updating a missing document is not an error; callers that care can match
/// on [`UpdateOutcome::NotFound`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The document existed and now holds the merged fields.
    Updated(Document),
    /// No document had that id; nothing was written.
    NotFound,
}

impl UpdateOutcome {
    /// Whether a document was updated
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }

    /// The updated document, if any
    pub fn document(&self) -> Option<&Document> {
        match self {
            UpdateOutcome::Updated(doc) => Some(doc),
            UpdateOutcome::NotFound => None,
        }
    }
}

/// Durable, synchronous-read collection store.
///
/// Two stores built over the same backend behave like two contexts sharing
/// physical storage: each sees the other's writes on its next read.
pub struct DocumentStore {
    backend: Arc<dyn StorageBackend>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    quota: QuotaManager,
    namespace: String,
    /// Serializes writers; holds the last stamp handed out.
    write_lock: Mutex<DateTime<Utc>>,
}

impl DocumentStore {
    /// Create a store over `backend` that publishes changes on `notifier`.
    pub fn new(backend: Arc<dyn StorageBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            clock: Arc::new(SystemClock),
            quota: QuotaManager::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            write_lock: Mutex::new(DateTime::<Utc>::default()),
        }
    }

    /// Use a custom quota
    pub fn with_quota(mut self, quota: QuotaManager) -> Self {
        self.quota = quota;
        self
    }

    /// Use a custom clock for `lastUpdated` stamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a custom slot namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// The notifier this store publishes on
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// The underlying backend
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// The slot namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The quota in force
    pub fn quota(&self) -> &QuotaManager {
        &self.quota
    }

    /// Slot name backing `collection`
    pub fn slot_for(&self, collection: &str) -> String {
        slot_name(&self.namespace, collection)
    }

    /// Every document in `collection`. Order is not part of the contract.
    pub fn list(&self, collection: &str) -> Result<Vec<Document>, StorageError> {
        let slot = self.slot_for(collection);
        let Some(raw) = self.backend.read_slot(&slot)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| StorageError::corrupt(slot, e.to_string()))
    }

    /// One document, or `None` if the collection has no such id.
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StorageError> {
        Ok(self
            .list(collection)?
            .into_iter()
            .find(|doc| doc.id.as_str() == id))
    }

    /// Insert `data` as a new document or shallow-merge it into the existing
    /// one. Returns the stored document.
    #[instrument(skip(self, data), fields(namespace = %self.namespace))]
    pub fn upsert(
        &self,
        collection: &str,
        id: impl Into<DocumentId> + std::fmt::Debug,
        data: Fields,
    ) -> Result<Document, StorageError> {
        let id = id.into();
        let stored = self.mutate(collection, |docs, stamp| {
            match docs.iter_mut().find(|doc| doc.id == id) {
                Some(existing) => {
                    existing.merge(data, stamp);
                    Some(existing.clone())
                }
                None => {
                    let doc = Document::from_fields(id.clone(), stamp, data);
                    docs.push(doc.clone());
                    Some(doc)
                }
            }
        })?;
        // The closure above always returns Some.
        stored.ok_or_else(|| StorageError::io("upsert produced no document"))
    }

    /// Merge `partial` into an existing document; a missing id is a no-op.
    #[instrument(skip(self, partial), fields(namespace = %self.namespace))]
    pub fn update(
        &self,
        collection: &str,
        id: &str,
        partial: Fields,
    ) -> Result<UpdateOutcome, StorageError> {
        let updated = self.mutate(collection, |docs, stamp| {
            let existing = docs.iter_mut().find(|doc| doc.id.as_str() == id)?;
            existing.merge(partial, stamp);
            Some(existing.clone())
        })?;
        match updated {
            Some(doc) => Ok(UpdateOutcome::Updated(doc)),
            None => {
                debug!(collection, id, "Update skipped, document not found");
                Ok(UpdateOutcome::NotFound)
            }
        }
    }

    /// Remove a document. Returns whether one was removed; removing a missing
    /// id is a no-op.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn delete(&self, collection: &str, id: &str) -> Result<bool, StorageError> {
        let removed = self.mutate(collection, |docs, _stamp| {
            let before = docs.len();
            docs.retain(|doc| doc.id.as_str() != id);
            (docs.len() != before).then_some(())
        })?;
        Ok(removed.is_some())
    }

    /// Replace a whole collection, e.g. when restoring a backup.
    ///
    /// Duplicate ids collapse to the last occurrence, kept at the position of
    /// the first. Every document is stamped with the same write time.
    #[instrument(skip(self, documents), fields(namespace = %self.namespace, count = documents.len()))]
    pub fn replace_all(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Document>, StorageError> {
        let replaced = self.mutate(collection, |docs, stamp| {
            let mut fresh: Vec<Document> = Vec::with_capacity(documents.len());
            for mut doc in documents {
                doc.last_updated = stamp;
                match fresh.iter_mut().find(|d| d.id == doc.id) {
                    Some(slot) => *slot = doc,
                    None => fresh.push(doc),
                }
            }
            *docs = fresh;
            Some(docs.clone())
        })?;
        Ok(replaced.unwrap_or_default())
    }

    /// Drop a collection's slot entirely. Subscribers receive `[]`.
    pub fn clear(&self, collection: &str) -> Result<(), StorageError> {
        let slot = self.slot_for(collection);
        {
            let _guard = self.write_lock.lock();
            self.backend.remove_slot(&slot)?;
        }
        debug!(collection, slot = %slot, "Cleared collection");
        self.notifier.publish(collection, &[]);
        Ok(())
    }

    /// Names of every collection stored under this namespace.
    pub fn collections(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .backend
            .slots()?
            .iter()
            .filter_map(|slot| collection_of(&self.namespace, slot))
            .map(str::to_string)
            .collect())
    }

    /// Read-modify-write one collection.
    ///
    /// `apply` returns `None` to signal "nothing changed", in which case
    /// nothing is written or published. Otherwise the whole slot is
    /// rewritten and, once the write lock is released, the new snapshot is
    /// published.
    fn mutate<R>(
        &self,
        collection: &str,
        apply: impl FnOnce(&mut Vec<Document>, DateTime<Utc>) -> Option<R>,
    ) -> Result<Option<R>, StorageError> {
        let slot = self.slot_for(collection);
        let (result, snapshot) = {
            let mut last_stamp = self.write_lock.lock();
            let mut docs = self.list(collection)?;
            let stamp = next_stamp(*last_stamp, self.clock.now_utc());

            let Some(result) = apply(&mut docs, stamp) else {
                return Ok(None);
            };

            let serialized = serde_json::to_string(&docs)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            let current_slot_len = self.backend.slot_len(&slot)?;
            let current_total = self.backend.total_len()?;
            if let Err(e) =
                self.quota
                    .check_write(&slot, serialized.len(), current_slot_len, current_total)
            {
                warn!(collection, error = %e, "Write rejected by quota");
                return Err(e);
            }
            if let Err(e) = self.backend.write_slot(&slot, &serialized) {
                warn!(collection, error = %e, "Write failed");
                return Err(e);
            }

            *last_stamp = stamp;
            debug!(collection, documents = docs.len(), bytes = serialized.len(), "Collection written");
            (result, docs)
        };

        self.notifier.publish(collection, &snapshot);
        Ok(Some(result))
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("backend", &self.backend)
            .field("namespace", &self.namespace)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

/// Stamps are strictly increasing per store, even when the clock stalls or
/// steps backwards.
fn next_stamp(last: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > last {
        now
    } else {
        last + TimeDelta::microseconds(1)
    }
}
