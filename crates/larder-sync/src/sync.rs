//! The collection sync API
//!
//! [`CollectionSync`] is what application code talks to. It wraps a
//! [`DocumentStore`] with realtime-database style subscriptions and hands
//! every successful local write to the [`RemoteRelay`], if one is attached.

use std::fmt::Debug;
use std::sync::Arc;

use larder_core::{Document, DocumentId, Fields, OrderSpec, StorageError, Subscription};
use larder_storage::{DocumentStore, UpdateOutcome};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::relay::RemoteRelay;
use crate::typed::TypedCollection;

/// Subscriptions and mutations over one store.
///
/// Cheap to clone; clones share the store and relay.
#[derive(Debug, Clone)]
pub struct CollectionSync {
    store: Arc<DocumentStore>,
    relay: Option<Arc<RemoteRelay>>,
}

impl CollectionSync {
    /// Sync API over `store` with no relay
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store, relay: None }
    }

    /// Relay successful writes through `relay`
    pub fn with_relay(mut self, relay: Arc<RemoteRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// The attached relay, if any
    pub fn relay(&self) -> Option<&Arc<RemoteRelay>> {
        self.relay.as_ref()
    }

    /// Subscribe to `collection`.
    ///
    /// `callback` runs once right away with the current snapshot and again
    /// after every change, whether made in this context or a sibling one.
    /// When `order` is given every delivery is sorted by it.
    ///
    /// Dropping or unsubscribing the returned handle stops delivery.
    pub fn sync_collection<F>(
        &self,
        collection: &str,
        callback: F,
        order: Option<OrderSpec>,
    ) -> Result<Subscription, StorageError>
    where
        F: Fn(Vec<Document>) + Send + Sync + 'static,
    {
        let deliver = move |snapshot: &[Document]| {
            let mut documents = snapshot.to_vec();
            if let Some(order) = &order {
                order.apply(&mut documents);
            }
            callback(documents);
        };
        let deliver = Arc::new(deliver);

        // Register before reading so no change between the two is missed.
        let subscription = self
            .store
            .notifier()
            .subscribe(collection, deliver.clone());
        let current = self.store.list(collection)?;
        if subscription.is_active() {
            deliver(&current);
        }
        trace!(collection, documents = current.len(), "Collection subscribed");
        Ok(subscription)
    }

    /// Insert or merge a document; see [`DocumentStore::upsert`].
    pub async fn upsert_document(
        &self,
        collection: &str,
        id: impl Into<DocumentId> + Debug,
        data: Fields,
    ) -> Result<Document, StorageError> {
        let document = self.store.upsert(collection, id, data)?;
        self.relay_write(collection, &document);
        Ok(document)
    }

    /// Merge into an existing document; a missing id is a no-op.
    pub async fn update_document(
        &self,
        collection: &str,
        id: &str,
        partial: Fields,
    ) -> Result<UpdateOutcome, StorageError> {
        let outcome = self.store.update(collection, id, partial)?;
        if let UpdateOutcome::Updated(document) = &outcome {
            self.relay_write(collection, document);
        }
        Ok(outcome)
    }

    /// Remove a document locally. Deletes are not relayed.
    pub async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StorageError> {
        let removed = self.store.delete(collection, id)?;
        if removed && self.relay.is_some() {
            debug!(collection, id, "Local delete is not relayed");
        }
        Ok(removed)
    }

    /// One document, or `None`
    pub async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError> {
        self.store.get(collection, id)
    }

    /// Every document in `collection`, unordered
    pub async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StorageError> {
        self.store.list(collection)
    }

    /// Replace a whole collection (backup restore). Every restored document
    /// is relayed.
    pub async fn replace_collection(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Document>, StorageError> {
        let stored = self.store.replace_all(collection, documents)?;
        for document in &stored {
            self.relay_write(collection, document);
        }
        Ok(stored)
    }

    /// Typed view of `collection`
    pub fn typed<T>(&self, collection: impl Into<String>) -> TypedCollection<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        TypedCollection::new(self.clone(), collection)
    }

    fn relay_write(&self, collection: &str, document: &Document) {
        if let Some(relay) = &self.relay {
            relay.push(collection, document);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::{Direction, LocalNotifier, order_by};
    use larder_storage::MemoryBackend;
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn sync() -> CollectionSync {
        CollectionSync::new(Arc::new(DocumentStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(LocalNotifier::new()),
        )))
    }

    fn recorder() -> (Arc<Mutex<Vec<Vec<String>>>>, impl Fn(Vec<Document>) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = move |docs: Vec<Document>| {
            sink.lock()
                .push(docs.iter().map(|d| d.id.as_str().to_string()).collect());
        };
        (seen, callback)
    }

    #[tokio::test]
    async fn test_immediate_snapshot_then_changes() {
        let sync = sync();
        sync.upsert_document("orders", "a", Fields::new()).await.unwrap();

        let (seen, callback) = recorder();
        let _sub = sync.sync_collection("orders", callback, None).unwrap();
        assert_eq!(*seen.lock(), vec![vec!["a".to_string()]]);

        sync.upsert_document("orders", "b", Fields::new()).await.unwrap();
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(seen.lock()[1], vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_collection_delivers_empty_snapshot() {
        let sync = sync();
        let (seen, callback) = recorder();
        let _sub = sync.sync_collection("nothing", callback, None).unwrap();
        assert_eq!(*seen.lock(), vec![Vec::<String>::new()]);
    }

    #[tokio::test]
    async fn test_every_delivery_is_ordered() {
        let sync = sync();
        sync.upsert_document("orders", "a", fields(json!({"total": 20}))).await.unwrap();
        sync.upsert_document("orders", "b", fields(json!({"total": 50}))).await.unwrap();

        let (seen, callback) = recorder();
        let _sub = sync
            .sync_collection("orders", callback, Some(order_by("total", Direction::Desc)))
            .unwrap();
        sync.upsert_document("orders", "c", fields(json!({"total": 35}))).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0], vec!["b", "a"]);
        assert_eq!(seen[1], vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let sync = sync();
        let (seen, callback) = recorder();
        let sub = sync.sync_collection("orders", callback, None).unwrap();
        sub.unsubscribe();

        sync.upsert_document("orders", "a", Fields::new()).await.unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_pass_throughs() {
        let sync = sync();
        tokio_test::block_on(async {
            assert!(sync.get_document("orders", "x").await.unwrap().is_none());

            let outcome = sync
                .update_document("orders", "x", fields(json!({"a": 1})))
                .await
                .unwrap();
            assert_eq!(outcome, UpdateOutcome::NotFound);

            sync.upsert_document("orders", "x", fields(json!({"a": 1}))).await.unwrap();
            assert!(sync.delete_document("orders", "x").await.unwrap());
            assert!(!sync.delete_document("orders", "x").await.unwrap());
            assert!(sync.list_documents("orders").await.unwrap().is_empty());
        });
    }

    #[tokio::test]
    async fn test_replace_collection_publishes_once() {
        let sync = sync();
        let (seen, callback) = recorder();
        let _sub = sync.sync_collection("products", callback, None).unwrap();

        let docs = vec![
            Document::from_fields("p1", chrono::Utc::now(), Fields::new()),
            Document::from_fields("p2", chrono::Utc::now(), Fields::new()),
        ];
        let stored = sync.replace_collection("products", docs).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(seen.lock().len(), 2);
    }
}
