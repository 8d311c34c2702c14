//! Typed collection views
//!
//! The store works on raw JSON fields. A [`TypedCollection<T>`] converts at
//! the boundary so application code can use its own structs.

use std::marker::PhantomData;

use larder_core::{Document, Fields, OrderSpec, Subscription, to_fields};
use larder_storage::UpdateOutcome;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::sync::CollectionSync;

/// A collection whose documents deserialize as `T`.
pub struct TypedCollection<T> {
    sync: CollectionSync,
    name: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> TypedCollection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(sync: CollectionSync, name: impl Into<String>) -> Self {
        Self {
            sync,
            name: name.into(),
            _payload: PhantomData,
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe with typed snapshots.
    ///
    /// Documents that do not decode as `T` are left out of the snapshot and
    /// logged.
    pub fn subscribe<F>(&self, callback: F, order: Option<OrderSpec>) -> SyncResult<Subscription>
    where
        F: Fn(Vec<Document<T>>) + Send + Sync + 'static,
    {
        let collection = self.name.clone();
        let subscription = self.sync.sync_collection(
            &self.name,
            move |documents| {
                let typed = documents
                    .into_iter()
                    .filter_map(|doc| {
                        let id = doc.id.clone();
                        match doc.into_typed::<T>() {
                            Ok(typed) => Some(typed),
                            Err(e) => {
                                warn!(collection = %collection, id = %id, error = %e, "Skipping undecodable document");
                                None
                            }
                        }
                    })
                    .collect();
                callback(typed);
            },
            order,
        )?;
        Ok(subscription)
    }

    /// Insert or merge `value` under `id`
    pub async fn upsert(&self, id: &str, value: &T) -> SyncResult<Document<T>> {
        let data = to_fields(value).map_err(|e| SyncError::Encode(e.to_string()))?;
        let stored = self.sync.upsert_document(&self.name, id, data).await?;
        decode(stored)
    }

    /// Merge raw fields into an existing document; `None` if it is missing
    pub async fn update(&self, id: &str, partial: Fields) -> SyncResult<Option<Document<T>>> {
        match self.sync.update_document(&self.name, id, partial).await? {
            UpdateOutcome::Updated(document) => decode(document).map(Some),
            UpdateOutcome::NotFound => Ok(None),
        }
    }

    /// One document, or `None`
    pub async fn get(&self, id: &str) -> SyncResult<Option<Document<T>>> {
        self.sync
            .get_document(&self.name, id)
            .await?
            .map(decode)
            .transpose()
    }

    /// Every document; fails on the first one that does not decode
    pub async fn list(&self) -> SyncResult<Vec<Document<T>>> {
        self.sync
            .list_documents(&self.name)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Remove a document
    pub async fn delete(&self, id: &str) -> SyncResult<bool> {
        Ok(self.sync.delete_document(&self.name, id).await?)
    }
}

impl<T> std::fmt::Debug for TypedCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCollection")
            .field("name", &self.name)
            .field("payload", &std::any::type_name::<T>())
            .finish()
    }
}

fn decode<T: DeserializeOwned>(document: Document) -> SyncResult<Document<T>> {
    let id = document.id.to_string();
    document.into_typed().map_err(|e| SyncError::Decode {
        id,
        reason: e.to_string(),
    })
}
