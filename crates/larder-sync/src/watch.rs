//! Cross-process change detection for file-backed stores
//!
//! Processes that open the same [`FileBackend`] directory do not share
//! memory, so a [`SiblingBus`](crate::SiblingBus) cannot reach them. A
//! [`SlotWatcher`] watches the directory instead: whenever a slot file is
//! created, replaced or removed, the collection is re-read and the fresh
//! snapshot published to this context's local subscribers.
//!
//! A process also sees events for its own writes, so delivery through the
//! watcher is at-least-once.

use std::path::Path;
use std::sync::Arc;

use larder_core::{LocalNotifier, Notifier};
use larder_storage::{DocumentStore, FileBackend, collection_of};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

/// Watches a slot directory and republishes changed collections.
///
/// Watching stops when the watcher is dropped.
pub struct SlotWatcher {
    _watcher: RecommendedWatcher,
    namespace: String,
}

impl SlotWatcher {
    /// Start watching `backend`'s directory on behalf of `store`.
    ///
    /// Snapshots are published on `local` only, never re-announced to
    /// other contexts.
    pub fn start(
        store: Arc<DocumentStore>,
        backend: Arc<FileBackend>,
        local: Arc<LocalNotifier>,
    ) -> SyncResult<Self> {
        let namespace = store.namespace().to_string();
        let resolver = Arc::clone(&backend);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => handle_event(&store, &resolver, &local, event),
            Err(e) => warn!(error = %e, "Slot watcher error"),
        })
        .map_err(|e| SyncError::Watch(e.to_string()))?;

        watcher
            .watch(backend.dir(), RecursiveMode::NonRecursive)
            .map_err(|e| SyncError::Watch(e.to_string()))?;

        info!(dir = %backend.dir().display(), namespace = %namespace, "Watching slot directory");
        Ok(Self {
            _watcher: watcher,
            namespace,
        })
    }

    /// Namespace whose slots are republished
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl std::fmt::Debug for SlotWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotWatcher")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

fn handle_event(store: &DocumentStore, backend: &FileBackend, local: &LocalNotifier, event: Event) {
    let removed = match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => false,
        EventKind::Remove(_) => true,
        _ => return,
    };

    for path in &event.paths {
        let Some(collection) = collection_for(store, backend, path) else {
            continue;
        };
        // A rename may report the slot as gone even though it was replaced.
        if removed && path.exists() {
            continue;
        }
        if removed {
            debug!(collection = %collection, "Slot removed by another process");
            local.publish(&collection, &[]);
            continue;
        }
        match store.list(&collection) {
            Ok(snapshot) => {
                debug!(collection = %collection, documents = snapshot.len(), "Slot changed on disk");
                local.publish(&collection, &snapshot);
            }
            Err(e) => warn!(collection = %collection, error = %e, "Failed to re-read changed slot"),
        }
    }
}

fn collection_for(store: &DocumentStore, backend: &FileBackend, path: &Path) -> Option<String> {
    let slot = backend.slot_for_path(path)?;
    collection_of(store.namespace(), &slot).map(str::to_string)
}
