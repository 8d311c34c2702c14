//! Engine bootstrap
//!
//! Wires a store, its notifiers, the optional slot watcher and the optional
//! relay together from a [`SyncConfig`].

use std::sync::Arc;

use larder_core::{Clock, GroupId, LocalNotifier, RemoteStore};
use larder_storage::{DocumentStore, FileBackend, MemoryBackend, StorageBackend};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::context::ContextNotifier;
use crate::error::SyncResult;
use crate::relay::{HttpRemoteStore, JoinReport, RemoteRelay};
use crate::sibling::SiblingBus;
use crate::sync::CollectionSync;
use crate::watch::SlotWatcher;

/// Builder for a [`SyncEngine`]
#[derive(Default)]
pub struct SyncEngineBuilder {
    config: SyncConfig,
    backend: Option<Arc<dyn StorageBackend>>,
    remote: Option<Arc<dyn RemoteStore>>,
    bus: Option<SiblingBus>,
    clock: Option<Arc<dyn Clock>>,
}

impl SyncEngineBuilder {
    /// Start from `config`
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Use this backend instead of the one the config describes.
    ///
    /// Sharing one backend between engines models sibling contexts over the
    /// same physical storage. No slot watcher runs for a supplied backend.
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Relay through this remote instead of the configured endpoint
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Join a sibling bus so other contexts on it see this engine's writes
    pub fn with_sibling_bus(mut self, bus: SiblingBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Stamp documents from this clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Open the engine. Joins the configured group, if any, before
    /// returning.
    pub async fn open(self) -> SyncResult<SyncEngine> {
        self.config.validate()?;
        let config = self.config;

        let local = Arc::new(LocalNotifier::new());
        let notifier = Arc::new(ContextNotifier::new(Arc::clone(&local)));
        if let Some(bus) = &self.bus {
            notifier.attach(Arc::new(bus.join(&local)));
        }

        let file_backend = match (&self.backend, &config.storage.data_dir) {
            (None, Some(dir)) => Some(Arc::new(FileBackend::with_options(
                dir,
                config.storage.sync_writes,
            )?)),
            _ => None,
        };
        let backend: Arc<dyn StorageBackend> = match (self.backend, &file_backend) {
            (Some(backend), _) => backend,
            (None, Some(file)) => file.clone(),
            (None, None) => Arc::new(MemoryBackend::new()),
        };

        let mut store = DocumentStore::new(backend, notifier.clone())
            .with_quota(config.storage.quota())
            .with_namespace(config.namespace.clone());
        if let Some(clock) = self.clock {
            store = store.with_clock(clock);
        }
        let store = Arc::new(store);

        let watcher = match file_backend {
            Some(file) if config.storage.watch => Some(SlotWatcher::start(
                Arc::clone(&store),
                file,
                Arc::clone(&local),
            )?),
            _ => None,
        };

        let remote: Option<Arc<dyn RemoteStore>> = match (self.remote, &config.relay.endpoint) {
            (Some(remote), _) => Some(remote),
            (None, Some(endpoint)) => Some(Arc::new(HttpRemoteStore::new(
                endpoint,
                config.relay.timeout(),
            )?)),
            (None, None) => None,
        };
        let relay = remote.map(|remote| {
            Arc::new(RemoteRelay::spawn(Arc::clone(&store), remote, &config.relay))
        });

        let mut sync = CollectionSync::new(Arc::clone(&store));
        if let Some(relay) = &relay {
            sync = sync.with_relay(Arc::clone(relay));
        }

        let engine = SyncEngine {
            sync,
            notifier,
            relay,
            watcher,
            config,
        };

        match (&engine.relay, &engine.config.relay.group) {
            (Some(_), Some(group)) => {
                engine.join(GroupId::new(group)).await;
            }
            (None, Some(group)) => {
                warn!(group = %group, "Sync group configured without a remote, staying local");
            }
            _ => {}
        }

        info!(
            namespace = %engine.config.namespace,
            persistent = engine.config.storage.data_dir.is_some(),
            watching = engine.watcher.is_some(),
            relay = engine.relay.is_some(),
            "Sync engine open"
        );
        Ok(engine)
    }
}

impl std::fmt::Debug for SyncEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngineBuilder")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("remote", &self.remote.is_some())
            .field("bus", &self.bus.is_some())
            .finish_non_exhaustive()
    }
}

/// A running sync engine for one context.
#[derive(Debug)]
pub struct SyncEngine {
    sync: CollectionSync,
    notifier: Arc<ContextNotifier>,
    relay: Option<Arc<RemoteRelay>>,
    watcher: Option<SlotWatcher>,
    config: SyncConfig,
}

impl SyncEngine {
    /// Builder starting from `config`
    pub fn builder(config: SyncConfig) -> SyncEngineBuilder {
        SyncEngineBuilder::new(config)
    }

    /// Open with `config` and nothing supplied programmatically
    pub async fn open(config: SyncConfig) -> SyncResult<Self> {
        SyncEngineBuilder::new(config).open().await
    }

    /// The collection sync API
    pub fn sync(&self) -> &CollectionSync {
        &self.sync
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<DocumentStore> {
        self.sync.store()
    }

    /// The context notifier the store publishes on
    pub fn notifier(&self) -> &Arc<ContextNotifier> {
        &self.notifier
    }

    /// The relay, if a remote is configured
    pub fn relay(&self) -> Option<&Arc<RemoteRelay>> {
        self.relay.as_ref()
    }

    /// Whether a slot watcher is running
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Configuration the engine was opened with
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Join a sync group. Without a relay this does nothing.
    pub async fn join(&self, group: GroupId) -> Option<JoinReport> {
        let relay = self.relay.as_ref()?;
        Some(relay.join(group).await)
    }

    /// Leave the current sync group
    pub fn leave(&self) {
        if let Some(relay) = &self.relay {
            relay.leave();
        }
    }

    /// Wait for queued relay pushes to be attempted
    pub async fn flush(&self) {
        if let Some(relay) = &self.relay {
            relay.flush().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{InMemoryRemoteStore, RelayState};
    use larder_core::Fields;

    #[tokio::test]
    async fn test_open_in_memory() {
        let engine = SyncEngine::open(SyncConfig::in_memory()).await.unwrap();
        assert!(engine.relay().is_none());
        assert!(!engine.is_watching());
        assert_eq!(engine.store().namespace(), "pf");

        engine
            .sync()
            .upsert_document("orders", "a", Fields::new())
            .await
            .unwrap();
        assert_eq!(engine.store().list("orders").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_configured_group_is_joined() {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let config = SyncConfig::in_memory()
            .with_relay(crate::config::RelayConfig::default().with_group("family"));
        let engine = SyncEngine::builder(config)
            .with_remote(remote)
            .open()
            .await
            .unwrap();

        let relay = engine.relay().unwrap();
        assert_eq!(relay.state(), RelayState::Active);
        assert_eq!(relay.group(), Some(GroupId::new("family")));

        engine.leave();
        assert_eq!(relay.state(), RelayState::Disabled);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_to_open() {
        let err = SyncEngine::open(SyncConfig::in_memory().with_namespace(""))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::SyncError::Config(_)));
    }
}
