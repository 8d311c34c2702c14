//! Remote relay
//!
//! Mirrors local writes to a [`RemoteStore`] scoped by a [`GroupId`], and
//! pulls remote documents into the local store when a group is joined.
//!
//! ## State machine
//!
//! ```text
//!            join(g)              pulls done
//! Disabled ----------> Joining -------------> Active
//!    ^                                          |
//!    +------------------ leave() ---------------+
//! ```
//!
//! Pushes are fire-and-forget: they are queued to a background worker and
//! a failure is logged and counted, never returned to the writer. A failed
//! pull during join still ends in `Active` with whatever local data exists.

mod http;
mod memory;

pub use http::HttpRemoteStore;
pub use memory::InMemoryRemoteStore;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use larder_core::{Document, GroupId, RelayError, RemoteStore};
use larder_storage::DocumentStore;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::RelayConfig;
use crate::error::SyncResult;

/// Relay lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayState {
    /// No group; pushes are dropped
    #[default]
    Disabled,
    /// Group set, initial pulls in progress; pushes are queued and sent
    Joining,
    /// Group set and bootstrapped
    Active,
}

/// Outcome of [`RemoteRelay::join`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Documents pulled per collection
    pub pulled: Vec<(String, usize)>,
    /// Collections whose pull failed, with the reason
    pub failed: Vec<(String, String)>,
    /// The relay was already active on this group; nothing was pulled
    pub already_joined: bool,
}

impl JoinReport {
    /// Total documents pulled
    pub fn total_pulled(&self) -> usize {
        self.pulled.iter().map(|(_, n)| n).sum()
    }

    /// Whether every pull succeeded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Push counters
#[derive(Debug, Default)]
pub struct RelayStats {
    pushed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl RelayStats {
    /// Pushes the remote accepted
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Pushes attempted and rejected or unreachable
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Pushes discarded without an attempt (relay disabled)
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

enum Outbound {
    Push {
        group: GroupId,
        collection: String,
        document: Document,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug)]
struct Membership {
    state: RelayState,
    group: Option<GroupId>,
}

/// Relays a local store to a remote store.
pub struct RemoteRelay {
    store: Arc<DocumentStore>,
    remote: Arc<dyn RemoteStore>,
    collections: Vec<String>,
    strip_fields: Vec<String>,
    membership: RwLock<Membership>,
    outbound: mpsc::UnboundedSender<Outbound>,
    stats: Arc<RelayStats>,
}

impl RemoteRelay {
    /// Create a disabled relay and spawn its push worker.
    ///
    /// Must be called from within a tokio runtime. The worker exits once
    /// the relay is dropped and its queue drained.
    pub fn spawn(
        store: Arc<DocumentStore>,
        remote: Arc<dyn RemoteStore>,
        config: &RelayConfig,
    ) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(RelayStats::default());
        tokio::spawn(push_worker(rx, Arc::clone(&remote), Arc::clone(&stats)));

        Self {
            store,
            remote,
            collections: config.collections.clone(),
            strip_fields: config.strip_fields.clone(),
            membership: RwLock::new(Membership {
                state: RelayState::Disabled,
                group: None,
            }),
            outbound,
            stats,
        }
    }

    /// Current state
    pub fn state(&self) -> RelayState {
        self.membership.read().state
    }

    /// Current group, if any
    pub fn group(&self) -> Option<GroupId> {
        self.membership.read().group.clone()
    }

    /// Push counters
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Collections pulled on join
    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Queue `document` for the remote. Never blocks and never fails;
    /// while disabled the document is dropped.
    pub fn push(&self, collection: &str, document: &Document) {
        let group = {
            let membership = self.membership.read();
            match (&membership.state, &membership.group) {
                (RelayState::Joining | RelayState::Active, Some(group)) => group.clone(),
                _ => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(collection, id = %document.id, "Relay disabled, push dropped");
                    return;
                }
            }
        };

        let mut document = document.clone();
        for field in &self.strip_fields {
            document.data.remove(field);
        }

        let queued = self.outbound.send(Outbound::Push {
            group,
            collection: collection.to_string(),
            document,
        });
        if queued.is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(collection, "Relay worker gone, push dropped");
        }
    }

    /// Fetch every remote document of `collection` and upsert each locally.
    ///
    /// Remote fields overwrite local ones. Returns how many documents were
    /// pulled.
    #[instrument(skip(self))]
    pub async fn pull_all(&self, collection: &str) -> SyncResult<usize> {
        let group = self.group().ok_or(RelayError::Disabled)?;
        let documents = self.remote.list_all(&group, collection).await?;
        let count = documents.len();
        for document in documents {
            self.store.upsert(collection, document.id, document.data)?;
        }
        debug!(group = %group, collection, count, "Pulled remote documents");
        Ok(count)
    }

    /// Join `group`, pulling every configured collection.
    ///
    /// Joining the group the relay is already active on is a no-op. A blank
    /// group id leaves instead.
    #[instrument(skip(self, group), fields(group = %group))]
    pub async fn join(&self, group: GroupId) -> JoinReport {
        if group.is_empty() {
            self.leave();
            return JoinReport::default();
        }
        {
            let mut membership = self.membership.write();
            if membership.state == RelayState::Active && membership.group.as_ref() == Some(&group) {
                return JoinReport {
                    already_joined: true,
                    ..JoinReport::default()
                };
            }
            membership.group = Some(group.clone());
            membership.state = RelayState::Joining;
        }
        info!(group = %group, "Joining sync group");

        let mut report = JoinReport::default();
        for collection in &self.collections {
            match self.pull_all(collection).await {
                Ok(count) => report.pulled.push((collection.clone(), count)),
                Err(e) => {
                    warn!(group = %group, collection = %collection, error = %e, "Initial pull failed");
                    report.failed.push((collection.clone(), e.to_string()));
                }
            }
        }

        let mut membership = self.membership.write();
        // A leave() or another join() while pulling wins.
        if membership.group.as_ref() == Some(&group) && membership.state == RelayState::Joining {
            membership.state = RelayState::Active;
            info!(
                group = %group,
                pulled = report.total_pulled(),
                failed = report.failed.len(),
                "Sync group active"
            );
        }
        report
    }

    /// Stop relaying. Pushes already queued are still attempted.
    pub fn leave(&self) {
        let mut membership = self.membership.write();
        if let Some(group) = membership.group.take() {
            info!(group = %group, "Left sync group");
        }
        membership.state = RelayState::Disabled;
    }

    /// Wait until every push queued before this call has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.outbound.send(Outbound::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

impl std::fmt::Debug for RemoteRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let membership = self.membership.read();
        f.debug_struct("RemoteRelay")
            .field("state", &membership.state)
            .field("group", &membership.group)
            .field("collections", &self.collections)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

async fn push_worker(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    remote: Arc<dyn RemoteStore>,
    stats: Arc<RelayStats>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Outbound::Push {
                group,
                collection,
                document,
            } => match remote.upsert(&group, &collection, &document).await {
                Ok(()) => {
                    stats.pushed.fetch_add(1, Ordering::Relaxed);
                    trace!(group = %group, collection = %collection, id = %document.id, "Pushed document");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        group = %group,
                        collection = %collection,
                        id = %document.id,
                        error = %e,
                        "Relay push failed"
                    );
                }
            },
            Outbound::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Relay push worker stopped");
}
