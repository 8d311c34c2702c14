//! Change notification
//!
//! A [`Notifier`] fans "collection X changed" out to subscribers, delivering
//! the fresh snapshot with every event. [`LocalNotifier`] is the same-context
//! implementation; cross-context channels live in `larder-sync` and are
//! composed behind the same trait.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::document::Document;

/// Callback invoked with a full collection snapshot.
pub type SnapshotHandler = Arc<dyn Fn(&[Document]) + Send + Sync>;

/// Publish/subscribe over collection names.
pub trait Notifier: Send + Sync {
    /// Wake every live subscriber of `collection` with `snapshot`.
    fn publish(&self, collection: &str, snapshot: &[Document]);

    /// Register `handler` for `collection`.
    ///
    /// The returned [`Subscription`] detaches the handler when unsubscribed
    /// or dropped.
    fn subscribe(&self, collection: &str, handler: SnapshotHandler) -> Subscription;
}

/// Handle to a live subscription.
///
/// After [`unsubscribe`](Self::unsubscribe) returns the handler is never
/// invoked again, even if a publish is being dispatched concurrently.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    collection: String,
    active: Arc<AtomicBool>,
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Create a subscription handle.
    ///
    /// `active` is the flag checked before every delivery; `detach` removes
    /// the handler from whatever registry holds it and runs at most once.
    pub fn new(
        collection: impl Into<String>,
        active: Arc<AtomicBool>,
        detach: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            collection: collection.into(),
            active,
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// Collection this subscription listens to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether the handler may still be invoked.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop delivery and detach. Idempotent.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);
        let detach = self.detach.lock().take();
        if let Some(detach) = detach {
            detach();
            trace!(collection = %self.collection, "Subscription detached");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("collection", &self.collection)
            .field("active", &self.is_active())
            .finish()
    }
}

/// A registered handler and its liveness flag.
pub struct SubscriberSlot {
    active: Arc<AtomicBool>,
    handler: SnapshotHandler,
}

impl SubscriberSlot {
    /// Create a live slot for `handler`.
    pub fn new(handler: SnapshotHandler) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            handler,
        }
    }

    /// Shared liveness flag, handed to the [`Subscription`].
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    /// Invoke the handler unless the slot was unsubscribed.
    pub fn deliver(&self, snapshot: &[Document]) {
        if self.active.load(Ordering::Acquire) {
            (self.handler)(snapshot);
        }
    }
}

impl fmt::Debug for SubscriberSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberSlot")
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

type Topics = DashMap<String, BTreeMap<u64, Arc<SubscriberSlot>>>;

/// Same-context notifier.
///
/// Handlers run on the publishing thread, outside any internal lock, in
/// subscription order. A handler may subscribe or unsubscribe re-entrantly.
#[derive(Debug, Default)]
pub struct LocalNotifier {
    topics: Arc<Topics>,
    next_id: AtomicU64,
}

impl LocalNotifier {
    /// Create an empty notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live handlers for a collection
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.topics.get(collection).map(|t| t.len()).unwrap_or(0)
    }

    /// Number of collections with at least one live handler
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn detach(topics: &Weak<Topics>, collection: &str, id: u64) {
        let Some(topics) = topics.upgrade() else {
            return;
        };
        if let Some(mut slots) = topics.get_mut(collection) {
            slots.remove(&id);
        }
        topics.remove_if(collection, |_, slots| slots.is_empty());
    }
}

impl Notifier for LocalNotifier {
    fn publish(&self, collection: &str, snapshot: &[Document]) {
        // Clone the slot list so handlers run without holding the shard lock.
        let slots: Vec<Arc<SubscriberSlot>> = match self.topics.get(collection) {
            Some(slots) => slots.values().cloned().collect(),
            None => return,
        };
        trace!(
            collection,
            subscribers = slots.len(),
            documents = snapshot.len(),
            "Publishing snapshot"
        );
        for slot in slots {
            slot.deliver(snapshot);
        }
    }

    fn subscribe(&self, collection: &str, handler: SnapshotHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let slot = Arc::new(SubscriberSlot::new(handler));
        let active = slot.active_flag();
        self.topics
            .entry(collection.to_string())
            .or_default()
            .insert(id, slot);

        let topics = Arc::downgrade(&self.topics);
        let name = collection.to_string();
        Subscription::new(collection, active, move || {
            LocalNotifier::detach(&topics, &name, id)
        })
    }
}
