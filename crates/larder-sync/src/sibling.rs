//! In-process channel between sibling contexts
//!
//! Several contexts (for example, several open windows) that share one
//! storage backend join the same [`SiblingBus`]. A publish in one context is
//! delivered to every *other* joined context's local subscribers, carrying
//! the full snapshot. The origin context already notified its own
//! subscribers, so it is skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use larder_core::{Document, LocalNotifier, Notifier};
use tracing::trace;

use crate::context::ContextChannel;

#[derive(Debug, Default)]
struct BusInner {
    contexts: DashMap<u64, Weak<LocalNotifier>>,
    next_id: AtomicU64,
}

/// Shared hub joining sibling contexts.
///
/// Cheap to clone; clones refer to the same hub.
#[derive(Debug, Clone, Default)]
pub struct SiblingBus {
    inner: Arc<BusInner>,
}

impl SiblingBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a context. Snapshots announced by other contexts are published
    /// on `local`; the returned link announces this context's snapshots.
    ///
    /// The context leaves the bus when the link is dropped.
    pub fn join(&self, local: &Arc<LocalNotifier>) -> SiblingLink {
        let context = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.contexts.insert(context, Arc::downgrade(local));
        trace!(context, "Context joined sibling bus");
        SiblingLink {
            inner: Arc::clone(&self.inner),
            context,
        }
    }

    /// Number of joined contexts that are still alive
    pub fn context_count(&self) -> usize {
        self.inner
            .contexts
            .iter()
            .filter(|e| e.value().strong_count() > 0)
            .count()
    }
}

/// One context's membership of a [`SiblingBus`].
#[derive(Debug)]
pub struct SiblingLink {
    inner: Arc<BusInner>,
    context: u64,
}

impl SiblingLink {
    /// Bus-local id of this context
    pub fn context_id(&self) -> u64 {
        self.context
    }
}

impl ContextChannel for SiblingLink {
    fn announce(&self, collection: &str, snapshot: &[Document]) {
        // Collect first so no shard lock is held while handlers run.
        let siblings: Vec<Arc<LocalNotifier>> = self
            .inner
            .contexts
            .iter()
            .filter(|e| *e.key() != self.context)
            .filter_map(|e| e.value().upgrade())
            .collect();
        trace!(
            origin = self.context,
            collection,
            siblings = siblings.len(),
            "Announcing snapshot to siblings"
        );
        for sibling in siblings {
            sibling.publish(collection, snapshot);
        }
    }
}

impl Drop for SiblingLink {
    fn drop(&mut self) {
        self.inner.contexts.remove(&self.context);
        trace!(context = self.context, "Context left sibling bus");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;

    fn recorder(local: &LocalNotifier, collection: &str) -> (Arc<Mutex<Vec<usize>>>, larder_core::Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = local.subscribe(
            collection,
            Arc::new(move |s: &[Document]| sink.lock().push(s.len())),
        );
        (seen, sub)
    }

    #[test]
    fn test_announce_skips_origin() {
        let bus = SiblingBus::new();
        let a = Arc::new(LocalNotifier::new());
        let b = Arc::new(LocalNotifier::new());
        let link_a = bus.join(&a);
        let _link_b = bus.join(&b);

        let (seen_a, _sa) = recorder(&a, "orders");
        let (seen_b, _sb) = recorder(&b, "orders");

        let doc = Document::from_fields("ORD-1", Utc::now(), Default::default());
        link_a.announce("orders", &[doc]);

        assert!(seen_a.lock().is_empty());
        assert_eq!(*seen_b.lock(), vec![1]);
    }

    #[test]
    fn test_dropped_link_leaves_bus() {
        let bus = SiblingBus::new();
        let a = Arc::new(LocalNotifier::new());
        let b = Arc::new(LocalNotifier::new());
        let link_a = bus.join(&a);
        let link_b = bus.join(&b);
        assert_eq!(bus.context_count(), 2);

        let (seen_b, _sb) = recorder(&b, "orders");
        drop(link_b);
        assert_eq!(bus.context_count(), 1);

        link_a.announce("orders", &[]);
        assert!(seen_b.lock().is_empty());
    }

    #[test]
    fn test_dead_context_is_ignored() {
        let bus = SiblingBus::new();
        let a = Arc::new(LocalNotifier::new());
        let link_a = bus.join(&a);
        {
            let b = Arc::new(LocalNotifier::new());
            let _link_b = bus.join(&b);
            std::mem::forget(_link_b);
        }
        // b's notifier is gone even though its link was leaked.
        assert_eq!(bus.context_count(), 1);
        link_a.announce("orders", &[]);
    }
}
