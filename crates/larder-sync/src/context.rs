//! Composing same-context and cross-context notification
//!
//! A [`ContextNotifier`] is what a store publishes on. It fans every publish
//! out to this context's subscribers and announces it on each attached
//! [`ContextChannel`], so sibling contexts learn about the change too.
//! Subscribers never see which path a snapshot arrived by.

use std::sync::Arc;

use larder_core::{Document, LocalNotifier, Notifier, SnapshotHandler, Subscription};
use parking_lot::RwLock;

/// Outbound half of a cross-context channel.
///
/// Inbound delivery is the channel's own business: it feeds received
/// snapshots into the receiving context's [`LocalNotifier`].
pub trait ContextChannel: Send + Sync {
    /// Tell sibling contexts that `collection` now holds `snapshot`.
    fn announce(&self, collection: &str, snapshot: &[Document]);
}

/// Local fan-out plus any number of cross-context channels.
pub struct ContextNotifier {
    local: Arc<LocalNotifier>,
    channels: RwLock<Vec<Arc<dyn ContextChannel>>>,
}

impl ContextNotifier {
    /// Create a notifier around a context's local fan-out.
    pub fn new(local: Arc<LocalNotifier>) -> Self {
        Self {
            local,
            channels: RwLock::new(Vec::new()),
        }
    }

    /// Attach a cross-context channel.
    pub fn attach(&self, channel: Arc<dyn ContextChannel>) {
        self.channels.write().push(channel);
    }

    /// This context's local fan-out.
    pub fn local(&self) -> &Arc<LocalNotifier> {
        &self.local
    }

    /// Number of attached channels.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }
}

impl Notifier for ContextNotifier {
    fn publish(&self, collection: &str, snapshot: &[Document]) {
        self.local.publish(collection, snapshot);
        let channels: Vec<Arc<dyn ContextChannel>> = self.channels.read().clone();
        for channel in channels {
            channel.announce(collection, snapshot);
        }
    }

    fn subscribe(&self, collection: &str, handler: SnapshotHandler) -> Subscription {
        self.local.subscribe(collection, handler)
    }
}

impl std::fmt::Debug for ContextNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextNotifier")
            .field("local", &self.local)
            .field("channels", &self.channel_count())
            .finish()
    }
}
