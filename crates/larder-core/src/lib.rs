//! # Larder Core
//!
//! Core types and traits for the Larder local-first sync engine.
//!
//! This crate holds the pieces every other Larder crate agrees on, so that
//! storage backends, notifiers and remote stores can be swapped freely.
//!
//! ## Key Types
//!
//! - [`Document`]: a record with an `id`/`lastUpdated` envelope around a payload
//! - [`OrderSpec`]: single-field, stable ordering of snapshots
//! - [`GroupId`]: opaque scope of a remote sync group
//!
//! ## Key Traits
//!
//! - [`Notifier`]: collection-level publish/subscribe ([`LocalNotifier`] is the
//!   same-context implementation)
//! - [`RemoteStore`]: the two-operation remote wire contract
//! - [`Clock`]: time abstraction for testability

pub mod clock;
pub mod collections;
pub mod document;
pub mod error;
pub mod notifier;
pub mod order;
pub mod remote;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{
    Document, DocumentId, Fields, ID_FIELD, LAST_UPDATED_FIELD, to_fields,
};
pub use error::{RelayError, StorageError};
pub use notifier::{LocalNotifier, Notifier, SnapshotHandler, SubscriberSlot, Subscription};
pub use order::{Direction, OrderSpec, compare_values, order_by};
pub use remote::{GroupId, RemoteStore};
