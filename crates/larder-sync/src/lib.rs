//! # Larder Sync
//!
//! Realtime-database style collection API over a local Larder store.
//!
//! ## Features
//!
//! - **CollectionSync**: subscribe to a collection with optional ordering and
//!   get the full snapshot right away and after every change
//! - **Cross-context notification**: [`ContextNotifier`] fans changes out to
//!   sibling contexts over a [`SiblingBus`] (same process) or a
//!   [`SlotWatcher`] (other processes sharing a slot directory)
//! - **RemoteRelay**: best-effort mirroring of local writes to a remote store
//!   scoped by a group id, with a pull of every collection on join
//! - **TypedCollection**: serde-typed views over raw documents
//! - **SyncEngine**: bootstrap everything from a TOML [`SyncConfig`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use larder_core::{Direction, order_by};
//! use larder_sync::{SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::open(SyncConfig::on_disk("./data")).await?;
//! let orders = engine.sync().sync_collection(
//!     "orders",
//!     |snapshot| println!("{} orders", snapshot.len()),
//!     Some(order_by("createdAt", Direction::Desc)),
//! )?;
//!
//! engine.sync().upsert_document("orders", "ORD-1", fields).await?;
//! orders.unsubscribe();
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod relay;
pub mod sibling;
pub mod sync;
pub mod typed;
pub mod watch;

pub use config::{ConfigError, RelayConfig, StorageConfig, SyncConfig};
pub use context::{ContextChannel, ContextNotifier};
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{SyncError, SyncResult};
pub use relay::{
    HttpRemoteStore, InMemoryRemoteStore, JoinReport, RelayState, RelayStats, RemoteRelay,
};
pub use sibling::{SiblingBus, SiblingLink};
pub use sync::CollectionSync;
pub use typed::TypedCollection;
pub use watch::SlotWatcher;

// Re-export the types callers need alongside the API
pub use larder_core::{Direction, Document, Fields, GroupId, OrderSpec, Subscription, order_by};
pub use larder_storage::UpdateOutcome;
