//! # Larder Relay
//!
//! HTTP server holding the shared copy of every sync group's collections.
//!
//! ## Routes
//!
//! | method | path | purpose |
//! |--------|------|---------|
//! | `PUT`  | `/v1/groups/{group}/collections/{collection}/documents/{id}` | shallow-merge a document, returns the stored copy |
//! | `GET`  | `/v1/groups/{group}/collections/{collection}/documents` | every document in the collection |
//! | `GET`  | `/health` | liveness and number of open groups |
//!
//! Groups are isolated: each is backed by its own document store, in memory
//! or under `<data_dir>/<group>`.

pub mod config;
pub mod error;
pub mod server;

pub use config::{DEFAULT_BIND, ServerConfig};
pub use error::ServerError;
pub use server::{AppState, router, serve};
