//! HTTP relay server
//!
//! Each sync group gets its own [`DocumentStore`], created on first use.
//! Devices push documents with `PUT` (shallow-merged into the group's copy)
//! and bootstrap with `GET` on a collection.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use dashmap::DashMap;
use larder_core::{Document, GroupId, LocalNotifier};
use larder_storage::persistent::escape_slot;
use larder_storage::{DocumentStore, FileBackend, MemoryBackend, QuotaManager, StorageBackend};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Shared server state
#[derive(Debug)]
pub struct AppState {
    config: ServerConfig,
    groups: DashMap<GroupId, Arc<DocumentStore>>,
}

impl AppState {
    /// Create state for `config`
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            groups: DashMap::new(),
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of groups opened so far
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// The store for `group`, opening it on first use
    pub fn group_store(&self, group: &GroupId) -> Result<Arc<DocumentStore>, ServerError> {
        if let Some(store) = self.groups.get(group) {
            return Ok(Arc::clone(store.value()));
        }

        let backend: Arc<dyn StorageBackend> = match &self.config.data_dir {
            Some(root) => Arc::new(FileBackend::open(root.join(escape_slot(group.as_str())))?),
            None => Arc::new(MemoryBackend::new()),
        };
        let store = DocumentStore::new(backend, Arc::new(LocalNotifier::new()))
            .with_namespace(self.config.namespace.clone())
            .with_quota(QuotaManager::new(
                self.config.max_group_bytes,
                self.config.max_group_bytes,
            ));

        // A racing request may have opened the group first; keep theirs.
        let store = self
            .groups
            .entry(group.clone())
            .or_insert_with(|| Arc::new(store))
            .value()
            .clone();
        info!(group = %group, "Opened group store");
        Ok(store)
    }
}

/// Build the relay's router
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route(
            "/v1/groups/{group}/collections/{collection}/documents",
            get(list_documents),
        )
        .route(
            "/v1/groups/{group}/collections/{collection}/documents/{id}",
            put(put_document),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let listener = TcpListener::bind(config.bind).await?;
    let local_addr = listener.local_addr()?;
    let persistent = config.data_dir.is_some();
    let app = router(Arc::new(AppState::new(config)));

    info!(addr = %local_addr, persistent, "Relay server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Relay server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "groups": state.group_count(),
    }))
}

#[instrument(skip(state, body))]
async fn put_document(
    State(state): State<Arc<AppState>>,
    Path((group, collection, id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Document>, ServerError> {
    let group = parse_group(&group)?;
    check_collection(&collection)?;
    if id.trim().is_empty() {
        return Err(ServerError::BadRequest("document id must not be empty".into()));
    }
    let Value::Object(fields) = body else {
        return Err(ServerError::BadRequest("document body must be a JSON object".into()));
    };

    let store = state.group_store(&group)?;
    let stored = store.upsert(&collection, id.as_str(), fields)?;
    debug!(group = %group, collection = %collection, id = %stored.id, "Document stored");
    Ok(Json(stored))
}

#[instrument(skip(state))]
async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path((group, collection)): Path<(String, String)>,
) -> Result<Json<Vec<Document>>, ServerError> {
    let group = parse_group(&group)?;
    check_collection(&collection)?;
    let store = state.group_store(&group)?;
    Ok(Json(store.list(&collection)?))
}

fn parse_group(raw: &str) -> Result<GroupId, ServerError> {
    let group = GroupId::new(raw);
    if group.is_empty() {
        return Err(ServerError::BadRequest("group id must not be empty".into()));
    }
    Ok(group)
}

fn check_collection(collection: &str) -> Result<(), ServerError> {
    if collection.trim().is_empty() {
        return Err(ServerError::BadRequest("collection name must not be empty".into()));
    }
    Ok(())
}
