//! Multi-device convergence through a remote store

use std::sync::Arc;
use std::time::Duration;

use larder_core::RemoteStore;
use larder_relay::{AppState, ServerConfig};
use larder_sync::{
    Fields, GroupId, HttpRemoteStore, InMemoryRemoteStore, RelayConfig, RelayState, SyncConfig,
    SyncEngine,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn grouped(group: &str) -> SyncConfig {
    SyncConfig::in_memory().with_relay(RelayConfig::default().with_group(group))
}

async fn device(remote: &Arc<dyn RemoteStore>, config: SyncConfig) -> SyncEngine {
    SyncEngine::builder(config)
        .with_remote(Arc::clone(remote))
        .open()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_fresh_device_bootstraps_from_group() {
    let shared = Arc::new(InMemoryRemoteStore::new());
    let remote: Arc<dyn RemoteStore> = shared.clone();

    let phone = device(&remote, grouped("shop-1")).await;
    assert_eq!(phone.relay().unwrap().state(), RelayState::Active);
    phone
        .sync()
        .upsert_document("orders", "ORD-1", fields(json!({ "status": "Pending", "isLoggedIn": true })))
        .await
        .unwrap();
    phone
        .sync()
        .upsert_document("products", "p-1", fields(json!({ "name": "Gas 11kg" })))
        .await
        .unwrap();
    phone.flush().await;

    let pushed = shared.documents(&GroupId::new("shop-1"), "orders");
    assert_eq!(pushed.len(), 1);
    assert!(!pushed[0].data.contains_key("isLoggedIn"));

    let laptop = device(&remote, grouped("shop-1")).await;
    let orders = laptop.store().list("orders").unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].data["status"], "Pending");
    assert_eq!(laptop.store().list("products").unwrap().len(), 1);
}

#[tokio::test]
async fn test_unavailable_remote_never_fails_local_write() {
    let shared = Arc::new(InMemoryRemoteStore::new());
    shared.set_available(false);
    let remote: Arc<dyn RemoteStore> = shared.clone();

    let engine = device(&remote, grouped("shop-1")).await;
    let relay = engine.relay().unwrap();
    // Pulls failed but membership is still established.
    assert_eq!(relay.state(), RelayState::Active);

    let stored = engine
        .sync()
        .upsert_document("orders", "o-1", fields(json!({ "total": 5 })))
        .await
        .unwrap();
    assert_eq!(stored.data["total"], 5);
    engine.flush().await;
    assert_eq!(relay.stats().failed(), 1);
    assert_eq!(relay.stats().pushed(), 0);
    assert_eq!(engine.store().list("orders").unwrap().len(), 1);
}

#[tokio::test]
async fn test_local_only_until_joined() {
    let shared = Arc::new(InMemoryRemoteStore::new());
    let remote: Arc<dyn RemoteStore> = shared.clone();
    let engine = device(&remote, SyncConfig::in_memory()).await;
    let group = GroupId::new("shop-2");

    engine
        .sync()
        .upsert_document("users", "u-1", fields(json!({ "name": "Kofi" })))
        .await
        .unwrap();
    engine.flush().await;
    assert_eq!(shared.upsert_count(), 0);

    let report = engine.join(group.clone()).await.unwrap();
    assert!(report.is_complete());
    engine
        .sync()
        .update_document("users", "u-1", fields(json!({ "phone": "024" })))
        .await
        .unwrap();
    engine.flush().await;

    let remote_users = shared.documents(&group, "users");
    assert_eq!(remote_users.len(), 1);
    assert_eq!(remote_users[0].data["name"], "Kofi");
    assert_eq!(remote_users[0].data["phone"], "024");

    engine.leave();
    engine
        .sync()
        .upsert_document("users", "u-2", fields(json!({ "name": "Esi" })))
        .await
        .unwrap();
    engine.flush().await;
    assert_eq!(shared.documents(&group, "users").len(), 1);
}

#[tokio::test]
async fn test_deletes_stay_local() {
    let shared = Arc::new(InMemoryRemoteStore::new());
    let remote: Arc<dyn RemoteStore> = shared.clone();
    let engine = device(&remote, grouped("shop-3")).await;

    engine
        .sync()
        .upsert_document("orders", "o-1", fields(json!({ "total": 1 })))
        .await
        .unwrap();
    engine.sync().delete_document("orders", "o-1").await.unwrap();
    engine.flush().await;

    assert!(engine.store().list("orders").unwrap().is_empty());
    assert_eq!(shared.documents(&GroupId::new("shop-3"), "orders").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_round_trip_through_relay_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = larder_relay::router(Arc::new(AppState::new(ServerConfig::default())));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let endpoint = format!("http://{addr}/");
    let remote: Arc<dyn RemoteStore> =
        Arc::new(HttpRemoteStore::new(&endpoint, Duration::from_secs(5)).unwrap());

    let phone = device(&remote, grouped("shop-http")).await;
    phone
        .sync()
        .upsert_document("settings", "currency", fields(json!({ "value": "GHS" })))
        .await
        .unwrap();
    phone.flush().await;
    assert_eq!(phone.relay().unwrap().stats().pushed(), 1);

    let config = SyncConfig::in_memory().with_relay(
        RelayConfig::default()
            .with_endpoint(endpoint)
            .with_group("shop-http"),
    );
    let laptop = SyncEngine::open(config).await.unwrap();
    let settings = laptop.store().list("settings").unwrap();
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0].id.as_str(), "currency");
    assert_eq!(settings[0].data["value"], "GHS");
}
