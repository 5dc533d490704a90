//! End-to-end relay tests against a local stand-in for the EDStS API.
//!
//! The relay uses the real reqwest transport; an axum server on an ephemeral
//! port records what arrives.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use edsts_relay::{AuxState, HttpTransport, JournalEvent, Relay, RelayConfig, Route, SettingsStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct ReceivedPost {
    api_key: Option<String>,
    permissions: Option<String>,
    content_type: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct StandIn {
    valid: Arc<Mutex<Value>>,
    journal_status: Arc<AtomicU16>,
    verified_keys: Arc<Mutex<Vec<String>>>,
    posts: Arc<Mutex<Vec<ReceivedPost>>>,
}

impl StandIn {
    fn new() -> Self {
        Self {
            valid: Arc::new(Mutex::new(json!(true))),
            journal_status: Arc::new(AtomicU16::new(200)),
            verified_keys: Arc::new(Mutex::new(Vec::new())),
            posts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn posts(&self) -> Vec<ReceivedPost> {
        self.posts.lock().unwrap().clone()
    }
}

async fn verify(State(s): State<StandIn>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    if let Some(key) = query.get("key") {
        s.verified_keys.lock().unwrap().push(key.clone());
    }
    let valid = s.valid.lock().unwrap().clone();
    Json(json!({ "valid": valid }))
}

async fn journal(State(s): State<StandIn>, headers: HeaderMap, Json(body): Json<Value>) -> StatusCode {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    s.posts.lock().unwrap().push(ReceivedPost {
        api_key: header("x-api-key"),
        permissions: header("x-permissions"),
        content_type: header("content-type"),
        body,
    });
    StatusCode::from_u16(s.journal_status.load(Ordering::SeqCst)).unwrap()
}

/// Serve the stand-in on 127.0.0.1 and return a config pointing at it.
async fn spawn_stand_in(state: StandIn) -> RelayConfig {
    let app = Router::new()
        .route("/api/auth/verify", get(verify))
        .route("/api/journal/event", post(journal))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = RelayConfig::default();
    config.api.base_url = format!("http://{addr}");
    config.schedule.poll_interval_secs = 1;
    config.schedule.failure_backoff_secs = 0;
    config.schedule.shutdown_join_timeout_secs = 1;
    config
}

fn relay_for(config: &RelayConfig, store: &Arc<SettingsStore>) -> Relay {
    let transport = Arc::new(HttpTransport::new(&config.api).unwrap());
    Relay::new(config, store.clone(), transport).unwrap()
}

/// Start the relay and wait for the timer's first key check.
async fn start_and_settle(relay: &Relay) -> bool {
    assert!(relay.start());
    tokio::time::timeout(Duration::from_secs(5), async {
        while relay.connection().last_checked.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("start() should check the key without a credential update");
    relay.is_connected()
}

fn event(value: Value) -> JournalEvent {
    JournalEvent::from_value(value).unwrap()
}

async fn wait_for_posts(stand_in: &StandIn, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while stand_in.posts.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stand-in did not receive the expected posts");
}

#[tokio::test]
async fn docked_event_is_posted_exactly_once() {
    let stand_in = StandIn::new();
    let config = spawn_stand_in(stand_in.clone()).await;
    let store = Arc::new(SettingsStore::new());
    store.set_api_key("cmdr-key");
    let relay = relay_for(&config, &store);

    assert!(start_and_settle(&relay).await);

    let docked = json!({
        "timestamp": "3310-05-01T10:00:00Z",
        "event": "Docked",
        "StationName": "K7Q-B0Z",
        "StationType": "FleetCarrier"
    });
    assert_eq!(relay.on_event(event(docked.clone()), AuxState::new()), Route::FleetCarrier);

    wait_for_posts(&stand_in, 1).await;
    relay.stop().await;

    let posts = stand_in.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].api_key.as_deref(), Some("cmdr-key"));
    assert_eq!(posts[0].permissions.as_deref(), Some("EDStS"));
    assert!(posts[0].content_type.as_deref().unwrap().starts_with("application/json"));
    assert_eq!(posts[0].body, docked);
    let verified = stand_in.verified_keys.lock().unwrap().clone();
    assert!(!verified.is_empty());
    assert!(verified.iter().all(|k| k == "cmdr-key"));
    assert_eq!(relay.health().fleet_carrier.delivered, 1);
}

#[tokio::test]
async fn general_events_carry_configured_permissions() {
    let stand_in = StandIn::new();
    *stand_in.valid.lock().unwrap() = json!("TRUE");
    let config = spawn_stand_in(stand_in.clone()).await;
    let store = Arc::new(SettingsStore::new());
    store.set_api_key("cmdr-key");
    store.set_permissions("squadron, market,");
    let relay = relay_for(&config, &store);

    assert!(start_and_settle(&relay).await);

    let aux = AuxState::new().with(AuxState::SHIP_ID, 5);
    assert_eq!(
        relay.on_event(event(json!({"event": "FSDJump", "StarSystem": "Sol"})), aux),
        Route::General
    );
    wait_for_posts(&stand_in, 1).await;
    relay.stop().await;

    let post = &stand_in.posts()[0];
    assert_eq!(post.permissions.as_deref(), Some("EDStS,squadron,market"));
    // General pipeline never enriches
    assert_eq!(post.body, json!({"event": "FSDJump", "StarSystem": "Sol"}));
}

#[tokio::test]
async fn fleet_carrier_events_are_enriched() {
    let stand_in = StandIn::new();
    let config = spawn_stand_in(stand_in.clone()).await;
    let store = Arc::new(SettingsStore::new());
    store.set_api_key("cmdr-key");
    let relay = relay_for(&config, &store);

    assert!(start_and_settle(&relay).await);

    let aux = AuxState::new()
        .with(AuxState::SHIP_ID, 12)
        .with(AuxState::SYSTEM_ADDRESS, 2_789_153_444_971_u64);
    relay.on_event(event(json!({"event": "CarrierJump", "StarSystem": "HIP 58832"})), aux);
    wait_for_posts(&stand_in, 1).await;
    relay.stop().await;

    let body = &stand_in.posts()[0].body;
    assert_eq!(body["_shipId"], json!(12));
    assert_eq!(body["_systemAddress"], json!(2_789_153_444_971_u64));
}

#[tokio::test]
async fn rejected_key_sends_nothing() {
    let stand_in = StandIn::new();
    *stand_in.valid.lock().unwrap() = json!("false");
    let config = spawn_stand_in(stand_in.clone()).await;
    let store = Arc::new(SettingsStore::new());
    store.set_api_key("stale-key");
    let relay = relay_for(&config, &store);

    assert!(!start_and_settle(&relay).await);
    assert_eq!(relay.on_event(event(json!({"event": "Docked"})), AuxState::new()), Route::Ignored);

    tokio::time::sleep(Duration::from_millis(200)).await;
    relay.stop().await;
    assert!(stand_in.posts().is_empty());
    assert_eq!(relay.health().skipped_disconnected, 1);
}

#[tokio::test]
async fn unauthorized_submission_disconnects_relay() {
    let stand_in = StandIn::new();
    stand_in.journal_status.store(401, Ordering::SeqCst);
    let config = spawn_stand_in(stand_in.clone()).await;
    let store = Arc::new(SettingsStore::new());
    store.set_api_key("revoked-key");
    let relay = relay_for(&config, &store);

    assert!(start_and_settle(&relay).await);
    relay.on_event(event(json!({"event": "Undocked"})), AuxState::new());

    tokio::time::timeout(Duration::from_secs(5), async {
        while relay.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("401 should flip the relay to disconnected");

    assert_eq!(relay.on_event(event(json!({"event": "Undocked"})), AuxState::new()), Route::Ignored);
    relay.stop().await;

    assert_eq!(stand_in.posts().len(), 1);
    assert_eq!(relay.health().fleet_carrier.unauthorized, 1);
}

#[tokio::test]
async fn unreachable_service_fails_closed() {
    // Bind then drop so the port is closed
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = RelayConfig::default();
    config.api.base_url = format!("http://{addr}");
    let store = Arc::new(SettingsStore::new());
    store.set_api_key("cmdr-key");
    let relay = relay_for(&config, &store);

    assert!(!relay.credential_updated().await);
    assert!(!relay.is_connected());
    assert!(relay.connection().last_checked.is_some());
}
