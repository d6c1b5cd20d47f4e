//! End-to-end refresh and replay over real HTTP against a mock backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use shopdesk_client::{
    ApiRequest, ClientConfig, ClientError, CredentialPair, CredentialStore, FileCredentialStore,
    Location, Role, Session, ShopdeskClient,
};

struct Backend {
    valid_access: Mutex<String>,
    refresh_ok: bool,
    refresh_calls: AtomicUsize,
    order_calls: AtomicUsize,
}

impl Backend {
    fn new(refresh_ok: bool) -> Arc<Self> {
        Arc::new(Self {
            // Whatever the client starts with is already expired.
            valid_access: Mutex::new("A-current".into()),
            refresh_ok,
            refresh_calls: AtomicUsize::new(0),
            order_calls: AtomicUsize::new(0),
        })
    }
}

async fn refresh(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;

    if !backend.refresh_ok || body["refresh"] != "R1" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": "INVALID_REFRESH_TOKEN", "message": "Refresh token expired" })),
        )
            .into_response();
    }

    *backend.valid_access.lock() = "A2".into();
    Json(json!({ "access": "A2" })).into_response()
}

async fn orders(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.order_calls.fetch_add(1, Ordering::SeqCst);

    let expected = format!("Bearer {}", backend.valid_access.lock());
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);

    if authorized {
        Json(json!({ "orders": [{ "id": 1 }, { "id": 2 }] })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Token expired" }))).into_response()
    }
}

async fn login() -> Json<Value> {
    Json(json!({
        "access": "A-current",
        "refresh": "R1",
        "user": { "id": "7", "role": "staff", "displayName": "Sam" }
    }))
}

async fn spawn_backend(backend: Arc<Backend>) -> String {
    let app = Router::new()
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/login", post(login))
        .route("/api/orders", get(orders))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    format!("http://{addr}")
}

fn seed_session(path: &std::path::Path) {
    FileCredentialStore::open(path)
        .begin(Session::new(CredentialPair::new("A1", "R1"), None))
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_401s_refresh_once_over_http() {
    let backend = Backend::new(true);
    let url = spawn_backend(backend.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let credential_file = dir.path().join("session.json");
    seed_session(&credential_file);

    let location = Arc::new(Location::new("/orders"));
    let config = ClientConfig::new(url.parse().unwrap()).with_credential_file(&credential_file);
    let client = ShopdeskClient::from_config(config, location.clone()).unwrap();

    let calls = (0..3).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.get_json::<Value>("/api/orders").await })
    });
    let mut results = Vec::new();
    for call in calls.collect::<Vec<_>>() {
        results.push(call.await.unwrap());
    }

    for result in results {
        assert_eq!(result.unwrap()["orders"][1]["id"], 2);
    }
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.order_calls.load(Ordering::SeqCst), 6);
    assert_eq!(location.current(), "/orders");

    // The refreshed pair was persisted, refresh credential unchanged.
    let reopened = FileCredentialStore::open(&credential_file).get().unwrap();
    assert_eq!(reopened.access.expose_secret(), "A2");
    assert_eq!(reopened.refresh.expose_secret(), "R1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_refresh_over_http_ends_session() {
    let backend = Backend::new(false);
    let url = spawn_backend(backend.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let credential_file = dir.path().join("session.json");
    seed_session(&credential_file);

    let location = Arc::new(Location::new("/orders"));
    let config = ClientConfig::new(url.parse().unwrap()).with_credential_file(&credential_file);
    let client = ShopdeskClient::from_config(config, location.clone()).unwrap();

    let (a, b) = tokio::join!(
        client.execute(ApiRequest::get("/api/orders")),
        client.execute(ApiRequest::get("/api/orders")),
    );

    assert!(matches!(a, Err(ClientError::AuthExpired)));
    assert!(matches!(b, Err(ClientError::AuthExpired)));
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    // No replays: only the two original attempts reached the backend.
    assert_eq!(backend.order_calls.load(Ordering::SeqCst), 2);
    assert_eq!(location.current(), "/login");
    assert!(client.store().session().is_none());
    assert!(!credential_file.exists());
}

#[tokio::test]
async fn test_login_over_http() {
    let backend = Backend::new(true);
    let url = spawn_backend(backend.clone()).await;

    let client = ShopdeskClient::from_config(
        ClientConfig::new(url.parse().unwrap()),
        Arc::new(Location::new("/login")),
    )
    .unwrap();

    let claims = client.login("sam", "hunter2").await.unwrap();
    assert_eq!(claims.role, Role::Staff);
    assert_eq!(claims.display_name, "Sam");

    let orders: Value = client.get_json("/api/orders").await.unwrap();
    assert_eq!(orders["orders"][0]["id"], 1);
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);
}
