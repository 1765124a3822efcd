//! Shared helpers for HTTP-level tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::ServiceExt;

use webhook_playground::{router, AppState, EventStore, Ingestor, Replayer};

pub const SECRET: &str = "whsec_integration";

/// Replayer whose client ignores proxy settings, so loopback targets are
/// reached directly.
pub fn direct_replayer(store: Arc<EventStore>) -> Replayer {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    Replayer::with_client(store, client)
}

/// Build the app around a fresh in-memory store.
pub fn build_test_app(max_events: usize) -> (Router, Arc<EventStore>) {
    let store = Arc::new(EventStore::new(max_events));
    let state = AppState {
        store: store.clone(),
        ingestor: Ingestor::new(store.clone(), Some(SECRET.to_string())),
        replayer: direct_replayer(store.clone()),
    };
    (router(state), store)
}

/// POST raw bytes with extra headers and return status and JSON body.
pub async fn post_raw(
    app: Router,
    uri: &str,
    body: &[u8],
    headers: &[(&str, &str)],
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method("POST").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body.to_vec())).unwrap();
    send(app, request).await
}

pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let bytes = serde_json::to_vec(body).unwrap();
    post_raw(app, uri, &bytes, &[("content-type", "application/json")]).await
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn delete_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Send a request with arbitrary method and headers; return status and headers.
pub async fn send_headers_only(
    app: Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
    (response.status(), response.headers().clone())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };
    (status, json)
}

/// A request received by [`CaptureServer`].
#[derive(Debug, Clone)]
pub struct Captured {
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
struct CaptureState {
    received: Arc<Mutex<Vec<Captured>>>,
    status: StatusCode,
}

/// Replay target bound to 127.0.0.1:0 that records every request and
/// answers with a fixed status.
pub struct CaptureServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureServer {
    pub async fn start(status: StatusCode) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = CaptureState {
            received: received.clone(),
            status,
        };
        let app = Router::new()
            .route("/hook", post(record))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, received }
    }

    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    pub async fn received(&self) -> Vec<Captured> {
        self.received.lock().await.clone()
    }
}

async fn record(
    State(state): State<CaptureState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    state.received.lock().await.push(Captured { headers, body });
    (state.status, "captured")
}

/// An address with nothing listening on it.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/hook")
}
