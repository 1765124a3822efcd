use crate::error::{ApiError, AppError};
use crate::ingest::Ingestor;
use crate::replay::Replayer;
use crate::store::EventStore;
use crate::types::{Event, EventFilter, HeaderValues, Headers, ReplayAttempt};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Provider tag used when the capture path names none.
pub const DEFAULT_PROVIDER: &str = "generic";

/// Components shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EventStore>,
    pub ingestor: Ingestor,
    pub replayer: Replayer,
}

impl AppState {
    pub fn new(store: Arc<EventStore>, stripe_secret: Option<String>) -> Self {
        Self {
            ingestor: Ingestor::new(store.clone(), stripe_secret),
            replayer: Replayer::new(store.clone()),
            store,
        }
    }
}

/// The capture UI runs on another origin, so every route answers CORS
/// preflights and allows any origin.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/webhook", post(capture_default))
        .route("/api/webhook/", post(capture_default))
        .route("/api/webhook/{*provider}", post(capture))
        .route("/api/events", get(list_events).delete(clear_events))
        .route("/api/events/{id}", get(get_event))
        .route("/api/replay/{id}", post(replay_event))
        .route("/api/replay/history/{id}", get(replay_history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve in the background. Returns the bound address,
/// which differs from `addr` when port 0 was requested.
pub async fn start(addr: SocketAddr, state: AppState) -> Result<(SocketAddr, JoinHandle<()>), AppError> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!(%local, "webhook endpoint: http://{local}/api/webhook/:provider");

    let app = router(state);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    Ok((local, handle))
}

/// Group request headers by name, keeping repeated values in order.
///
/// Values are stored as text. UTF-8 values are kept exactly; bytes that are
/// not valid UTF-8 (legal `obs-text`, rare in practice) are replaced with
/// U+FFFD, so such a header is not replayed byte-for-byte.
pub fn capture_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match headers.get_mut(name.as_str()) {
            Some(existing) => existing.push(value),
            None => {
                headers.insert(name.as_str().to_string(), HeaderValues::Single(value));
            }
        }
    }
    headers
}

fn parse_event_id(raw: &str) -> Result<u64, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::Validation("Invalid event ID".to_string()))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let event_count = state.store.count().await;
    Json(json!({
        "status": "ok",
        "eventCount": event_count,
        "maxEvents": state.store.max_events(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn capture_default(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    ingest(&state, DEFAULT_PROVIDER, &headers, body).await
}

async fn capture(
    Path(provider): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    // Only the first path segment names the provider.
    let provider = provider
        .split('/')
        .next()
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PROVIDER);
    ingest(&state, provider, &headers, body).await
}

async fn ingest(state: &AppState, provider: &str, headers: &HeaderMap, body: Bytes) -> Json<Value> {
    let event = state
        .ingestor
        .ingest(provider, body.to_vec(), capture_headers(headers))
        .await;

    Json(json!({
        "success": true,
        "eventId": event.id,
        "message": "Webhook received successfully",
    }))
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    events: Vec<Event>,
    total: usize,
}

#[derive(Debug, Serialize)]
struct AttemptsResponse {
    attempts: Vec<ReplayAttempt>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    provider: Option<String>,
    verified: Option<String>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let verified = match query.verified.as_deref() {
        None | Some("") => None,
        Some("true") => Some(true),
        Some("false") => Some(false),
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "verified must be \"true\" or \"false\", got {other:?}"
            )));
        }
    };
    let filter = EventFilter {
        provider: query.provider.filter(|p| !p.is_empty()),
        verified,
    };

    let events = state.store.list(&filter).await;
    let total = events.len();
    Ok(Json(EventsResponse { events, total }))
}

async fn clear_events(State(state): State<AppState>) -> Json<Value> {
    let count = state.store.clear_all().await;
    tracing::info!(count, "cleared events");
    Json(json!({
        "success": true,
        "count": count,
        "message": format!("Cleared {count} events"),
    }))
}

async fn get_event(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Event>, ApiError> {
    let id = parse_event_id(&id)?;
    let event = state
        .store
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;
    Ok(Json(event))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayRequest {
    #[serde(default)]
    target_url: Option<String>,
}

async fn replay_event(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let id = parse_event_id(&id)?;
    // An unparseable body is treated like one without a target URL.
    let request: ReplayRequest = serde_json::from_slice(&body).unwrap_or_default();
    let target_url = request.target_url.unwrap_or_default();

    let outcome = state.replayer.replay(id, &target_url).await?;
    let status = if outcome.got_response() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(outcome)).into_response())
}

async fn replay_history(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AttemptsResponse>, ApiError> {
    let id = parse_event_id(&id)?;
    let attempts = state.store.list_replay_attempts(id).await;
    let total = attempts.len();
    Ok(Json(AttemptsResponse { attempts, total }))
}
