use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Serialize;

use crate::error::ReplayError;
use crate::store::EventStore;
use crate::types::{Headers, NewReplayAttempt};

/// Result of one replay, returned to the caller and mirrored in the
/// recorded attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplayOutcome {
    /// True when the HTTP exchange completed, whatever its status.
    pub fn got_response(&self) -> bool {
        self.status.is_some()
    }
}

/// Resends stored events to caller-chosen URLs.
///
/// One attempt per call: no retry, and no timeout beyond the client's
/// default. An in-flight replay cannot be cancelled other than by dropping
/// the future.
#[derive(Clone)]
pub struct Replayer {
    store: Arc<EventStore>,
    client: reqwest::Client,
}

impl Replayer {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self::with_client(store, reqwest::Client::new())
    }

    pub fn with_client(store: Arc<EventStore>, client: reqwest::Client) -> Self {
        Self { store, client }
    }

    /// Replay event `event_id` to `target_url`.
    ///
    /// Validation failures return `Err` with nothing recorded. Every other
    /// path records exactly one attempt before returning.
    pub async fn replay(&self, event_id: u64, target_url: &str) -> Result<ReplayOutcome, ReplayError> {
        let event = self
            .store
            .get(event_id)
            .await
            .ok_or(ReplayError::EventNotFound(event_id))?;

        let target_url = target_url.trim();
        if target_url.is_empty() {
            return Err(ReplayError::MissingTargetUrl);
        }

        let result = self
            .client
            .post(target_url)
            .headers(forwarded_headers(&event.headers))
            .body(event.raw_body.as_bytes().to_vec())
            .send()
            .await;

        let outcome = match result {
            Ok(response) => {
                let status = response.status();
                let status_text = status.canonical_reason().unwrap_or_default().to_string();
                match response.text().await {
                    Ok(body) => ReplayOutcome {
                        success: status.is_success(),
                        status: Some(status.as_u16()),
                        error: (!status.is_success())
                            .then(|| format!("HTTP {}: {status_text}", status.as_u16())),
                        status_text: Some(status_text),
                        response_body: Some(body),
                    },
                    Err(e) => ReplayOutcome {
                        success: false,
                        status: Some(status.as_u16()),
                        status_text: Some(status_text),
                        response_body: None,
                        error: Some(format!("failed to read response body: {e}")),
                    },
                }
            }
            Err(e) => ReplayOutcome {
                success: false,
                status: None,
                status_text: None,
                response_body: None,
                error: Some(transport_error_message(&e)),
            },
        };

        self.store
            .add_replay_attempt(NewReplayAttempt {
                event_id: event.id,
                target_url: target_url.to_string(),
                status_code: outcome.status,
                response_body: outcome.response_body.clone(),
                success: outcome.success,
                error: outcome.error.clone(),
            })
            .await;

        if outcome.success {
            tracing::info!(event_id, target_url, status = ?outcome.status, "replayed webhook");
        } else {
            tracing::warn!(event_id, target_url, error = ?outcome.error, "webhook replay failed");
        }

        Ok(outcome)
    }
}

/// Headers sent on replay: a fresh `Content-Type: application/json` plus
/// every original header named `x-*` or `user-agent`. Everything else,
/// including the original content type and signature headers, is dropped.
pub fn forwarded_headers(original: &Headers) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, values) in original {
        let lower = name.to_ascii_lowercase();
        if !(lower.starts_with("x-") || lower == "user-agent") {
            continue;
        }
        let Ok(header_name) = HeaderName::from_bytes(lower.as_bytes()) else {
            tracing::debug!(header = %name, "skipping header with invalid name");
            continue;
        };
        for value in values.iter() {
            match HeaderValue::from_bytes(value.as_bytes()) {
                Ok(v) => {
                    out.append(header_name.clone(), v);
                }
                Err(_) => tracing::debug!(header = %name, "skipping header with invalid value"),
            }
        }
    }
    out.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    out
}

// reqwest's Display stops at the outermost error; include the causes so
// "connection refused" and friends reach the caller.
fn transport_error_message(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
