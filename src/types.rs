use std::collections::BTreeMap;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::verification::VerificationResult;

/// Header name (lower-case) to the value or values received under it.
pub type Headers = BTreeMap<String, HeaderValues>;

/// One or more values received for a single header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValues {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValues {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            HeaderValues::Single(v) => std::slice::from_ref(v),
            HeaderValues::Multiple(vs) => vs,
        };
        values.iter().map(String::as_str)
    }

    pub fn first(&self) -> Option<&str> {
        self.iter().next()
    }

    /// Append another value, promoting a single value to a list.
    pub fn push(&mut self, value: String) {
        match self {
            HeaderValues::Single(existing) => {
                let first = std::mem::take(existing);
                *self = HeaderValues::Multiple(vec![first, value]);
            }
            HeaderValues::Multiple(vs) => vs.push(value),
        }
    }
}

/// Exact bytes of a captured payload.
///
/// Serialized as a plain string when the bytes are UTF-8 and as
/// `{"base64": "..."}` otherwise, so a snapshot never loses a byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBodyRepr", into = "RawBodyRepr")]
pub struct RawBody(Vec<u8>);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawBodyRepr {
    Text(String),
    Binary { base64: String },
}

impl RawBody {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for RawBody {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl From<RawBody> for RawBodyRepr {
    fn from(body: RawBody) -> Self {
        match String::from_utf8(body.0) {
            Ok(text) => RawBodyRepr::Text(text),
            Err(e) => RawBodyRepr::Binary {
                base64: base64::engine::general_purpose::STANDARD.encode(e.into_bytes()),
            },
        }
    }
}

impl TryFrom<RawBodyRepr> for RawBody {
    type Error = base64::DecodeError;

    fn try_from(repr: RawBodyRepr) -> Result<Self, Self::Error> {
        match repr {
            RawBodyRepr::Text(text) => Ok(Self(text.into_bytes())),
            RawBodyRepr::Binary { base64 } => base64::engine::general_purpose::STANDARD
                .decode(base64)
                .map(Self),
        }
    }
}

/// Best-effort structured view of a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    /// The payload parsed as JSON.
    Json(Value),
    /// The payload was not JSON; holds its text. Serialized as `{"raw": text}`.
    Raw(String),
}

impl Default for EventBody {
    fn default() -> Self {
        EventBody::Raw(String::new())
    }
}

impl EventBody {
    /// Parse a payload, falling back to the raw text when it is not JSON.
    pub fn parse(raw: &[u8]) -> Self {
        match serde_json::from_slice(raw) {
            Ok(value) => EventBody::Json(value),
            Err(_) => EventBody::Raw(String::from_utf8_lossy(raw).into_owned()),
        }
    }

    /// Look up a top-level field. Absent for raw bodies and non-object JSON.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            EventBody::Json(value) => value.as_object()?.get(name),
            EventBody::Raw(_) => None,
        }
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name)?.as_str()
    }
}

impl Serialize for EventBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EventBody::Json(value) => value.serialize(serializer),
            EventBody::Raw(text) => serde_json::json!({ "raw": text }).serialize(serializer),
        }
    }
}

/// Why verification passed or failed; empty when no check ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<VerificationResult> for VerificationDetails {
    fn from(result: VerificationResult) -> Self {
        Self {
            valid: Some(result.valid),
            timestamp: result.timestamp,
            error: result.error,
        }
    }
}

/// A captured webhook. Never mutated once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: u64,
    pub received_at: DateTime<Utc>,
    pub provider: String,
    pub headers: Headers,
    /// Re-derived from `raw_body` when loaded from a snapshot.
    #[serde(skip_deserializing)]
    pub body: EventBody,
    pub raw_body: RawBody,
    pub verified: bool,
    #[serde(default)]
    pub verification_details: VerificationDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

/// An event as built by ingestion, before the store assigns `id` and `received_at`.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub provider: String,
    pub headers: Headers,
    pub body: EventBody,
    pub raw_body: RawBody,
    pub verified: bool,
    pub verification_details: VerificationDetails,
    pub provider_event_id: Option<String>,
    pub event_type: Option<String>,
}

/// One outbound replay of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayAttempt {
    pub id: u64,
    pub event_id: u64,
    pub target_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub replayed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReplayAttempt {
    pub event_id: u64,
    pub target_url: String,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

/// Filters for listing events. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub provider: Option<String>,
    pub verified: Option<bool>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        self.provider.as_deref().is_none_or(|p| event.provider == p)
            && self.verified.is_none_or(|v| event.verified == v)
    }
}
