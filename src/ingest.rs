use std::sync::Arc;

use crate::store::EventStore;
use crate::types::{Event, EventBody, Headers, NewEvent, RawBody, VerificationDetails};
use crate::verification::{self, STRIPE_PROVIDER, STRIPE_SIGNATURE_HEADER};

/// Turns raw inbound requests into stored events.
///
/// Any provider tag is accepted. Only `stripe` traffic is verified, and only
/// when both a secret is configured and the request carries a signature
/// header; everything else is stored unverified.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<EventStore>,
    stripe_secret: Option<String>,
}

impl Ingestor {
    pub fn new(store: Arc<EventStore>, stripe_secret: Option<String>) -> Self {
        Self {
            store,
            stripe_secret: stripe_secret.filter(|s| !s.is_empty()),
        }
    }

    pub async fn ingest(&self, provider: &str, raw_body: Vec<u8>, headers: Headers) -> Event {
        let body = EventBody::parse(&raw_body);

        let mut verified = false;
        let mut verification_details = VerificationDetails::default();
        if provider == STRIPE_PROVIDER {
            let signature = headers
                .get(STRIPE_SIGNATURE_HEADER)
                .and_then(|v| v.first())
                .filter(|s| !s.is_empty());
            if let (Some(signature), Some(secret)) = (signature, self.stripe_secret.as_deref()) {
                let result = verification::verify_stripe_signature(&raw_body, signature, secret);
                verified = result.valid;
                verification_details = result.into();
            }
        }

        let provider_event_id = body.field("id").and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let event_type = body.field_str("type").map(str::to_string);

        let event = self
            .store
            .add(NewEvent {
                provider: provider.to_string(),
                headers,
                body,
                raw_body: RawBody::from(raw_body),
                verified,
                verification_details,
                provider_event_id,
                event_type,
            })
            .await;

        tracing::info!(
            provider = %event.provider,
            event_id = event.id,
            verified = event.verified,
            "Received {} webhook: {}",
            event.provider,
            event.id
        );
        event
    }
}
