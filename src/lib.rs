//! Capture, verify, retain and replay webhooks.
//!
//! Point a webhook sender at `/api/webhook/{provider}`; every request is
//! stored (at most `MAX_EVENTS`, oldest evicted first) with its exact raw
//! bytes. Stripe-style signatures are checked when a secret is configured.
//! Any stored event can be resent byte-for-byte to another URL, and each
//! replay is recorded whatever its outcome.
//!
//! ## Known limitations
//! - Signature timestamps are not checked for freshness.
//! - Replays are single-shot: no retry, no timeout beyond the HTTP client's
//!   default, and no cancellation once started.
//! - The capture endpoint is unauthenticated; this is a local developer tool.

pub mod config;
pub mod error;
pub mod http_server;
pub mod ingest;
pub mod replay;
pub mod store;
pub mod types;
pub mod verification;

pub use config::Config;
pub use error::{ApiError, AppError, ReplayError, StoreError};
pub use http_server::{router, AppState};
pub use ingest::Ingestor;
pub use replay::{ReplayOutcome, Replayer};
pub use store::{EventStore, DEFAULT_MAX_EVENTS};
pub use types::{
    Event, EventBody, EventFilter, HeaderValues, Headers, NewEvent, NewReplayAttempt, RawBody,
    ReplayAttempt, VerificationDetails,
};
pub use verification::{compute_stripe_signature, verify_stripe_signature, VerificationResult};
