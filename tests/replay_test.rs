//! Replay tests against a real capture server on the loopback interface.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use webhook_playground::{
    EventStore, Headers, HeaderValues, Ingestor, ReplayError, Replayer, DEFAULT_MAX_EVENTS,
};

fn pipeline() -> (Arc<EventStore>, Ingestor, Replayer) {
    let store = Arc::new(EventStore::new(DEFAULT_MAX_EVENTS));
    let ingestor = Ingestor::new(store.clone(), Some(common::SECRET.to_string()));
    let replayer = common::direct_replayer(store.clone());
    (store, ingestor, replayer)
}

fn original_headers() -> Headers {
    [
        ("host", "localhost:3001"),
        ("content-type", "text/plain"),
        ("content-length", "22"),
        ("stripe-signature", "t=1,v1=00"),
        ("authorization", "Bearer secret"),
        ("user-agent", "Stripe/1.0 (+https://stripe.com/docs/webhooks)"),
        ("x-github-delivery", "72d3162e"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), HeaderValues::Single(v.to_string())))
    .collect()
}

#[tokio::test]
async fn replay_forwards_exact_bytes_and_filtered_headers() {
    let target = common::CaptureServer::start(StatusCode::OK).await;
    let (store, ingestor, replayer) = pipeline();

    // Deliberately non-canonical JSON and then plain text.
    for raw in [&b"{ \"b\":1,   \"a\" : 2 }"[..], &b"not valid json\n"[..]] {
        let event = ingestor.ingest("github", raw.to_vec(), original_headers()).await;
        let outcome = replayer.replay(event.id, &target.url()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.status, Some(200));
        assert_eq!(outcome.status_text.as_deref(), Some("OK"));
        assert_eq!(outcome.response_body.as_deref(), Some("captured"));

        let received = target.received().await;
        let last = received.last().unwrap();
        assert_eq!(&last.body[..], raw);

        let headers = &last.headers;
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["user-agent"], "Stripe/1.0 (+https://stripe.com/docs/webhooks)");
        assert_eq!(headers["x-github-delivery"], "72d3162e");
        assert!(headers.get("stripe-signature").is_none());
        assert!(headers.get("authorization").is_none());
        assert_ne!(headers["host"], "localhost:3001");

        let attempts = store.list_replay_attempts(event.id).await;
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].success);
        assert_eq!(attempts[0].status_code, Some(200));
    }
}

#[tokio::test]
async fn non_2xx_response_is_recorded_as_failed_outcome() {
    let target = common::CaptureServer::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let (store, ingestor, replayer) = pipeline();
    let event = ingestor.ingest("generic", b"{}".to_vec(), Headers::new()).await;

    let outcome = replayer.replay(event.id, &target.url()).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.status, Some(500));
    assert_eq!(outcome.error.as_deref(), Some("HTTP 500: Internal Server Error"));
    assert_eq!(outcome.response_body.as_deref(), Some("captured"));

    let attempts = store.list_replay_attempts(event.id).await;
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].success);
    assert_eq!(attempts[0].status_code, Some(500));
    assert_eq!(attempts[0].error.as_deref(), Some("HTTP 500: Internal Server Error"));
}

#[tokio::test]
async fn unreachable_target_records_transport_failure() {
    let (store, ingestor, replayer) = pipeline();
    let event = ingestor.ingest("generic", b"{}".to_vec(), Headers::new()).await;
    let url = common::unreachable_url().await;

    let outcome = replayer.replay(event.id, &url).await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.status.is_none());
    assert!(!outcome.error.as_deref().unwrap_or_default().is_empty());

    let attempts = store.list_replay_attempts(event.id).await;
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].success);
    assert!(attempts[0].status_code.is_none());
    assert_eq!(attempts[0].target_url, url);
}

#[tokio::test]
async fn every_replay_adds_exactly_one_attempt() {
    let ok = common::CaptureServer::start(StatusCode::NO_CONTENT).await;
    let bad = common::CaptureServer::start(StatusCode::NOT_FOUND).await;
    let down = common::unreachable_url().await;
    let (store, ingestor, replayer) = pipeline();
    let event = ingestor.ingest("generic", b"{}".to_vec(), Headers::new()).await;

    for (i, url) in [ok.url(), bad.url(), down, "not a url".to_string()].iter().enumerate() {
        replayer.replay(event.id, url).await.unwrap();
        assert_eq!(store.list_replay_attempts(event.id).await.len(), i + 1);
    }

    let attempts = store.list_replay_attempts(event.id).await;
    assert_eq!(attempts.iter().map(|a| a.success).collect::<Vec<_>>(), vec![false, false, false, true]);
}

#[tokio::test]
async fn empty_target_url_is_rejected_without_recording() {
    let (store, ingestor, replayer) = pipeline();
    let event = ingestor.ingest("generic", b"{}".to_vec(), Headers::new()).await;

    assert_eq!(replayer.replay(event.id, "  ").await.unwrap_err(), ReplayError::MissingTargetUrl);
    assert!(store.list_replay_attempts(event.id).await.is_empty());
}

#[tokio::test]
async fn replay_endpoints_over_http() {
    let target = common::CaptureServer::start(StatusCode::ACCEPTED).await;
    let (app, _store) = common::build_test_app(100);

    let (_, json) = common::post_raw(app.clone(), "/api/webhook/generic", b"plain text", &[("x-custom", "1")]).await;
    let id = json["eventId"].as_u64().unwrap();

    let (status, outcome) = common::post_json(
        app.clone(),
        &format!("/api/replay/{id}"),
        &serde_json::json!({ "targetUrl": target.url() }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["status"], 202);
    assert_eq!(outcome["statusText"], "Accepted");
    assert_eq!(&target.received().await[0].body[..], b"plain text");

    let down = common::unreachable_url().await;
    let (status, outcome) = common::post_json(
        app.clone(),
        &format!("/api/replay/{id}"),
        &serde_json::json!({ "targetUrl": down }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(outcome["success"], false);
    assert!(outcome["error"].as_str().is_some_and(|e| !e.is_empty()));

    let (status, history) = common::get_json(app.clone(), &format!("/api/replay/history/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total"], 2);
    assert_eq!(history["attempts"][0]["success"], false);
    assert_eq!(history["attempts"][1]["statusCode"], 202);

    let (status, _) = common::post_json(app.clone(), &format!("/api/replay/{id}"), &serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = common::post_json(
        app.clone(),
        "/api/replay/9999",
        &serde_json::json!({ "targetUrl": target.url() }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Event not found");

    let (_, history) = common::get_json(app, &format!("/api/replay/history/{id}")).await;
    assert_eq!(history["total"], 2);
}
