// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operator route tests: admin auth, failed-event listing, manual retry
//! and on-demand reconciliation.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use pulse_sync::config::Config;
use pulse_sync::models::{AspectType, EventStatus, ObjectType, WebhookPayload};
use serde_json::Value;
use std::collections::BTreeMap;
use tower::ServiceExt;

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let response = app
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or_default())
}

fn payload(object_id: u64) -> WebhookPayload {
    WebhookPayload {
        object_type: ObjectType::Activity,
        object_id,
        aspect_type: AspectType::Create,
        owner_id: 42,
        subscription_id: 1,
        event_time: 1_700_000_000,
        updates: BTreeMap::new(),
    }
}

#[tokio::test]
async fn missing_bearer_is_unauthorized() {
    let (app, _) = common::create_test_app(Config::test_default());

    let (status, _) = send(app, "GET", "/admin/events", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_token_is_forbidden() {
    let (app, _) = common::create_test_app(Config::test_default());

    let (status, _) = send(app, "GET", "/admin/events", Some("not_the_token")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unconfigured_admin_token_closes_operator_routes() {
    let config = Config {
        admin_token: None,
        ..Config::test_default()
    };
    let (app, _) = common::create_test_app(config);

    let (status, _) = send(app, "POST", "/admin/reconcile", Some("test_admin_token")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn lists_failed_events_by_default() {
    let (app, state) = common::create_test_app(Config::test_default());

    let failed = state.queue.enqueue(payload(1)).await.unwrap();
    let record = state.queue.claim(&failed).await.unwrap().unwrap();
    state.queue.fail(record, 3, "gone for good").await.unwrap();
    state.queue.enqueue(payload(2)).await.unwrap();

    let (status, json) = send(app, "GET", "/admin/events", Some("test_admin_token")).await;

    assert_eq!(status, StatusCode::OK);
    let events = json.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["id"], failed.as_str());
    assert_eq!(events[0]["status"], "failed");
    assert_eq!(events[0]["attempts"], 3);
    assert_eq!(events[0]["error_message"], "gone for good");
}

#[tokio::test]
async fn lists_events_with_explicit_status() {
    let (app, state) = common::create_test_app(Config::test_default());
    state.queue.enqueue(payload(1)).await.unwrap();
    state.queue.enqueue(payload(2)).await.unwrap();

    let (status, json) = send(
        app,
        "GET",
        "/admin/events?status=pending&limit=1",
        Some("test_admin_token"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_status_is_a_bad_request() {
    let (app, _) = common::create_test_app(Config::test_default());

    let (status, json) = send(
        app,
        "GET",
        "/admin/events?status=done",
        Some("test_admin_token"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad_request");
}

#[tokio::test]
async fn retry_resets_failed_event_to_pending() {
    let (app, state) = common::create_test_app(Config::test_default());
    let id = state.queue.enqueue(payload(1)).await.unwrap();
    let record = state.queue.claim(&id).await.unwrap().unwrap();
    state.queue.fail(record, 3, "boom").await.unwrap();

    let (status, json) = send(
        app,
        "POST",
        &format!("/admin/events/{}/retry", id),
        Some("test_admin_token"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["attempts"], 0);

    let stored = state.queue.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, EventStatus::Pending);
    assert!(stored.error_message.is_none());
}

#[tokio::test]
async fn retry_of_pending_or_unknown_event_is_rejected() {
    let (app, state) = common::create_test_app(Config::test_default());
    let id = state.queue.enqueue(payload(1)).await.unwrap();

    let (status, _) = send(
        app.clone(),
        "POST",
        &format!("/admin/events/{}/retry", id),
        Some("test_admin_token"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app,
        "POST",
        "/admin/events/no-such-event/retry",
        Some("test_admin_token"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reconcile_returns_sweep_summary() {
    let (app, _) = common::create_test_app(Config::test_default());

    let (status, json) = send(app, "POST", "/admin/reconcile", Some("test_admin_token")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["athletes_checked"], 0);
    assert_eq!(json["activities_synced"], 0);
    assert_eq!(json["interrupted"], false);
}

#[tokio::test]
async fn operator_responses_carry_security_headers() {
    let (app, _) = common::create_test_app(Config::test_default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/events")
                .header("authorization", "Bearer test_admin_token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("cache-control").unwrap(), "no-store");
}
