// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Strava events.

use crate::error::AppError;
use crate::services::webhook::{validate_event, verify_subscription, HandshakeParams};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Json, Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/strava", get(verify).post(handle_event))
}

/// Verification response.
#[derive(Serialize)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Verify webhook subscription (GET).
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HandshakeParams>,
) -> Result<Json<VerifyResponse>, AppError> {
    let challenge = verify_subscription(params, &state.config.webhook_verify_token)
        .inspect_err(|e| tracing::warn!(error = %e, "Webhook verification failed"))?;

    tracing::info!("Webhook subscription verified");
    Ok(Json(VerifyResponse { challenge }))
}

/// Handle incoming webhook events (POST).
///
/// Always answers `200 OK`, within the configured deadline. Invalid events
/// are logged and dropped; valid ones are enqueued and processed by a task
/// that outlives the request if the deadline passes first.
async fn handle_event(State(state): State<Arc<AppState>>, body: Bytes) -> (StatusCode, &'static str) {
    const ACK: (StatusCode, &str) = (StatusCode::OK, "OK");

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook body is not JSON, dropping");
            return ACK;
        }
    };

    let payload = match validate_event(&value) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, payload = %value, "Invalid webhook event, dropping");
            return ACK;
        }
    };

    if let Some(expected) = state.config.strava_subscription_id {
        if payload.subscription_id != expected {
            tracing::warn!(
                received_id = payload.subscription_id,
                expected_id = expected,
                "Security Alert: Webhook subscription ID mismatch"
            );
            return ACK;
        }
    }

    tracing::info!(
        object_type = ?payload.object_type,
        object_id = payload.object_id,
        aspect_type = ?payload.aspect_type,
        owner_id = payload.owner_id,
        "Webhook event received"
    );

    let task_state = state.clone();
    let mut task = tokio::spawn(async move {
        let event_id = task_state.queue.enqueue(payload).await?;
        task_state.processor.process(&event_id).await
    });

    match tokio::time::timeout(state.config.webhook_response_timeout, &mut task).await {
        Ok(Ok(Ok(result))) => tracing::debug!(?result, "Webhook event handled in time"),
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "Failed to enqueue or process webhook event"),
        Ok(Err(e)) => tracing::error!(error = %e, "Webhook event task panicked"),
        Err(_) => tracing::info!("Webhook deadline reached, event continues in background"),
    }

    ACK
}
