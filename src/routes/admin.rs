// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operator routes for queue visibility and manual remediation.

use crate::error::AppError;
use crate::models::{EventStatus, WebhookEventRecord};
use crate::services::SweepSummary;
use crate::AppState;
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Operator routes (mounted behind `require_admin`).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/events", get(list_events))
        .route("/admin/events/{id}/retry", post(retry_event))
        .route("/admin/reconcile", post(reconcile))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    status: Option<String>,
    limit: Option<usize>,
}

/// List events by status (default `failed`).
async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<WebhookEventRecord>>, AppError> {
    let status = match params.status.as_deref() {
        None => EventStatus::Failed,
        Some(s) => s.parse::<EventStatus>().map_err(AppError::Validation)?,
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    Ok(Json(state.queue.list(status, limit).await?))
}

/// Reset a failed event to pending; the next queue pass picks it up.
async fn retry_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WebhookEventRecord>, AppError> {
    Ok(Json(state.queue.retry_failed(&id).await?))
}

/// Run one reconciliation sweep now.
async fn reconcile(State(state): State<Arc<AppState>>) -> Result<Json<SweepSummary>, AppError> {
    tracing::info!("Operator-triggered reconciliation");
    Ok(Json(state.reconciler.sweep(&state.shutdown).await?))
}
