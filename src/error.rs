// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type shared by the sync pipeline and the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed webhook payload or handshake. Never enqueued.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing credentials or a failed token refresh; needs re-authorization.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Throttling retry budget exhausted for one API call.
    #[error("Strava rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// Non-2xx, non-throttling provider response.
    #[error("Strava API error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// Network failure talking to the provider.
    #[error("Strava transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for provider responses that mean the object no longer exists upstream.
    pub fn is_provider_not_found(&self) -> bool {
        matches!(self, AppError::Provider { status: 404, .. })
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Authentication(_) => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::RateLimitExceeded { .. }
            | AppError::Provider { .. }
            | AppError::Transport(_) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(self.to_string()))
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type Result<T> = std::result::Result<T, AppError>;
