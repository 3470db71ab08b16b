// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client.
//!
//! Handles:
//! - Credential loading before every call
//! - Proactive token refresh inside a safety margin before expiry
//! - Bounded request timeouts
//! - Retry with backoff on throttling (429) and timeouts
//!
//! Refreshes are not serialized per athlete: two concurrent calls may both
//! refresh, and Strava accepts the most recent refresh token.

use crate::config::Config;
use crate::db::CredentialStore;
use crate::error::AppError;
use crate::models::{Credential, LatLng};
use crate::services::retry::{retry_with_backoff, Attempt, RetryError, RetryPolicy};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Strava API client bound to a credential store.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    credentials: Arc<dyn CredentialStore>,
    retry: RetryPolicy,
    refresh_margin: chrono::Duration,
}

impl StravaClient {
    /// Create a client from configuration.
    pub fn new(config: &Config, credentials: Arc<dyn CredentialStore>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.api_request_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;

        let refresh_margin = chrono::Duration::from_std(config.token_refresh_margin)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid refresh margin: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.strava_api_url.trim_end_matches('/').to_string(),
            token_url: config.strava_token_url.clone(),
            client_id: config.strava_client_id.clone(),
            client_secret: config.strava_client_secret.clone(),
            credentials,
            retry: RetryPolicy::new(config.api_max_retries + 1, config.api_base_retry_delay)
                .with_max_delay(config.api_max_retry_delay),
            refresh_margin,
        })
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get an access token that is valid beyond the refresh margin.
    ///
    /// Refreshes (and persists the new pair) first if needed. A failed
    /// refresh is an `Authentication` error; the stale token is never used.
    pub async fn get_valid_access_token(&self, athlete_id: u64) -> Result<String, AppError> {
        let credential = self
            .credentials
            .get_credential(athlete_id)
            .await?
            .ok_or_else(|| {
                AppError::Authentication(format!("No credentials for athlete {}", athlete_id))
            })?;

        if !credential.needs_refresh(Utc::now(), self.refresh_margin) {
            return Ok(credential.access_token);
        }

        tracing::info!(athlete_id, "Access token expiring, refreshing");

        let refreshed = self.refresh_token(&credential.refresh_token).await?;
        let new_credential = Credential {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: DateTime::from_timestamp(refreshed.expires_at, 0).ok_or_else(|| {
                AppError::Authentication(format!(
                    "Refresh returned invalid expiry {}",
                    refreshed.expires_at
                ))
            })?,
        };

        // Persist before the triggering call proceeds so concurrent callers
        // pick up the new pair.
        self.credentials
            .set_credential(athlete_id, &new_credential)
            .await?;

        tracing::info!(athlete_id, expires_at = %new_credential.expires_at, "Token refreshed");
        Ok(new_credential.access_token)
    }

    /// Exchange a refresh token for a new token pair.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Authentication(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Strava token refresh failed");
            return Err(AppError::Authentication(format!(
                "Token refresh failed with status {}",
                status
            )));
        }

        response.json().await.map_err(|e| {
            AppError::Authentication(format!("Failed to parse token response: {}", e))
        })
    }

    // ─── Generic Call ────────────────────────────────────────────────────────

    /// Issue an authenticated call and parse the JSON response.
    ///
    /// `params` go in the query string for GET/DELETE and in a JSON body
    /// otherwise. Throttling and timeouts are retried per the retry policy;
    /// any other non-2xx response is a terminal `Provider` error.
    pub async fn call<T: DeserializeOwned>(
        &self,
        athlete_id: u64,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, AppError> {
        let access_token = self.get_valid_access_token(athlete_id).await?;
        let url = format!("{}{}", self.base_url, endpoint);

        let result = retry_with_backoff(&self.retry, |attempt| {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&access_token);
            request = if method == Method::GET || method == Method::DELETE {
                request.query(params)
            } else {
                let body: serde_json::Map<String, serde_json::Value> = params
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                request.json(&body)
            };

            async move {
                let response = match request.send().await {
                    Ok(r) => r,
                    Err(e) if e.is_timeout() => {
                        tracing::warn!(endpoint, attempt, "Strava request timed out");
                        return Err(Attempt::Retry {
                            error: AppError::Transport(format!("Request timed out: {}", e)),
                            after: None,
                        });
                    }
                    Err(e) => return Err(Attempt::Abort(AppError::Transport(e.to_string()))),
                };

                let status = response.status();
                if status == StatusCode::TOO_MANY_REQUESTS {
                    let after = retry_after(response.headers());
                    tracing::warn!(
                        endpoint,
                        attempt,
                        retry_after_secs = after.map(|d| d.as_secs()),
                        "Strava rate limit hit (429)"
                    );
                    return Err(Attempt::Retry {
                        error: AppError::RateLimitExceeded {
                            attempts: attempt + 1,
                        },
                        after,
                    });
                }

                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(Attempt::Abort(AppError::Provider {
                        status: status.as_u16(),
                        message: body,
                    }));
                }

                response.json::<T>().await.map_err(|e| {
                    Attempt::Abort(AppError::Provider {
                        status: status.as_u16(),
                        message: format!("JSON parse error: {}", e),
                    })
                })
            }
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(RetryError::Aborted(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => match last {
                AppError::RateLimitExceeded { .. } => {
                    tracing::error!(endpoint, attempts, "Strava rate limit retries exhausted");
                    Err(AppError::RateLimitExceeded { attempts })
                }
                other => Err(other),
            },
        }
    }

    // ─── API Wrappers ────────────────────────────────────────────────────────

    /// List the athlete's most recent activities (newest first).
    pub async fn list_activities(
        &self,
        athlete_id: u64,
        per_page: u32,
    ) -> Result<Vec<StravaActivitySummary>, AppError> {
        self.call(
            athlete_id,
            Method::GET,
            "/athlete/activities",
            &[("per_page", per_page.to_string())],
        )
        .await
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        athlete_id: u64,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        self.call(
            athlete_id,
            Method::GET,
            &format!("/activities/{}", activity_id),
            &[("include_all_efforts", "true".to_string())],
        )
        .await
    }

    /// Get an activity's time-series streams, keyed by type.
    pub async fn get_activity_streams(
        &self,
        athlete_id: u64,
        activity_id: u64,
        keys: &[String],
    ) -> Result<StravaStreamSet, AppError> {
        self.call(
            athlete_id,
            Method::GET,
            &format!("/activities/{}/streams", activity_id),
            &[
                ("keys", keys.join(",")),
                ("key_by_type", "true".to_string()),
            ],
        )
        .await
    }
}

/// Parse a `Retry-After` header given in seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Summary activity for list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivitySummary {
    pub id: u64,
}

/// Detailed Strava activity response.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub sport_type: String,
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
    pub start_date: DateTime<Utc>,
    pub start_date_local: Option<String>,
    pub timezone: Option<String>,
    #[serde(default)]
    pub start_latlng: Option<Vec<f64>>,
    #[serde(default)]
    pub end_latlng: Option<Vec<f64>>,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub moving_time: u64,
    #[serde(default)]
    pub elapsed_time: u64,
    #[serde(default)]
    pub total_elevation_gain: f64,
    pub average_speed: Option<f64>,
    pub max_speed: Option<f64>,
    #[serde(default)]
    pub has_heartrate: bool,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    pub average_cadence: Option<f64>,
    pub average_watts: Option<f64>,
    pub kilojoules: Option<f64>,
    pub calories: Option<f64>,
    pub gear_id: Option<String>,
    pub device_name: Option<String>,
    #[serde(default)]
    pub trainer: bool,
    #[serde(default)]
    pub commute: bool,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub private: bool,
    pub map: Option<StravaMap>,
}

impl StravaActivity {
    pub fn start_latlng(&self) -> Option<LatLng> {
        self.start_latlng.as_deref().and_then(LatLng::from_slice)
    }

    pub fn end_latlng(&self) -> Option<LatLng> {
        self.end_latlng.as_deref().and_then(LatLng::from_slice)
    }

    pub fn summary_polyline(&self) -> Option<&str> {
        self.map
            .as_ref()
            .and_then(|m| m.summary_polyline.as_deref())
            .filter(|p| !p.is_empty())
    }
}

/// Activity map data with polylines.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaMap {
    pub summary_polyline: Option<String>,
}

/// One stream from the streams endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaStream<T> {
    pub data: Vec<T>,
}

/// Streams response with `key_by_type=true`. Absent types are `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaStreamSet {
    pub time: Option<StravaStream<f64>>,
    pub distance: Option<StravaStream<f64>>,
    pub latlng: Option<StravaStream<[f64; 2]>>,
    pub altitude: Option<StravaStream<f64>>,
    pub velocity_smooth: Option<StravaStream<f64>>,
    pub heartrate: Option<StravaStream<f64>>,
    pub cadence: Option<StravaStream<f64>>,
    pub watts: Option<StravaStream<f64>>,
    pub temp: Option<StravaStream<f64>>,
    pub moving: Option<StravaStream<bool>>,
    pub grade_smooth: Option<StravaStream<f64>>,
}
