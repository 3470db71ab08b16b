// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets (client secret, verify token, admin token) are injected as
//! environment variables by the deployment and read once at startup.
//! Tuning knobs all have defaults; an unparseable value falls back to the
//! default rather than aborting startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_STRAVA_API_URL: &str = "https://www.strava.com/api/v3";
pub const DEFAULT_STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";

/// Stream types requested from Strava when stream extraction is enabled.
pub const DEFAULT_STREAM_KEYS: &[&str] = &["time", "heartrate", "latlng", "altitude", "cadence", "watts"];

/// Strava requests one activity sync can make in sequence: token refresh,
/// detail and streams.
const API_CALLS_PER_SYNC: u32 = 3;

/// Which datastore backs the sync pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND")),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Provider ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Shared secret echoed back by Strava during the subscription handshake
    pub webhook_verify_token: String,
    /// When set, events from any other push subscription are dropped
    pub strava_subscription_id: Option<u64>,
    /// REST base URL (overridable for tests)
    pub strava_api_url: String,
    /// OAuth token endpoint used for refresh exchanges
    pub strava_token_url: String,

    // --- Service ---
    /// Bearer token guarding the operator routes; routes are closed when unset
    pub admin_token: Option<String>,
    /// GCP project ID
    pub gcp_project_id: String,
    pub storage_backend: StorageBackend,
    /// Server port
    pub port: u16,

    // --- Webhook / queue ---
    /// Deadline for answering a webhook delivery
    pub webhook_response_timeout: Duration,
    /// Processing attempts before an event is parked as `failed`
    pub event_max_attempts: u32,
    /// Interval between background queue passes
    pub queue_poll_interval: Duration,
    /// Events stuck in `processing` longer than this are returned to `pending`.
    /// Should exceed `sync_budget()`; a late outcome is discarded anyway.
    pub event_lease: Duration,
    /// Maximum events handled per queue pass
    pub queue_batch_size: usize,

    // --- API client ---
    pub api_request_timeout: Duration,
    pub api_base_retry_delay: Duration,
    /// Retries after the first throttled/timed-out request
    pub api_max_retries: u32,
    /// Cap on a single backoff wait, including Retry-After hints
    pub api_max_retry_delay: Duration,
    /// Refresh tokens this long before their stated expiry
    pub token_refresh_margin: Duration,

    // --- Polling reconciler ---
    pub polling_enabled: bool,
    pub polling_interval: Duration,
    pub polling_activity_limit: u32,

    // --- Activity data ---
    pub fetch_streams: bool,
    pub stream_keys: Vec<String>,
    pub process_heart_rate: bool,
    pub heart_rate_batch_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => StorageBackend::Firestore,
        };

        Ok(Self {
            strava_client_id: required("STRAVA_CLIENT_ID")?,
            strava_client_secret: required("STRAVA_CLIENT_SECRET")?,
            webhook_verify_token: required("STRAVA_VERIFY_TOKEN")?,
            strava_subscription_id: env::var("STRAVA_SUBSCRIPTION_ID")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            strava_api_url: env::var("STRAVA_API_URL")
                .unwrap_or_else(|_| DEFAULT_STRAVA_API_URL.to_string()),
            strava_token_url: env::var("STRAVA_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_STRAVA_TOKEN_URL.to_string()),

            admin_token: env::var("ADMIN_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            storage_backend,
            port: env_or("PORT", 8080),

            webhook_response_timeout: Duration::from_millis(env_or(
                "WEBHOOK_RESPONSE_TIMEOUT_MS",
                1500,
            )),
            event_max_attempts: env_or("EVENT_MAX_ATTEMPTS", 3),
            queue_poll_interval: Duration::from_secs(env_or("QUEUE_POLL_INTERVAL_SECS", 60)),
            event_lease: Duration::from_secs(env_or("EVENT_LEASE_SECS", 900)),
            queue_batch_size: env_or("QUEUE_BATCH_SIZE", 50),

            api_request_timeout: Duration::from_millis(env_or("API_REQUEST_TIMEOUT_MS", 10_000)),
            api_base_retry_delay: Duration::from_millis(env_or("API_BASE_RETRY_DELAY_MS", 1000)),
            api_max_retries: env_or("API_MAX_RETRIES", 3),
            api_max_retry_delay: Duration::from_secs(env_or("API_MAX_RETRY_DELAY_SECS", 60)),
            token_refresh_margin: Duration::from_secs(env_or("TOKEN_REFRESH_MARGIN_SECS", 300)),

            polling_enabled: env_or("POLLING_ENABLED", true),
            polling_interval: Duration::from_secs(env_or("POLLING_INTERVAL_SECS", 4 * 60 * 60)),
            polling_activity_limit: env_or("POLLING_ACTIVITY_LIMIT", 10),

            fetch_streams: env_or("FETCH_STREAMS", true),
            stream_keys: env::var("STREAM_KEYS")
                .ok()
                .map(|v| parse_list(&v))
                .filter(|keys| !keys.is_empty())
                .unwrap_or_else(default_stream_keys),
            process_heart_rate: env_or("PROCESS_HEART_RATE", true),
            heart_rate_batch_size: env_or("HR_BATCH_SIZE", 400).max(1),
        })
    }

    /// Worst-case wall time of one Strava call: every attempt timing out,
    /// with the longest wait between attempts.
    pub fn api_call_budget(&self) -> Duration {
        self.api_request_timeout
            .saturating_mul(self.api_max_retries.saturating_add(1))
            .saturating_add(self.api_max_retry_delay.saturating_mul(self.api_max_retries))
    }

    /// Worst-case wall time of one activity sync's Strava calls.
    pub fn sync_budget(&self) -> Duration {
        self.api_call_budget().saturating_mul(API_CALLS_PER_SYNC)
    }

    /// Configuration for tests: in-memory storage, short deadlines and delays.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            webhook_verify_token: "test_verify_token".to_string(),
            strava_subscription_id: None,
            strava_api_url: "http://127.0.0.1:9/api/v3".to_string(),
            strava_token_url: "http://127.0.0.1:9/oauth/token".to_string(),
            admin_token: Some("test_admin_token".to_string()),
            gcp_project_id: "test-project".to_string(),
            storage_backend: StorageBackend::Memory,
            port: 8080,
            webhook_response_timeout: Duration::from_millis(200),
            event_max_attempts: 3,
            queue_poll_interval: Duration::from_secs(60),
            event_lease: Duration::from_secs(900),
            queue_batch_size: 50,
            api_request_timeout: Duration::from_secs(2),
            api_base_retry_delay: Duration::from_millis(5),
            api_max_retries: 3,
            api_max_retry_delay: Duration::from_secs(1),
            token_refresh_margin: Duration::from_secs(300),
            polling_enabled: true,
            polling_interval: Duration::from_secs(4 * 60 * 60),
            polling_activity_limit: 10,
            fetch_streams: true,
            stream_keys: default_stream_keys(),
            process_heart_rate: true,
            heart_rate_batch_size: 400,
        }
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(key))
}

/// Parse an optional variable, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable config value");
            default
        }),
        Err(_) => default,
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_stream_keys() -> Vec<String> {
    DEFAULT_STREAM_KEYS.iter().map(|k| k.to_string()).collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
