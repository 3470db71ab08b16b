// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{Duration, Utc};
use mockito::{Matcher, Mock, ServerGuard};
use pulse_sync::config::Config;
use pulse_sync::db::{CredentialStore, FirestoreDb, Storage};
use pulse_sync::models::Credential;
use pulse_sync::routes::create_router;
use pulse_sync::AppState;
use serde_json::{json, Value};
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Test config pointing the Strava API and token endpoint at a mock server.
#[allow(dead_code)]
pub fn config_for(server: &ServerGuard) -> Config {
    Config {
        strava_api_url: server.url(),
        strava_token_url: format!("{}/oauth/token", server.url()),
        ..Config::test_default()
    }
}

/// Create a test app over in-memory storage.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(config: Config) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(
        AppState::new(config, Storage::memory()).expect("Failed to build app state"),
    );
    (create_router(state.clone()), state)
}

/// Same as `create_test_app` over caller-provided storage.
#[allow(dead_code)]
pub fn create_test_app_with(config: Config, storage: Storage) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config, storage).expect("Failed to build app state"));
    (create_router(state.clone()), state)
}

/// Store a credential for `athlete_id` that expires `expires_in` from now.
#[allow(dead_code)]
pub async fn seed_credential(storage: &Storage, athlete_id: u64, expires_in: Duration) {
    storage
        .credentials
        .set_credential(
            athlete_id,
            &Credential {
                access_token: format!("access_{}", athlete_id),
                refresh_token: format!("refresh_{}", athlete_id),
                expires_at: Utc::now() + expires_in,
            },
        )
        .await
        .expect("Failed to seed credential");
}

/// Detailed activity response body.
#[allow(dead_code)]
pub fn activity_json(id: u64, has_heartrate: bool) -> Value {
    json!({
        "id": id,
        "name": format!("Activity {}", id),
        "description": "Loop around the reservoir",
        "sport_type": "Run",
        "type": "Run",
        "start_date": "2024-01-15T08:00:00Z",
        "start_date_local": "2024-01-15T00:00:00Z",
        "timezone": "(GMT-08:00) America/Los_Angeles",
        "start_latlng": [37.33, -122.09],
        "end_latlng": [37.34, -122.08],
        "distance": 10250.5,
        "moving_time": 3000,
        "elapsed_time": 3120,
        "total_elevation_gain": 180.0,
        "average_speed": 3.4,
        "max_speed": 5.1,
        "has_heartrate": has_heartrate,
        "average_heartrate": if has_heartrate { json!(148.2) } else { Value::Null },
        "max_heartrate": if has_heartrate { json!(171.0) } else { Value::Null },
        "gear_id": "g42",
        "device_name": "Garmin Forerunner 255",
        "trainer": false,
        "commute": false,
        "manual": false,
        "private": false,
        "map": {"summary_polyline": "ki{eFvqfiVqAWQIGEEKAYJgBVqDJ{BHa@jAkNJw@Pw@V{APs@^aABQAOEQGKoJ_FuJkFqAo@"}
    })
}

/// Stream set response body with aligned time and heart-rate series.
#[allow(dead_code)]
pub fn streams_json(samples: usize) -> Value {
    let time: Vec<u64> = (0..samples as u64).collect();
    let heartrate: Vec<u64> = (0..samples as u64).map(|i| 120 + i % 40).collect();
    let latlng: Vec<[f64; 2]> = (0..samples)
        .map(|i| [37.33 + i as f64 * 1e-4, -122.09])
        .collect();
    json!({
        "time": {"data": time, "series_type": "distance", "original_size": samples, "resolution": "high"},
        "heartrate": {"data": heartrate},
        "latlng": {"data": latlng},
        "altitude": {"data": vec![12.5; samples]}
    })
}

/// Mock `GET /activities/{id}` returning `body`, expecting `hits` calls.
#[allow(dead_code)]
pub async fn mock_activity(server: &mut ServerGuard, id: u64, body: &Value, hits: usize) -> Mock {
    server
        .mock("GET", format!("/activities/{}", id).as_str())
        .match_query(Matcher::Any)
        .expect(hits)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

/// Mock `GET /activities/{id}/streams` returning `body`, expecting `hits` calls.
#[allow(dead_code)]
pub async fn mock_streams(server: &mut ServerGuard, id: u64, body: &Value, hits: usize) -> Mock {
    server
        .mock("GET", format!("/activities/{}/streams", id).as_str())
        .match_query(Matcher::Any)
        .expect(hits)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}
