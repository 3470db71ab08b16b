// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event processor state machine and dispatch tests.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mockito::{Matcher, Server};
use pulse_sync::config::Config;
use pulse_sync::db::{
    ActivityStore, AthleteStore, CredentialStore, EventStore, MemoryStore, Storage,
};
use pulse_sync::error::AppError;
use pulse_sync::models::{EventStatus, WebhookEventRecord, WebhookPayload};
use pulse_sync::services::webhook::validate_event;
use pulse_sync::services::{PassSummary, ProcessResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn payload(body: Value) -> WebhookPayload {
    validate_event(&body).unwrap()
}

fn activity_event(id: u64, aspect: &str) -> WebhookPayload {
    payload(json!({
        "object_type": "activity",
        "object_id": id,
        "aspect_type": aspect,
        "owner_id": 42,
        "subscription_id": 1,
        "event_time": 1700000000
    }))
}

#[tokio::test]
async fn activity_create_event_syncs_and_completes() {
    let mut server = Server::new_async().await;
    let (_, state) = common::create_test_app(common::config_for(&server));
    common::seed_credential(&state.storage, 42, ChronoDuration::hours(6)).await;
    let detail = common::mock_activity(&mut server, 555, &common::activity_json(555, false), 1).await;

    let id = state.queue.enqueue(activity_event(555, "create")).await.unwrap();
    let result = state.processor.process(&id).await.unwrap();

    assert_eq!(result, ProcessResult::Completed);
    detail.assert_async().await;

    let activity = state
        .storage
        .activities
        .get_activity(555)
        .await
        .unwrap()
        .expect("activity 555 stored");
    assert_eq!(activity.name, "Activity 555");
    assert_eq!(activity.moving_time_secs, 3000);
    assert_eq!(activity.gear_id.as_deref(), Some("g42"));

    let record = state.queue.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, EventStatus::Completed);
    assert_eq!(record.attempts, 0);
}

#[tokio::test]
async fn deauthorization_clears_credentials_and_deactivates_subscription() {
    let server = Server::new_async().await;
    let (_, state) = common::create_test_app(common::config_for(&server));
    common::seed_credential(&state.storage, 42, ChronoDuration::hours(6)).await;

    let event = payload(json!({
        "object_type": "athlete",
        "object_id": 42,
        "aspect_type": "update",
        "updates": {"authorized": "false"},
        "owner_id": 42,
        "subscription_id": 1,
        "event_time": 1700000001
    }));
    let id = state.queue.enqueue(event).await.unwrap();
    let result = state.processor.process(&id).await.unwrap();

    assert_eq!(result, ProcessResult::Completed);
    assert!(state
        .storage
        .credentials
        .get_credential(42)
        .await
        .unwrap()
        .is_none());
    let athlete = state.storage.athletes.get_athlete(42).await.unwrap().unwrap();
    assert!(!athlete.webhook_subscription_active);
    assert!(athlete.deauthorized_at.is_some());
}

#[tokio::test]
async fn other_athlete_events_are_acknowledged_without_effect() {
    let server = Server::new_async().await;
    let (_, state) = common::create_test_app(common::config_for(&server));
    common::seed_credential(&state.storage, 42, ChronoDuration::hours(6)).await;

    let event = payload(json!({
        "object_type": "athlete",
        "object_id": 42,
        "aspect_type": "update",
        "updates": {"title": "New name"},
        "owner_id": 42,
        "subscription_id": 1,
        "event_time": 1700000002
    }));
    let id = state.queue.enqueue(event).await.unwrap();

    assert_eq!(
        state.processor.process(&id).await.unwrap(),
        ProcessResult::Completed
    );
    assert!(state
        .storage
        .credentials
        .get_credential(42)
        .await
        .unwrap()
        .is_some());
    assert!(state.storage.athletes.get_athlete(42).await.unwrap().is_none());
}

#[tokio::test]
async fn failing_handler_is_parked_after_exactly_max_attempts() {
    let mut server = Server::new_async().await;
    let (_, state) = common::create_test_app(common::config_for(&server));
    common::seed_credential(&state.storage, 42, ChronoDuration::hours(6)).await;
    let broken = server
        .mock("GET", "/activities/777")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body(r#"{"message":"Internal Error"}"#)
        .expect(3)
        .create_async()
        .await;

    let id = state.queue.enqueue(activity_event(777, "update")).await.unwrap();

    assert_eq!(
        state.processor.process(&id).await.unwrap(),
        ProcessResult::Retrying { attempts: 1 }
    );
    assert_eq!(
        state.queue.get(&id).await.unwrap().unwrap().status,
        EventStatus::Pending
    );
    assert_eq!(
        state.processor.process(&id).await.unwrap(),
        ProcessResult::Retrying { attempts: 2 }
    );
    assert_eq!(
        state.processor.process(&id).await.unwrap(),
        ProcessResult::Failed { attempts: 3 }
    );
    // Terminal: further passes leave it alone
    assert_eq!(
        state.processor.process(&id).await.unwrap(),
        ProcessResult::Skipped
    );

    broken.assert_async().await;
    let record = state.queue.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, EventStatus::Failed);
    assert_eq!(record.attempts, 3);
    assert!(record.error_message.unwrap().contains("500"));
}

#[tokio::test]
async fn activity_gone_upstream_is_removed_and_completed() {
    let mut server = Server::new_async().await;
    let (_, state) = common::create_test_app(common::config_for(&server));
    common::seed_credential(&state.storage, 42, ChronoDuration::hours(6)).await;
    let detail = common::mock_activity(&mut server, 888, &common::activity_json(888, false), 1).await;

    let created = state.queue.enqueue(activity_event(888, "create")).await.unwrap();
    state.processor.process(&created).await.unwrap();
    assert!(state.storage.activities.activity_exists(888).await.unwrap());
    detail.remove_async().await;

    let gone = server
        .mock("GET", "/activities/888")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"message":"Record Not Found"}"#)
        .expect(1)
        .create_async()
        .await;

    let updated = state.queue.enqueue(activity_event(888, "update")).await.unwrap();
    assert_eq!(
        state.processor.process(&updated).await.unwrap(),
        ProcessResult::Completed
    );

    gone.assert_async().await;
    assert!(!state.storage.activities.activity_exists(888).await.unwrap());
    let record = state.queue.get(&updated).await.unwrap().unwrap();
    assert_eq!(record.status, EventStatus::Completed);
    assert_eq!(record.attempts, 0);
}

/// Event store where every claim is immediately released and re-claimed by
/// another worker, as happens when a worker outlives its lease.
struct TakenOverEvents(Arc<MemoryStore>);

#[async_trait]
impl EventStore for TakenOverEvents {
    async fn insert_event(&self, record: &WebhookEventRecord) -> Result<(), AppError> {
        self.0.insert_event(record).await
    }

    async fn get_event(&self, id: &str) -> Result<Option<WebhookEventRecord>, AppError> {
        self.0.get_event(id).await
    }

    async fn claim_event(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookEventRecord>, AppError> {
        let Some(claimed) = self.0.claim_event(id, now).await? else {
            return Ok(None);
        };
        let mut other = claimed.clone();
        other.claimed_at = Some(now + ChronoDuration::seconds(1));
        self.0
            .transition_event(&other, EventStatus::Processing, claimed.claimed_at)
            .await?;
        Ok(Some(claimed))
    }

    async fn transition_event(
        &self,
        record: &WebhookEventRecord,
        from: EventStatus,
        claimed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        self.0.transition_event(record, from, claimed_at).await
    }

    async fn list_events(
        &self,
        status: EventStatus,
        limit: usize,
    ) -> Result<Vec<WebhookEventRecord>, AppError> {
        self.0.list_events(status, limit).await
    }
}

#[tokio::test]
async fn outcome_after_losing_the_claim_is_discarded() {
    let storage = Storage {
        events: Arc::new(TakenOverEvents(Arc::new(MemoryStore::new()))),
        ..Storage::memory()
    };
    let (_, state) = common::create_test_app_with(Config::test_default(), storage);

    let id = state.queue.enqueue(activity_event(1003, "delete")).await.unwrap();

    assert_eq!(
        state.processor.process(&id).await.unwrap(),
        ProcessResult::LeaseLost
    );
    // Still owned by the worker that took it over
    let record = state.queue.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, EventStatus::Processing);
    assert!(record.processed_at.is_none());

    let summary = state
        .processor
        .run_pass(Duration::from_secs(600), 50, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary, PassSummary::default());
}

#[tokio::test]
async fn missing_credentials_count_as_a_failed_attempt() {
    let server = Server::new_async().await;
    let (_, state) = common::create_test_app(common::config_for(&server));

    let id = state.queue.enqueue(activity_event(555, "create")).await.unwrap();

    assert_eq!(
        state.processor.process(&id).await.unwrap(),
        ProcessResult::Retrying { attempts: 1 }
    );
    let record = state.queue.get(&id).await.unwrap().unwrap();
    assert!(record
        .error_message
        .unwrap()
        .starts_with("Authentication failed"));
}

#[tokio::test]
async fn delete_event_removes_activity() {
    let mut server = Server::new_async().await;
    let (_, state) = common::create_test_app(common::config_for(&server));
    common::seed_credential(&state.storage, 42, ChronoDuration::hours(6)).await;
    common::mock_activity(&mut server, 555, &common::activity_json(555, false), 1).await;

    let created = state.queue.enqueue(activity_event(555, "create")).await.unwrap();
    state.processor.process(&created).await.unwrap();
    assert!(state.storage.activities.activity_exists(555).await.unwrap());

    let deleted = state.queue.enqueue(activity_event(555, "delete")).await.unwrap();
    assert_eq!(
        state.processor.process(&deleted).await.unwrap(),
        ProcessResult::Completed
    );
    assert!(!state.storage.activities.activity_exists(555).await.unwrap());
}

#[tokio::test]
async fn queue_pass_retries_pending_and_releases_stale_events() {
    let server = Server::new_async().await;
    let (_, state) = common::create_test_app(common::config_for(&server));

    let pending = state.queue.enqueue(activity_event(1001, "delete")).await.unwrap();
    let stale = state.queue.enqueue(activity_event(1002, "delete")).await.unwrap();
    state
        .storage
        .events
        .claim_event(&stale, Utc::now() - ChronoDuration::hours(1))
        .await
        .unwrap();

    let summary = state
        .processor
        .run_pass(Duration::from_secs(600), 50, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        summary,
        PassSummary {
            released: 1,
            completed: 2,
            ..Default::default()
        }
    );
    for id in [pending, stale] {
        assert_eq!(
            state.queue.get(&id).await.unwrap().unwrap().status,
            EventStatus::Completed
        );
    }
}

#[tokio::test]
async fn cancelled_queue_pass_processes_nothing() {
    let server = Server::new_async().await;
    let (_, state) = common::create_test_app(common::config_for(&server));
    let id = state.queue.enqueue(activity_event(1001, "delete")).await.unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let summary = state
        .processor
        .run_pass(Duration::from_secs(600), 50, &shutdown)
        .await
        .unwrap();

    assert_eq!(summary, PassSummary::default());
    assert_eq!(
        state.queue.get(&id).await.unwrap().unwrap().status,
        EventStatus::Pending
    );
}
