// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! The sync pipeline only sees the store traits below. Two backends
//! implement them: Firestore for production and an in-memory store for
//! tests and local development. There are no transactions across stores;
//! every write is an upsert by ID or a delete by key, except event status
//! transitions, which are conditional on the stored status and claim stamp.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{
    Activity, ActivityStreams, Athlete, Credential, EventStatus, HeartRatePoint,
    WebhookEventRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    pub const ATHLETES: &str = "athletes";
    pub const TOKENS: &str = "tokens";
    pub const ACTIVITIES: &str = "activities";
    pub const ACTIVITY_STREAMS: &str = "activity_streams";
    pub const HEART_RATE_POINTS: &str = "heart_rate_points";
    pub const WEBHOOK_EVENTS: &str = "webhook_events";
}

/// Read/write boundary for OAuth credentials. No business logic.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(&self, athlete_id: u64) -> Result<Option<Credential>, AppError>;

    /// Replace the athlete's credential (access + refresh token together).
    async fn set_credential(&self, athlete_id: u64, credential: &Credential)
        -> Result<(), AppError>;

    /// Remove the athlete's credential. Removing a missing one is not an error.
    async fn clear_credential(&self, athlete_id: u64) -> Result<(), AppError>;

    /// Athletes that currently hold a credential.
    async fn list_credentialed_athletes(&self) -> Result<Vec<u64>, AppError>;
}

#[async_trait]
pub trait AthleteStore: Send + Sync {
    async fn get_athlete(&self, athlete_id: u64) -> Result<Option<Athlete>, AppError>;

    async fn upsert_athlete(&self, athlete: &Athlete) -> Result<(), AppError>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn get_activity(&self, activity_id: u64) -> Result<Option<Activity>, AppError>;

    async fn activity_exists(&self, activity_id: u64) -> Result<bool, AppError> {
        Ok(self.get_activity(activity_id).await?.is_some())
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<(), AppError>;

    async fn delete_activity(&self, activity_id: u64) -> Result<(), AppError>;

    async fn get_streams(&self, activity_id: u64) -> Result<Option<ActivityStreams>, AppError>;

    async fn upsert_streams(&self, streams: &ActivityStreams) -> Result<(), AppError>;

    async fn delete_streams(&self, activity_id: u64) -> Result<(), AppError>;

    /// All heart-rate points of an activity, ordered by time offset.
    async fn list_heart_rate_points(
        &self,
        activity_id: u64,
    ) -> Result<Vec<HeartRatePoint>, AppError>;

    /// Insert one batch of points. Callers keep batches within payload limits.
    async fn insert_heart_rate_points(&self, points: &[HeartRatePoint]) -> Result<(), AppError>;

    async fn delete_heart_rate_points(&self, activity_id: u64) -> Result<(), AppError>;
}

/// Status-stamped table of webhook events.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, record: &WebhookEventRecord) -> Result<(), AppError>;

    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, AppError>;

    /// Move a `pending` event to `processing`, stamping `claimed_at`.
    ///
    /// Returns `None` if the event is missing or not pending.
    async fn claim_event(
        &self,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookEventRecord>, AppError>;

    /// Overwrite `record` only if the stored copy is still in status `from`
    /// with claim stamp `claimed_at`.
    ///
    /// Returns `false`, writing nothing, when the event is missing or has
    /// moved on (for example re-claimed after its lease expired).
    async fn transition_event(
        &self,
        record: &WebhookEventRecord,
        from: EventStatus,
        claimed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError>;

    async fn list_events(
        &self,
        status: EventStatus,
        limit: usize,
    ) -> Result<Vec<WebhookEventRecord>, AppError>;
}

/// The injected datastore handed to every component.
#[derive(Clone)]
pub struct Storage {
    pub credentials: Arc<dyn CredentialStore>,
    pub athletes: Arc<dyn AthleteStore>,
    pub activities: Arc<dyn ActivityStore>,
    pub events: Arc<dyn EventStore>,
}

impl Storage {
    /// Use one backend for every store.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: CredentialStore + AthleteStore + ActivityStore + EventStore + 'static,
    {
        Self {
            credentials: backend.clone(),
            athletes: backend.clone(),
            activities: backend.clone(),
            events: backend,
        }
    }

    /// Fresh in-memory storage.
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }

    pub fn firestore(db: FirestoreDb) -> Self {
        Self::from_backend(Arc::new(db))
    }
}
