// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local storage backend.
//!
//! Used by the test suite and by `STORAGE_BACKEND=memory` for local runs.
//! Upserts are last-write-wins per key, matching Firestore semantics.
//! Heart-rate points are keyed by `(activity_id, time_offset)` like their
//! Firestore document IDs, so re-inserting a point replaces it.

use crate::db::{ActivityStore, AthleteStore, CredentialStore, EventStore};
use crate::error::AppError;
use crate::models::{
    Activity, ActivityStreams, Athlete, Credential, EventStatus, HeartRatePoint,
    WebhookEventRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryStore {
    athletes: DashMap<u64, Athlete>,
    credentials: DashMap<u64, Credential>,
    activities: DashMap<u64, Activity>,
    streams: DashMap<u64, ActivityStreams>,
    heart_rate_points: DashMap<u64, BTreeMap<i64, HeartRatePoint>>,
    events: DashMap<String, WebhookEventRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_credential(&self, athlete_id: u64) -> Result<Option<Credential>, AppError> {
        Ok(self.credentials.get(&athlete_id).map(|c| c.clone()))
    }

    async fn set_credential(
        &self,
        athlete_id: u64,
        credential: &Credential,
    ) -> Result<(), AppError> {
        self.credentials.insert(athlete_id, credential.clone());
        Ok(())
    }

    async fn clear_credential(&self, athlete_id: u64) -> Result<(), AppError> {
        self.credentials.remove(&athlete_id);
        Ok(())
    }

    async fn list_credentialed_athletes(&self) -> Result<Vec<u64>, AppError> {
        let mut ids: Vec<u64> = self.credentials.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl AthleteStore for MemoryStore {
    async fn get_athlete(&self, athlete_id: u64) -> Result<Option<Athlete>, AppError> {
        Ok(self.athletes.get(&athlete_id).map(|a| a.clone()))
    }

    async fn upsert_athlete(&self, athlete: &Athlete) -> Result<(), AppError> {
        self.athletes.insert(athlete.athlete_id, athlete.clone());
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn get_activity(&self, activity_id: u64) -> Result<Option<Activity>, AppError> {
        Ok(self.activities.get(&activity_id).map(|a| a.clone()))
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<(), AppError> {
        self.activities
            .insert(activity.strava_activity_id, activity.clone());
        Ok(())
    }

    async fn delete_activity(&self, activity_id: u64) -> Result<(), AppError> {
        self.activities.remove(&activity_id);
        Ok(())
    }

    async fn get_streams(&self, activity_id: u64) -> Result<Option<ActivityStreams>, AppError> {
        Ok(self.streams.get(&activity_id).map(|s| s.clone()))
    }

    async fn upsert_streams(&self, streams: &ActivityStreams) -> Result<(), AppError> {
        self.streams.insert(streams.activity_id, streams.clone());
        Ok(())
    }

    async fn delete_streams(&self, activity_id: u64) -> Result<(), AppError> {
        self.streams.remove(&activity_id);
        Ok(())
    }

    async fn list_heart_rate_points(
        &self,
        activity_id: u64,
    ) -> Result<Vec<HeartRatePoint>, AppError> {
        Ok(self
            .heart_rate_points
            .get(&activity_id)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_heart_rate_points(&self, points: &[HeartRatePoint]) -> Result<(), AppError> {
        for point in points {
            self.heart_rate_points
                .entry(point.activity_id)
                .or_default()
                .insert(point.time_offset, point.clone());
        }
        Ok(())
    }

    async fn delete_heart_rate_points(&self, activity_id: u64) -> Result<(), AppError> {
        self.heart_rate_points.remove(&activity_id);
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, record: &WebhookEventRecord) -> Result<(), AppError> {
        self.events.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, AppError> {
        Ok(self.events.get(event_id).map(|e| e.clone()))
    }

    async fn claim_event(
        &self,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookEventRecord>, AppError> {
        // The entry guard holds the shard lock, so check-and-set is atomic.
        let Some(mut entry) = self.events.get_mut(event_id) else {
            return Ok(None);
        };
        if entry.status != EventStatus::Pending {
            return Ok(None);
        }
        entry.status = EventStatus::Processing;
        entry.claimed_at = Some(now);
        Ok(Some(entry.clone()))
    }

    async fn transition_event(
        &self,
        record: &WebhookEventRecord,
        from: EventStatus,
        claimed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let Some(mut entry) = self.events.get_mut(&record.id) else {
            return Ok(false);
        };
        if entry.status != from || entry.claimed_at != claimed_at {
            return Ok(false);
        }
        *entry = record.clone();
        Ok(true)
    }

    async fn list_events(
        &self,
        status: EventStatus,
        limit: usize,
    ) -> Result<Vec<WebhookEventRecord>, AppError> {
        let mut events: Vec<WebhookEventRecord> = self
            .events
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.clone())
            .collect();
        events.sort_by_key(|e| e.created_at);
        events.truncate(limit);
        Ok(events)
    }
}
