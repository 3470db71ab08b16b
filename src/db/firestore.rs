// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the production implementation of the store traits:
//! - Athletes (subscription state)
//! - Tokens (OAuth credentials)
//! - Activities, activity streams and heart-rate points
//! - Webhook events (durable queue)

use crate::db::{collections, ActivityStore, AthleteStore, CredentialStore, EventStore};
use crate::error::AppError;
use crate::models::{
    Activity, ActivityStreams, Athlete, Credential, EventStatus, HeartRatePoint,
    WebhookEventRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Token document, keyed by athlete ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenDocument {
    athlete_id: u64,
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl TokenDocument {
    fn new(athlete_id: u64, credential: &Credential) -> Self {
        Self {
            athlete_id,
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            expires_at: credential.expires_at,
        }
    }

    fn into_credential(self) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
        }
    }
}

fn heart_rate_point_id(point: &HeartRatePoint) -> String {
    format!("{}_{}", point.activity_id, point.time_offset)
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Storage(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client; every operation returns a storage error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Storage("Database not connected (offline mode)".to_string()))
    }

    // ─── Helper Methods ────────────────────────────────────────────

    async fn get_doc<T>(&self, collection: &str, doc_id: &str) -> Result<Option<T>, AppError>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(doc_id)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    async fn set_doc<T>(&self, collection: &str, doc_id: &str, object: &T) -> Result<(), AppError>
    where
        T: Serialize + Sync + Send + for<'de> Deserialize<'de>,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_doc(&self, collection: &str, doc_id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collection)
            .document_id(doc_id)
            .execute()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Storage(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Storage(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

// ─── Token Operations ────────────────────────────────────────

#[async_trait]
impl CredentialStore for FirestoreDb {
    async fn get_credential(&self, athlete_id: u64) -> Result<Option<Credential>, AppError> {
        let doc: Option<TokenDocument> = self
            .get_doc(collections::TOKENS, &athlete_id.to_string())
            .await?;
        Ok(doc.map(TokenDocument::into_credential))
    }

    async fn set_credential(
        &self,
        athlete_id: u64,
        credential: &Credential,
    ) -> Result<(), AppError> {
        // Single document write: access and refresh token land together.
        let doc = TokenDocument::new(athlete_id, credential);
        self.set_doc(collections::TOKENS, &athlete_id.to_string(), &doc)
            .await
    }

    async fn clear_credential(&self, athlete_id: u64) -> Result<(), AppError> {
        self.delete_doc(collections::TOKENS, &athlete_id.to_string())
            .await
    }

    async fn list_credentialed_athletes(&self) -> Result<Vec<u64>, AppError> {
        let docs: Vec<TokenDocument> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TOKENS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let mut ids: Vec<u64> = docs.into_iter().map(|d| d.athlete_id).collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

// ─── Athlete Operations ──────────────────────────────────────

#[async_trait]
impl AthleteStore for FirestoreDb {
    async fn get_athlete(&self, athlete_id: u64) -> Result<Option<Athlete>, AppError> {
        self.get_doc(collections::ATHLETES, &athlete_id.to_string())
            .await
    }

    async fn upsert_athlete(&self, athlete: &Athlete) -> Result<(), AppError> {
        self.set_doc(
            collections::ATHLETES,
            &athlete.athlete_id.to_string(),
            athlete,
        )
        .await
    }
}

// ─── Activity Operations ─────────────────────────────────────

#[async_trait]
impl ActivityStore for FirestoreDb {
    async fn get_activity(&self, activity_id: u64) -> Result<Option<Activity>, AppError> {
        self.get_doc(collections::ACTIVITIES, &activity_id.to_string())
            .await
    }

    async fn upsert_activity(&self, activity: &Activity) -> Result<(), AppError> {
        self.set_doc(
            collections::ACTIVITIES,
            &activity.strava_activity_id.to_string(),
            activity,
        )
        .await
    }

    async fn delete_activity(&self, activity_id: u64) -> Result<(), AppError> {
        self.delete_doc(collections::ACTIVITIES, &activity_id.to_string())
            .await
    }

    async fn get_streams(&self, activity_id: u64) -> Result<Option<ActivityStreams>, AppError> {
        self.get_doc(collections::ACTIVITY_STREAMS, &activity_id.to_string())
            .await
    }

    async fn upsert_streams(&self, streams: &ActivityStreams) -> Result<(), AppError> {
        self.set_doc(
            collections::ACTIVITY_STREAMS,
            &streams.activity_id.to_string(),
            streams,
        )
        .await
    }

    async fn delete_streams(&self, activity_id: u64) -> Result<(), AppError> {
        self.delete_doc(collections::ACTIVITY_STREAMS, &activity_id.to_string())
            .await
    }

    async fn list_heart_rate_points(
        &self,
        activity_id: u64,
    ) -> Result<Vec<HeartRatePoint>, AppError> {
        let mut points: Vec<HeartRatePoint> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::HEART_RATE_POINTS)
            .filter(|q| q.for_all([q.field("activity_id").eq(activity_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        // Sorted here to avoid a composite index on (activity_id, time_offset).
        points.sort_by_key(|p| p.time_offset);
        Ok(points)
    }

    async fn insert_heart_rate_points(&self, points: &[HeartRatePoint]) -> Result<(), AppError> {
        let client = self.get_client()?;

        for chunk in points.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

            for point in chunk {
                client
                    .fluent()
                    .update()
                    .in_col(collections::HEART_RATE_POINTS)
                    .document_id(heart_rate_point_id(point))
                    .object(point)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Storage(format!(
                            "Failed to add heart-rate point to transaction: {}",
                            e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Storage(format!("Failed to commit heart-rate points: {}", e))
            })?;
        }

        Ok(())
    }

    async fn delete_heart_rate_points(&self, activity_id: u64) -> Result<(), AppError> {
        let points = self.list_heart_rate_points(activity_id).await?;
        let count = points.len();

        self.batch_delete(
            &points,
            collections::HEART_RATE_POINTS,
            heart_rate_point_id,
        )
        .await?;

        tracing::debug!(activity_id, count, "Deleted heart-rate points");
        Ok(())
    }
}

// ─── Webhook Event Operations ────────────────────────────────

#[async_trait]
impl EventStore for FirestoreDb {
    async fn insert_event(&self, record: &WebhookEventRecord) -> Result<(), AppError> {
        self.set_doc(collections::WEBHOOK_EVENTS, &record.id, record)
            .await
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, AppError> {
        self.get_doc(collections::WEBHOOK_EVENTS, event_id).await
    }

    async fn claim_event(
        &self,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WebhookEventRecord>, AppError> {
        let Some(mut record) = self.get_event(event_id).await? else {
            return Ok(None);
        };
        if record.status != EventStatus::Pending {
            return Ok(None);
        }

        let previous_claim = record.claimed_at;
        record.status = EventStatus::Processing;
        record.claimed_at = Some(now);
        if !self
            .transition_event(&record, EventStatus::Pending, previous_claim)
            .await?
        {
            tracing::debug!(event_id, "Event claimed concurrently");
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn transition_event(
        &self,
        record: &WebhookEventRecord,
        from: EventStatus,
        claimed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to begin transaction: {}", e)))?;

        // Read through the transaction so a concurrent write to the event
        // aborts the commit.
        let current: Option<WebhookEventRecord> = client
            .clone_with_consistency_selector(firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ))
            .fluent()
            .select()
            .by_id_in(collections::WEBHOOK_EVENTS)
            .obj()
            .one(&record.id)
            .await
            .map_err(|e| {
                AppError::Storage(format!("Failed to read event in transaction: {}", e))
            })?;

        let unchanged = current
            .as_ref()
            .is_some_and(|stored| stored.status == from && stored.claimed_at == claimed_at);
        if !unchanged {
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        client
            .fluent()
            .update()
            .in_col(collections::WEBHOOK_EVENTS)
            .document_id(&record.id)
            .object(record)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Storage(format!("Failed to add event to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Storage(format!("Transaction commit failed: {}", e)))?;

        Ok(true)
    }

    async fn list_events(
        &self,
        status: EventStatus,
        limit: usize,
    ) -> Result<Vec<WebhookEventRecord>, AppError> {
        let status = status.as_str();
        let limit = u32::try_from(limit).unwrap_or(u32::MAX);

        self.get_client()?
            .fluent()
            .select()
            .from(collections::WEBHOOK_EVENTS)
            .filter(move |q| q.for_all([q.field("status").eq(status)]))
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }
}
