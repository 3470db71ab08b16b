// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable webhook event queue.
//!
//! A status-stamped table over `EventStore`, not a priority queue: ordering
//! across events is not guaranteed. Records are never deleted.
//!
//! Every transition out of a claim is conditional on the claim stamp, so a
//! worker whose lease was released and re-claimed cannot overwrite the
//! newer outcome.

use crate::db::EventStore;
use crate::error::{AppError, Result};
use crate::models::{EventStatus, WebhookEventRecord, WebhookPayload};
use crate::services::retry::RetryPolicy;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct EventQueue {
    events: Arc<dyn EventStore>,
    retry: RetryPolicy,
}

impl EventQueue {
    /// `retry` decides when a failing event is parked as `failed`.
    pub fn new(events: Arc<dyn EventStore>, retry: RetryPolicy) -> Self {
        Self { events, retry }
    }

    /// Store a validated payload as `pending` and return its ID.
    pub async fn enqueue(&self, payload: WebhookPayload) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let record = WebhookEventRecord::new_pending(id.clone(), payload, Utc::now());
        self.events.insert_event(&record).await?;

        tracing::info!(
            event_id = %id,
            object_type = ?record.event_data.object_type,
            aspect_type = ?record.event_data.aspect_type,
            object_id = record.event_data.object_id,
            "Webhook event enqueued"
        );
        Ok(id)
    }

    /// Move a `pending` event to `processing`. `None` if it is not pending.
    pub async fn claim(&self, event_id: &str) -> Result<Option<WebhookEventRecord>> {
        self.events.claim_event(event_id, Utc::now()).await
    }

    /// Mark a claimed event `completed`.
    ///
    /// Returns `false` if the claim was lost and nothing was written.
    pub async fn complete(&self, mut record: WebhookEventRecord) -> Result<bool> {
        record.status = EventStatus::Completed;
        record.error_message = None;
        record.processed_at = Some(Utc::now());
        self.release_claim(&record).await
    }

    /// Record a failed attempt and return the new status: `pending` for a
    /// later pass, or `failed` once `attempts` reaches the maximum.
    ///
    /// Returns `None` if the claim was lost and nothing was written.
    pub async fn fail(
        &self,
        mut record: WebhookEventRecord,
        attempts: u32,
        error: &str,
    ) -> Result<Option<EventStatus>> {
        record.attempts = attempts;
        record.error_message = Some(error.to_string());
        record.status = if self.retry.allows_attempt(attempts) {
            EventStatus::Pending
        } else {
            record.processed_at = Some(Utc::now());
            EventStatus::Failed
        };
        let status = record.status;
        Ok(self.release_claim(&record).await?.then_some(status))
    }

    /// Write the outcome of a claim if the event still carries that claim.
    async fn release_claim(&self, record: &WebhookEventRecord) -> Result<bool> {
        let written = self
            .events
            .transition_event(record, EventStatus::Processing, record.claimed_at)
            .await?;
        if !written {
            tracing::warn!(
                event_id = %record.id,
                claimed_at = ?record.claimed_at,
                status = %record.status,
                "Event claim was lost, discarding outcome"
            );
        }
        Ok(written)
    }

    pub async fn pending(&self, limit: usize) -> Result<Vec<WebhookEventRecord>> {
        self.events.list_events(EventStatus::Pending, limit).await
    }

    pub async fn list(&self, status: EventStatus, limit: usize) -> Result<Vec<WebhookEventRecord>> {
        self.events.list_events(status, limit).await
    }

    pub async fn get(&self, event_id: &str) -> Result<Option<WebhookEventRecord>> {
        self.events.get_event(event_id).await
    }

    /// Return events held in `processing` longer than `lease` to `pending`.
    ///
    /// Covers a worker that died mid-event. The attempt counter is left
    /// unchanged. Returns the number of events released.
    pub async fn requeue_stale(&self, lease: Duration, limit: usize) -> Result<usize> {
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid lease: {}", e)))?;
        let cutoff = Utc::now() - lease;

        let mut released = 0;
        for mut record in self.events.list_events(EventStatus::Processing, limit).await? {
            let stale = record.claimed_at.map_or(true, |claimed| claimed < cutoff);
            if !stale {
                continue;
            }
            tracing::warn!(
                event_id = %record.id,
                claimed_at = ?record.claimed_at,
                "Releasing stale event lease"
            );
            record.status = EventStatus::Pending;
            // The claim stamp is kept so the old holder's late write is refused.
            if self
                .events
                .transition_event(&record, EventStatus::Processing, record.claimed_at)
                .await?
            {
                released += 1;
            }
        }
        Ok(released)
    }

    /// Operator retry: reset a `failed` event to `pending` with no attempts.
    pub async fn retry_failed(&self, event_id: &str) -> Result<WebhookEventRecord> {
        let mut record = self
            .events
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {}", event_id)))?;

        if record.status != EventStatus::Failed {
            return Err(AppError::Validation(format!(
                "Event {} is {}, only failed events can be retried",
                event_id, record.status
            )));
        }

        let previous_claim = record.claimed_at;
        record.status = EventStatus::Pending;
        record.attempts = 0;
        record.error_message = None;
        record.claimed_at = None;
        record.processed_at = None;
        if !self
            .events
            .transition_event(&record, EventStatus::Failed, previous_claim)
            .await?
        {
            return Err(AppError::Validation(format!(
                "Event {} changed while being retried",
                event_id
            )));
        }

        tracing::info!(event_id, "Failed event reset to pending");
        Ok(record)
    }
}
