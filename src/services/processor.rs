// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook event processor.
//!
//! State machine per event:
//! `pending -> processing -> {completed | pending (retry) | failed}`.
//!
//! Retries are deferred: a failed attempt returns the event to `pending`
//! and the next queue pass picks it up. Nothing sleeps inline here.

use crate::db::{AthleteStore, CredentialStore};
use crate::error::Result;
use crate::models::{AspectType, Athlete, EventStatus, WebhookEvent, WebhookPayload};
use crate::services::activity::{ActivitySync, SyncOutcome};
use crate::services::queue::EventQueue;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    Completed,
    /// Handler failed; back to `pending` for the next pass.
    Retrying { attempts: u32 },
    /// Handler failed at the attempt ceiling; parked for an operator.
    Failed { attempts: u32 },
    /// Event was not `pending` (already claimed or finished).
    Skipped,
    /// The claim was released and taken over before the outcome was
    /// written; the outcome was discarded.
    LeaseLost,
}

/// Counts from one queue pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub released: usize,
    pub completed: usize,
    pub retrying: usize,
    pub failed: usize,
    pub skipped: usize,
    pub lease_lost: usize,
    /// Events whose status could not be recorded.
    pub errors: usize,
}

#[derive(Clone)]
pub struct EventProcessor {
    queue: EventQueue,
    sync: ActivitySync,
    credentials: Arc<dyn CredentialStore>,
    athletes: Arc<dyn AthleteStore>,
}

impl EventProcessor {
    pub fn new(
        queue: EventQueue,
        sync: ActivitySync,
        credentials: Arc<dyn CredentialStore>,
        athletes: Arc<dyn AthleteStore>,
    ) -> Self {
        Self {
            queue,
            sync,
            credentials,
            athletes,
        }
    }

    /// Claim and handle one event, recording the outcome on its record.
    ///
    /// Handler errors are absorbed into the record; only queue storage
    /// failures are returned.
    pub async fn process(&self, event_id: &str) -> Result<ProcessResult> {
        let Some(record) = self.queue.claim(event_id).await? else {
            tracing::debug!(event_id, "Event not pending, skipping");
            return Ok(ProcessResult::Skipped);
        };

        match self.dispatch(&record.event_data).await {
            Ok(()) => {
                if !self.queue.complete(record).await? {
                    return Ok(ProcessResult::LeaseLost);
                }
                tracing::info!(event_id, "Event completed");
                Ok(ProcessResult::Completed)
            }
            Err(e) => {
                let attempts = record.attempts + 1;
                match self.queue.fail(record, attempts, &e.to_string()).await? {
                    None => Ok(ProcessResult::LeaseLost),
                    Some(EventStatus::Failed) => {
                        tracing::error!(event_id, attempts, error = %e, "Event failed permanently");
                        Ok(ProcessResult::Failed { attempts })
                    }
                    Some(_) => {
                        tracing::warn!(event_id, attempts, error = %e, "Event failed, will retry");
                        Ok(ProcessResult::Retrying { attempts })
                    }
                }
            }
        }
    }

    /// Route a payload to its handler.
    pub async fn dispatch(&self, payload: &WebhookPayload) -> Result<()> {
        match payload.event() {
            WebhookEvent::Activity(event) => match event.aspect {
                AspectType::Create | AspectType::Update => {
                    match self
                        .sync
                        .sync_activity(event.activity_id, event.athlete_id)
                        .await
                    {
                        Ok(SyncOutcome::Complete | SyncOutcome::Partial(_)) => Ok(()),
                        // Deleted (or hidden) on Strava before we got to it
                        Err(e) if e.is_provider_not_found() => {
                            tracing::warn!(
                                activity_id = event.activity_id,
                                athlete_id = event.athlete_id,
                                "Activity no longer exists on Strava, removing local copy"
                            );
                            self.sync.delete_activity(event.activity_id).await
                        }
                        Err(e) => Err(e),
                    }
                }
                AspectType::Delete => self.sync.delete_activity(event.activity_id).await,
            },
            WebhookEvent::Athlete(event) if event.is_deauthorization() => {
                self.deauthorize(event.athlete_id).await
            }
            WebhookEvent::Athlete(event) => {
                tracing::debug!(
                    athlete_id = event.athlete_id,
                    aspect = ?event.aspect,
                    "Ignoring athlete event"
                );
                Ok(())
            }
        }
    }

    /// Clear the athlete's credential and mark their subscription inactive.
    pub async fn deauthorize(&self, athlete_id: u64) -> Result<()> {
        tracing::info!(athlete_id, "Processing deauthorization");

        self.credentials.clear_credential(athlete_id).await?;

        let mut athlete = self
            .athletes
            .get_athlete(athlete_id)
            .await?
            .unwrap_or_else(|| Athlete::new(athlete_id));
        athlete.webhook_subscription_active = false;
        athlete.deauthorized_at = Some(Utc::now());
        self.athletes.upsert_athlete(&athlete).await?;

        tracing::info!(athlete_id, "Athlete deauthorized");
        Ok(())
    }

    /// One queue pass: release stale leases, then process pending events.
    ///
    /// Stops between events once `shutdown` is cancelled.
    pub async fn run_pass(
        &self,
        lease: Duration,
        limit: usize,
        shutdown: &CancellationToken,
    ) -> Result<PassSummary> {
        let mut summary = PassSummary {
            released: self.queue.requeue_stale(lease, limit).await?,
            ..Default::default()
        };

        for record in self.queue.pending(limit).await? {
            if shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, ending queue pass early");
                break;
            }
            match self.process(&record.id).await {
                Ok(ProcessResult::Completed) => summary.completed += 1,
                Ok(ProcessResult::Retrying { .. }) => summary.retrying += 1,
                Ok(ProcessResult::Failed { .. }) => summary.failed += 1,
                Ok(ProcessResult::Skipped) => summary.skipped += 1,
                Ok(ProcessResult::LeaseLost) => summary.lease_lost += 1,
                Err(e) => {
                    tracing::error!(event_id = %record.id, error = %e, "Failed to record event outcome");
                    summary.errors += 1;
                }
            }
        }

        Ok(summary)
    }
}
