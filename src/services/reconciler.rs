// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Polling reconciler.
//!
//! Best-effort catch-up for webhooks that never arrived: for each athlete
//! with credentials, syncs any of their most recent activities that are
//! missing locally. Only creates are reconciled; remote deletions and
//! updates outside the webhook path are not detected.

use crate::db::{ActivityStore, CredentialStore};
use crate::error::Result;
use crate::services::activity::ActivitySync;
use crate::services::StravaClient;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MAX_CONCURRENT_LOOKUPS: usize = 10;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub athletes_checked: usize,
    pub athletes_failed: usize,
    pub activities_synced: usize,
    pub activities_failed: usize,
    pub interrupted: bool,
}

#[derive(Clone)]
pub struct Reconciler {
    strava: StravaClient,
    sync: ActivitySync,
    credentials: Arc<dyn CredentialStore>,
    activities: Arc<dyn ActivityStore>,
    enabled: bool,
    activity_limit: u32,
}

impl Reconciler {
    pub fn new(
        strava: StravaClient,
        sync: ActivitySync,
        credentials: Arc<dyn CredentialStore>,
        activities: Arc<dyn ActivityStore>,
        enabled: bool,
        activity_limit: u32,
    ) -> Self {
        Self {
            strava,
            sync,
            credentials,
            activities,
            enabled,
            activity_limit,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Sweep every credentialed athlete once.
    ///
    /// Errors are isolated per athlete. Cancellation is checked between
    /// athletes; an interrupted sweep is safe to resume on the next tick.
    pub async fn sweep(&self, shutdown: &CancellationToken) -> Result<SweepSummary> {
        let mut summary = SweepSummary::default();
        if !self.enabled {
            tracing::debug!("Polling disabled, skipping reconciliation");
            return Ok(summary);
        }

        let athletes = self.credentials.list_credentialed_athletes().await?;
        tracing::info!(athletes = athletes.len(), "Starting reconciliation sweep");

        for athlete_id in athletes {
            if shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, ending reconciliation early");
                summary.interrupted = true;
                break;
            }

            summary.athletes_checked += 1;
            match self.reconcile_athlete(athlete_id, &mut summary).await {
                Ok(()) => {}
                Err(e) => {
                    summary.athletes_failed += 1;
                    tracing::warn!(athlete_id, error = %e, "Reconciliation failed for athlete");
                }
            }
        }

        tracing::info!(
            athletes_checked = summary.athletes_checked,
            athletes_failed = summary.athletes_failed,
            activities_synced = summary.activities_synced,
            activities_failed = summary.activities_failed,
            "Reconciliation sweep finished"
        );
        Ok(summary)
    }

    async fn reconcile_athlete(&self, athlete_id: u64, summary: &mut SweepSummary) -> Result<()> {
        let recent = self
            .strava
            .list_activities(athlete_id, self.activity_limit)
            .await?;

        let lookups: Vec<(u64, Result<bool>)> = stream::iter(recent)
            .map(|activity| async move {
                (activity.id, self.activities.activity_exists(activity.id).await)
            })
            .buffered(MAX_CONCURRENT_LOOKUPS)
            .collect()
            .await;

        // A failed lookup only skips that activity; the next sweep retries it.
        let mut missing = Vec::new();
        for (activity_id, lookup) in lookups {
            match lookup {
                Ok(true) => {}
                Ok(false) => missing.push(activity_id),
                Err(e) => {
                    summary.activities_failed += 1;
                    tracing::warn!(
                        athlete_id,
                        activity_id,
                        error = %e,
                        "Failed to check for local activity"
                    );
                }
            }
        }

        for activity_id in missing {
            tracing::info!(athlete_id, activity_id, "Syncing missing activity");
            match self.sync.sync_activity(activity_id, athlete_id).await {
                Ok(_) => summary.activities_synced += 1,
                Err(e) => {
                    summary.activities_failed += 1;
                    tracing::warn!(
                        athlete_id,
                        activity_id,
                        error = %e,
                        "Failed to sync missing activity"
                    );
                }
            }
        }

        Ok(())
    }
}
