// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity sync engine.
//!
//! Handles the core workflow:
//! 1. Fetch activity detail from Strava
//! 2. Upsert the activity record (the primary unit of truth)
//! 3. If the activity has heart-rate data: fetch and upsert its streams
//! 4. Replace the derived heart-rate points in batches
//!
//! Failures after step 2 are logged and reported as a partial sync; they
//! never fail the operation.

use crate::config::Config;
use crate::db::ActivityStore;
use crate::error::{AppError, Result};
use crate::models::{Activity, ActivityStreams, HeartRatePoint, LatLng};
use crate::services::strava::{StravaActivity, StravaStreamSet};
use crate::services::StravaClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which detail data a sync fetches and stores.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub fetch_streams: bool,
    pub stream_keys: Vec<String>,
    pub process_heart_rate: bool,
    pub heart_rate_batch_size: usize,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch_streams: config.fetch_streams,
            stream_keys: config.stream_keys.clone(),
            process_heart_rate: config.process_heart_rate,
            heart_rate_batch_size: config.heart_rate_batch_size.max(1),
        }
    }
}

/// Result of a sync whose activity record was stored.
#[derive(Debug)]
pub enum SyncOutcome {
    Complete,
    /// Summary stored, detail incomplete.
    Partial(PartialSyncWarning),
}

/// Why the detail data of a synced activity is incomplete.
#[derive(Debug, thiserror::Error)]
pub enum PartialSyncWarning {
    #[error("stream fetch failed: {0}")]
    StreamFetch(AppError),

    #[error("stream upsert failed: {0}")]
    StreamStore(AppError),

    #[error("heart-rate points not replaced: {0}")]
    HeartRateStore(AppError),

    /// Points are only derived from index-aligned series.
    #[error("heart-rate series has {heart_rate} samples but time series has {time}")]
    MisalignedSeries { heart_rate: usize, time: usize },

    #[error("shutdown after inserting {inserted} of {total} heart-rate points")]
    Interrupted { inserted: usize, total: usize },
}

/// Syncs and deletes activities.
#[derive(Clone)]
pub struct ActivitySync {
    strava: StravaClient,
    activities: Arc<dyn ActivityStore>,
    options: SyncOptions,
    shutdown: CancellationToken,
}

impl ActivitySync {
    pub fn new(
        strava: StravaClient,
        activities: Arc<dyn ActivityStore>,
        options: SyncOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            strava,
            activities,
            options,
            shutdown,
        }
    }

    /// Fetch an activity and upsert it with its streams.
    ///
    /// Fetch and activity upsert errors propagate unchanged. Re-running with
    /// identical remote data leaves storage unchanged.
    pub async fn sync_activity(&self, activity_id: u64, athlete_id: u64) -> Result<SyncOutcome> {
        tracing::info!(athlete_id, activity_id, "Syncing activity");

        let detail = self.strava.get_activity(athlete_id, activity_id).await?;
        let has_heartrate = detail.has_heartrate;

        let activity = activity_record(detail, athlete_id);
        self.activities.upsert_activity(&activity).await?;

        if !(has_heartrate && self.options.fetch_streams) {
            tracing::info!(athlete_id, activity_id, "Activity synced");
            return Ok(SyncOutcome::Complete);
        }

        match self.sync_streams(activity_id, athlete_id).await {
            None => {
                tracing::info!(athlete_id, activity_id, "Activity synced with streams");
                Ok(SyncOutcome::Complete)
            }
            Some(warning) => {
                tracing::warn!(
                    athlete_id,
                    activity_id,
                    warning = %warning,
                    "Activity synced without complete stream data"
                );
                Ok(SyncOutcome::Partial(warning))
            }
        }
    }

    /// Fetch and store streams and heart-rate points. Returns the first
    /// problem encountered, if any.
    async fn sync_streams(&self, activity_id: u64, athlete_id: u64) -> Option<PartialSyncWarning> {
        let streams = match self
            .strava
            .get_activity_streams(athlete_id, activity_id, &self.options.stream_keys)
            .await
        {
            Ok(s) => s,
            Err(e) => return Some(PartialSyncWarning::StreamFetch(e)),
        };

        let record = stream_record(activity_id, athlete_id, streams);
        let mut warning = self
            .activities
            .upsert_streams(&record)
            .await
            .err()
            .map(PartialSyncWarning::StreamStore);

        if self.options.process_heart_rate {
            if let Err(w) = self.replace_heart_rate_points(&record).await {
                warning.get_or_insert(w);
            }
        }

        warning
    }

    /// Delete the activity's points and insert the freshly derived set.
    async fn replace_heart_rate_points(
        &self,
        streams: &ActivityStreams,
    ) -> std::result::Result<(), PartialSyncWarning> {
        let (Some(time), Some(heartrate)) = (&streams.time, &streams.heartrate) else {
            return Ok(());
        };

        let points = heart_rate_points(streams.activity_id, streams.athlete_id, time, heartrate)
            .ok_or(PartialSyncWarning::MisalignedSeries {
                heart_rate: heartrate.len(),
                time: time.len(),
            })?;

        self.activities
            .delete_heart_rate_points(streams.activity_id)
            .await
            .map_err(PartialSyncWarning::HeartRateStore)?;

        let total = points.len();
        let mut inserted = 0;
        for batch in points.chunks(self.options.heart_rate_batch_size) {
            if self.shutdown.is_cancelled() {
                return Err(PartialSyncWarning::Interrupted { inserted, total });
            }
            self.activities
                .insert_heart_rate_points(batch)
                .await
                .map_err(PartialSyncWarning::HeartRateStore)?;
            inserted += batch.len();
        }

        tracing::debug!(
            activity_id = streams.activity_id,
            points = total,
            "Heart-rate points replaced"
        );
        Ok(())
    }

    /// Remove an activity with its streams and heart-rate points.
    ///
    /// Every deletion is attempted; only a failure to delete the activity
    /// record fails the call. Deleting an unknown ID succeeds.
    pub async fn delete_activity(&self, activity_id: u64) -> Result<()> {
        tracing::info!(activity_id, "Deleting activity");

        let activity_result = self.activities.delete_activity(activity_id).await;

        if let Err(e) = self.activities.delete_streams(activity_id).await {
            tracing::warn!(activity_id, error = %e, "Failed to delete activity streams");
        }
        if let Err(e) = self.activities.delete_heart_rate_points(activity_id).await {
            tracing::warn!(activity_id, error = %e, "Failed to delete heart-rate points");
        }

        activity_result
    }
}

/// Build the stored record from Strava's detail response.
pub fn activity_record(detail: StravaActivity, athlete_id: u64) -> Activity {
    let start_latlng = detail.start_latlng();
    let end_latlng = detail.end_latlng();
    let summary_polyline = detail.summary_polyline().map(str::to_string);

    Activity {
        strava_activity_id: detail.id,
        athlete_id,
        name: detail.name,
        description: detail.description,
        sport_type: detail.sport_type,
        activity_type: detail.activity_type,
        start_date: detail.start_date,
        start_date_local: detail.start_date_local,
        timezone: detail.timezone,
        start_latlng,
        end_latlng,
        distance_meters: detail.distance,
        moving_time_secs: detail.moving_time,
        elapsed_time_secs: detail.elapsed_time,
        total_elevation_gain: detail.total_elevation_gain,
        average_speed: detail.average_speed,
        max_speed: detail.max_speed,
        has_heartrate: detail.has_heartrate,
        average_heartrate: detail.average_heartrate,
        max_heartrate: detail.max_heartrate,
        average_cadence: detail.average_cadence,
        average_watts: detail.average_watts,
        kilojoules: detail.kilojoules,
        calories: detail.calories,
        gear_id: detail.gear_id,
        device_name: detail.device_name,
        trainer: detail.trainer,
        commute: detail.commute,
        manual: detail.manual,
        private: detail.private,
        summary_polyline,
    }
}

/// Build the stored stream bundle from Strava's keyed stream set.
pub fn stream_record(activity_id: u64, athlete_id: u64, streams: StravaStreamSet) -> ActivityStreams {
    ActivityStreams {
        activity_id,
        athlete_id,
        time: streams.time.map(|s| s.data),
        distance: streams.distance.map(|s| s.data),
        latlng: streams.latlng.map(|s| {
            s.data
                .into_iter()
                .map(|[lat, lng]| LatLng { lat, lng })
                .collect()
        }),
        altitude: streams.altitude.map(|s| s.data),
        velocity_smooth: streams.velocity_smooth.map(|s| s.data),
        heartrate: streams.heartrate.map(|s| s.data),
        cadence: streams.cadence.map(|s| s.data),
        watts: streams.watts.map(|s| s.data),
        temp: streams.temp.map(|s| s.data),
        moving: streams.moving.map(|s| s.data),
        grade_smooth: streams.grade_smooth.map(|s| s.data),
    }
}

/// Pair time offsets with heart-rate samples by index.
///
/// Returns `None` when the series lengths differ: misaligned samples are
/// never stored.
pub fn heart_rate_points(
    activity_id: u64,
    athlete_id: u64,
    time: &[f64],
    heartrate: &[f64],
) -> Option<Vec<HeartRatePoint>> {
    if time.len() != heartrate.len() {
        return None;
    }

    Some(
        time.iter()
            .zip(heartrate)
            .map(|(t, hr)| HeartRatePoint {
                activity_id,
                athlete_id,
                time_offset: t.round() as i64,
                heart_rate: hr.round() as u32,
            })
            .collect(),
    )
}
