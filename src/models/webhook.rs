// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook event models: the validated payload, its typed dispatch form,
//! and the durable queue record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Activity,
    Athlete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectType {
    Create,
    Update,
    Delete,
}

/// A structurally valid Strava push notification.
///
/// Only produced by `services::webhook::validate_event`; stored verbatim
/// inside the queue record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub object_type: ObjectType,
    /// Activity ID for activity events, athlete ID for athlete events
    pub object_id: u64,
    pub aspect_type: AspectType,
    pub owner_id: u64,
    pub subscription_id: u64,
    /// Unix timestamp of the change
    pub event_time: i64,
    /// Changed-field hints (updates only), values normalized to strings
    #[serde(default)]
    pub updates: BTreeMap<String, String>,
}

impl WebhookPayload {
    /// Typed view used for dispatch.
    pub fn event(&self) -> WebhookEvent {
        match self.object_type {
            ObjectType::Activity => WebhookEvent::Activity(ActivityEvent {
                activity_id: self.object_id,
                athlete_id: self.owner_id,
                aspect: self.aspect_type,
            }),
            ObjectType::Athlete => WebhookEvent::Athlete(AthleteEvent {
                athlete_id: self.object_id,
                aspect: self.aspect_type,
                updates: self.updates.clone(),
            }),
        }
    }
}

/// Dispatch form of a webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Activity(ActivityEvent),
    Athlete(AthleteEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    pub activity_id: u64,
    pub athlete_id: u64,
    pub aspect: AspectType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AthleteEvent {
    pub athlete_id: u64,
    pub aspect: AspectType,
    pub updates: BTreeMap<String, String>,
}

impl AthleteEvent {
    /// Strava sends: object_type="athlete", aspect_type="update", updates={"authorized": "false"}
    pub fn is_deauthorization(&self) -> bool {
        self.aspect == AspectType::Update
            && self
                .updates
                .get("authorized")
                .is_some_and(|v| v.eq_ignore_ascii_case("false"))
    }
}

/// Processing status of a queued webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EventStatus::Pending),
            "processing" => Ok(EventStatus::Processing),
            "completed" => Ok(EventStatus::Completed),
            "failed" => Ok(EventStatus::Failed),
            other => Err(format!("unknown event status '{}'", other)),
        }
    }
}

/// Durable queue record for one accepted webhook event. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    /// Queue-assigned ID (also used as document ID)
    pub id: String,
    pub event_data: WebhookPayload,
    pub status: EventStatus,
    /// Failed processing attempts so far
    pub attempts: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the current (or last) processing attempt claimed the event
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEventRecord {
    pub fn new_pending(id: String, event_data: WebhookPayload, now: DateTime<Utc>) -> Self {
        Self {
            id,
            event_data,
            status: EventStatus::Pending,
            attempts: 0,
            error_message: None,
            created_at: now,
            claimed_at: None,
            processed_at: None,
        }
    }
}
