// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod athlete;
pub mod webhook;

pub use activity::{Activity, ActivityStreams, HeartRatePoint, LatLng};
pub use athlete::{Athlete, Credential};
pub use webhook::{
    ActivityEvent, AspectType, AthleteEvent, EventStatus, ObjectType, WebhookEvent,
    WebhookEventRecord, WebhookPayload,
};
