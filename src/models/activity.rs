// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Strava activity models for storage.
//!
//! Records carry no local timestamps so that re-syncing identical remote
//! data writes byte-identical documents.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair.
///
/// Stored as a map rather than a two-element array because Firestore cannot
/// hold arrays of arrays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Build from Strava's `[lat, lng]` form; anything else (e.g. `[]` for
    /// indoor activities) yields `None`.
    pub fn from_slice(pair: &[f64]) -> Option<Self> {
        match pair {
            [lat, lng] => Some(Self {
                lat: *lat,
                lng: *lng,
            }),
            _ => None,
        }
    }
}

/// Stored activity record, keyed by Strava activity ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Strava activity ID (also used as document ID)
    pub strava_activity_id: u64,
    /// Strava athlete ID (owner)
    pub athlete_id: u64,
    pub name: String,
    pub description: Option<String>,
    /// Sport type (Ride, Run, Hike, etc.)
    pub sport_type: String,
    /// Legacy activity type
    pub activity_type: Option<String>,
    /// Start date/time (UTC)
    pub start_date: chrono::DateTime<chrono::Utc>,
    /// Start date/time in the athlete's local zone, as reported
    pub start_date_local: Option<String>,
    pub timezone: Option<String>,
    pub start_latlng: Option<LatLng>,
    pub end_latlng: Option<LatLng>,
    /// Distance in meters
    pub distance_meters: f64,
    pub moving_time_secs: u64,
    pub elapsed_time_secs: u64,
    /// Elevation gain in meters
    pub total_elevation_gain: f64,
    pub average_speed: Option<f64>,
    pub max_speed: Option<f64>,
    /// Whether heart-rate data is available for this activity
    pub has_heartrate: bool,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    pub average_cadence: Option<f64>,
    pub average_watts: Option<f64>,
    pub kilojoules: Option<f64>,
    pub calories: Option<f64>,
    /// Equipment reference (bike/shoes)
    pub gear_id: Option<String>,
    /// Device name (e.g. "Garmin Edge 530")
    pub device_name: Option<String>,
    pub trainer: bool,
    pub commute: bool,
    pub manual: bool,
    pub private: bool,
    pub summary_polyline: Option<String>,
}

/// Parallel time-indexed series for one activity.
///
/// One record per activity, replaced wholesale on every sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStreams {
    /// Strava activity ID (also used as document ID)
    pub activity_id: u64,
    pub athlete_id: u64,
    /// Seconds since activity start
    pub time: Option<Vec<f64>>,
    pub distance: Option<Vec<f64>>,
    pub latlng: Option<Vec<LatLng>>,
    pub altitude: Option<Vec<f64>>,
    pub velocity_smooth: Option<Vec<f64>>,
    pub heartrate: Option<Vec<f64>>,
    pub cadence: Option<Vec<f64>>,
    pub watts: Option<Vec<f64>>,
    pub temp: Option<Vec<f64>>,
    pub moving: Option<Vec<bool>>,
    pub grade_smooth: Option<Vec<f64>>,
}

/// One heart-rate sample derived from an activity's streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRatePoint {
    pub activity_id: u64,
    pub athlete_id: u64,
    /// Seconds since activity start
    pub time_offset: i64,
    /// Beats per minute
    pub heart_rate: u32,
}
