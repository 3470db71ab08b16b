// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Athlete account and OAuth credential models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Local record of a connected Strava athlete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Athlete {
    /// Strava athlete ID (also used as document ID)
    pub athlete_id: u64,
    /// Whether webhook events for this athlete are still expected
    pub webhook_subscription_active: bool,
    /// Set when Strava signalled that access was revoked
    #[serde(default)]
    pub deauthorized_at: Option<DateTime<Utc>>,
}

impl Athlete {
    pub fn new(athlete_id: u64) -> Self {
        Self {
            athlete_id,
            webhook_subscription_active: true,
            deauthorized_at: None,
        }
    }
}

/// OAuth token material for one athlete.
///
/// Access and refresh tokens are only ever replaced together.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry of the access token
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True if the access token is expired or will expire within `margin`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
