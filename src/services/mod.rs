// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - sync pipeline logic.

pub mod activity;
pub mod processor;
pub mod queue;
pub mod reconciler;
pub mod retry;
pub mod scheduler;
pub mod strava;
pub mod webhook;

pub use activity::{ActivitySync, PartialSyncWarning, SyncOptions, SyncOutcome};
pub use processor::{EventProcessor, PassSummary, ProcessResult};
pub use queue::EventQueue;
pub use reconciler::{Reconciler, SweepSummary};
pub use retry::RetryPolicy;
pub use strava::StravaClient;
