// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Pulse-Sync: keeps local copies of Strava activities in step with Strava
//!
//! This crate receives Strava webhook pushes, queues them durably,
//! and syncs activities, streams and heart-rate samples into storage,
//! with a polling sweep to catch anything the webhooks missed.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::Storage;
use error::AppError;
use services::{
    ActivitySync, EventProcessor, EventQueue, Reconciler, RetryPolicy, StravaClient, SyncOptions,
};
use tokio_util::sync::CancellationToken;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub storage: Storage,
    pub queue: EventQueue,
    pub processor: EventProcessor,
    pub reconciler: Reconciler,
    /// Cancelled once on shutdown; observed by workers and sweeps.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every component against one storage bundle.
    pub fn new(config: Config, storage: Storage) -> Result<Self, AppError> {
        let shutdown = CancellationToken::new();

        let strava = StravaClient::new(&config, storage.credentials.clone())?;
        let sync = ActivitySync::new(
            strava.clone(),
            storage.activities.clone(),
            SyncOptions::from_config(&config),
            shutdown.clone(),
        );
        let queue = EventQueue::new(
            storage.events.clone(),
            RetryPolicy::deferred(config.event_max_attempts),
        );
        let processor = EventProcessor::new(
            queue.clone(),
            sync.clone(),
            storage.credentials.clone(),
            storage.athletes.clone(),
        );
        let reconciler = Reconciler::new(
            strava,
            sync,
            storage.credentials.clone(),
            storage.activities.clone(),
            config.polling_enabled,
            config.polling_activity_limit,
        );

        Ok(Self {
            config,
            storage,
            queue,
            processor,
            reconciler,
            shutdown,
        })
    }
}
