// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pulse-Sync Server
//!
//! Receives Strava webhooks and keeps activity data in sync, with a
//! background queue worker and a polling reconciler.

use pulse_sync::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, Storage},
    services::scheduler,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Pulse-Sync");
    if config.event_lease <= config.sync_budget() {
        tracing::warn!(
            lease_secs = config.event_lease.as_secs(),
            sync_budget_secs = config.sync_budget().as_secs(),
            "Event lease is shorter than a throttled sync; slow events may be handled twice"
        );
    }

    let storage = match config.storage_backend {
        StorageBackend::Firestore => {
            let db = FirestoreDb::new(&config.gcp_project_id).await?;
            tracing::info!(project = %config.gcp_project_id, "Firestore storage initialized");
            Storage::firestore(db)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Storage::memory()
        }
    };

    let state = Arc::new(AppState::new(config.clone(), storage)?);
    let shutdown = state.shutdown.clone();

    let queue_worker = scheduler::spawn_queue_worker(
        state.processor.clone(),
        config.queue_poll_interval,
        config.event_lease,
        config.queue_batch_size,
        shutdown.clone(),
    );
    let reconciler_worker = scheduler::spawn_reconciler_worker(
        state.reconciler.clone(),
        config.polling_interval,
        shutdown.clone(),
    );
    tracing::info!(
        queue_interval_secs = config.queue_poll_interval.as_secs(),
        polling_enabled = state.reconciler.enabled(),
        polling_interval_secs = config.polling_interval.as_secs(),
        "Background workers started"
    );

    // Build router
    let app = pulse_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = tokio::join!(queue_worker, reconciler_worker);
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pulse_sync=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
