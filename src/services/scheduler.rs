// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background workers: the queue pass and the reconciliation sweep.
//!
//! Both run on fixed intervals until the shutdown token is cancelled. A tick
//! that falls due while a pass is still running is skipped, not queued.

use crate::services::processor::{EventProcessor, PassSummary};
use crate::services::reconciler::Reconciler;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Spawn the queue worker. The first pass runs immediately.
pub fn spawn_queue_worker(
    processor: EventProcessor,
    every: Duration,
    lease: Duration,
    batch_size: usize,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match processor.run_pass(lease, batch_size, &shutdown).await {
                        Ok(summary) if summary == PassSummary::default() => {}
                        Ok(summary) => tracing::info!(?summary, "Queue pass finished"),
                        Err(e) => tracing::error!(error = %e, "Queue pass failed"),
                    }
                }
            }
        }

        tracing::info!("Queue worker stopped");
    })
}

/// Spawn the reconciliation worker. The first sweep runs one interval after
/// startup.
pub fn spawn_reconciler_worker(
    reconciler: Reconciler,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // discard first immediate tick

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = reconciler.sweep(&shutdown).await {
                        tracing::error!(error = %e, "Reconciliation sweep failed");
                    }
                }
            }
        }

        tracing::info!("Reconciliation worker stopped");
    })
}
