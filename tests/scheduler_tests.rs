// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background worker lifecycle tests.

mod common;

use pulse_sync::config::Config;
use pulse_sync::models::{AspectType, EventStatus, ObjectType, WebhookPayload};
use pulse_sync::services::scheduler::{spawn_queue_worker, spawn_reconciler_worker};
use std::collections::BTreeMap;
use std::time::Duration;

fn delete_event(object_id: u64) -> WebhookPayload {
    WebhookPayload {
        object_type: ObjectType::Activity,
        object_id,
        aspect_type: AspectType::Delete,
        owner_id: 42,
        subscription_id: 1,
        event_time: 1_700_000_000,
        updates: BTreeMap::new(),
    }
}

#[tokio::test]
async fn queue_worker_drains_pending_events_and_stops_on_shutdown() {
    let (_, state) = common::create_test_app(Config::test_default());
    let id = state.queue.enqueue(delete_event(9001)).await.unwrap();

    let worker = spawn_queue_worker(
        state.processor.clone(),
        Duration::from_millis(20),
        Duration::from_secs(600),
        50,
        state.shutdown.clone(),
    );

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = state.queue.get(&id).await.unwrap().unwrap();
            if record.status == EventStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(completed.is_ok(), "event was not processed by the worker");

    // Events arriving later are picked up on a later tick
    let later = state.queue.enqueue(delete_event(9002)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.queue.get(&later).await.unwrap().unwrap().status != EventStatus::Completed {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("later event was not processed");

    state.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .expect("worker did not stop")
        .unwrap();
}

#[tokio::test]
async fn reconciler_worker_stops_on_shutdown() {
    let (_, state) = common::create_test_app(Config::test_default());

    let worker = spawn_reconciler_worker(
        state.reconciler.clone(),
        Duration::from_secs(3600),
        state.shutdown.clone(),
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!worker.is_finished());

    state.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .expect("worker did not stop")
        .unwrap();
}
