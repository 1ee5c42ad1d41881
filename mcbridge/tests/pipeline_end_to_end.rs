//! End-to-end tests for the assembled pipeline
//!
//! These tests drive events from ingestion through workers, handlers and the
//! state synchronizer, including persistence and session mirroring.

use mcbridge::prelude::*;
use mcbridge::testing::{EventBuilder, FailingSession, InMemorySession, SubscriptionRecorder};
use mcbridge::{EventStage, SyncConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn wait_for_processed(pipeline: &Pipeline, expected: u64) {
    for _ in 0..200 {
        if pipeline.queue().stats().total_processed >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {} processed events, stats: {:?}",
        expected,
        pipeline.queue().stats()
    );
}

#[tokio::test]
async fn test_spawn_scenario_updates_state() {
    init_tracing();
    let pipeline = Pipeline::builder().build().unwrap();
    pipeline.start().await.unwrap();

    let spawn = EventBuilder::spawn()
        .id("spawn-1")
        .field("position", json!({"x": 10.5, "y": 64.0, "z": -3.0}))
        .build();
    assert!(pipeline.ingest(spawn).await.is_queued());
    wait_for_processed(&pipeline, 1).await;

    let sync = pipeline.synchronizer();
    assert_eq!(sync.get("minecraft.spawned").await, Some(json!(true)));
    assert_eq!(sync.get("minecraft.bot.ready").await, Some(json!(true)));
    assert_eq!(
        sync.get("minecraft.connection.status").await,
        Some(json!("connected"))
    );
    assert_eq!(sync.get("minecraft.bot.position.x").await, Some(json!(10.5)));
    assert_eq!(sync.get("minecraft.bot.health").await, Some(json!(20)));
    assert_eq!(
        sync.get("minecraft.events.last_event_id").await,
        Some(json!("spawn-1"))
    );

    let history = pipeline.lifecycle().event_timeline(Some("minecraft:spawn"), 10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].stage, EventStage::Completed);

    pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn test_spawn_record_with_integer_coordinates() {
    let pipeline = Pipeline::builder().build().unwrap();

    let health = EventBuilder::health(18.0, 20.0, 5.0).id("h1").build();
    assert!(pipeline.ingest(health).await.is_queued());

    let record = json!({
        "event": "minecraft:spawn",
        "eventId": "e1",
        "data": {
            "spawned": true,
            "position": {"x": 1, "y": 64, "z": 2},
            "time": mcbridge::unix_millis()
        }
    });
    let outcome = pipeline.ingest_json(&record.to_string()).await.unwrap();
    assert!(outcome.is_queued());
    assert_eq!(
        pipeline.registry().priority("minecraft:spawn"),
        Priority::new(100)
    );

    // The spawn outranks the earlier health update.
    assert!(pipeline.process_next().await);
    let spawn = pipeline.lifecycle().event_timeline(Some("minecraft:spawn"), 1);
    assert_eq!(spawn[0].event_id, "e1");
    assert_eq!(spawn[0].stage, EventStage::Completed);
    assert!(pipeline.lifecycle().active_entry("h1").is_some());

    let sync = pipeline.synchronizer();
    assert_eq!(sync.get("minecraft.spawned").await, Some(json!(true)));
    assert_eq!(sync.get("minecraft.bot.position.x").await, Some(json!(1)));
    assert_eq!(sync.get("minecraft.bot.position.y").await, Some(json!(64)));
    let state = sync.current_state().await;
    assert_eq!(state["minecraft"]["spawned"], json!(true));
}

#[tokio::test]
async fn test_chat_before_spawn_is_rejected_by_state_validation() {
    let pipeline = Pipeline::builder().build().unwrap();

    pipeline
        .ingest(EventBuilder::chat("alex", "hello").id("c1").build())
        .await;
    assert!(pipeline.process_next().await);

    let history = pipeline.lifecycle().event_timeline(None, 10);
    assert_eq!(history[0].stage, EventStage::Failed);
    assert_eq!(
        history[0].error.as_deref(),
        Some("State delta rejected by validation")
    );
    assert_eq!(pipeline.synchronizer().stats().counters.failed_syncs, 1);
    assert!(pipeline.synchronizer().current_state().await.is_empty());

    pipeline.ingest(EventBuilder::spawn().build()).await;
    pipeline
        .ingest(EventBuilder::chat("alex", "hello again").build())
        .await;
    while pipeline.process_next().await {}
    assert_eq!(
        pipeline
            .synchronizer()
            .get("minecraft.chat.last_message")
            .await,
        Some(json!("hello again"))
    );
    assert_eq!(
        pipeline
            .synchronizer()
            .get("minecraft.chat.needs_response")
            .await,
        Some(json!(true))
    );
}

#[tokio::test]
async fn test_session_backend_mirrors_commits() {
    let session = Arc::new(InMemorySession::new());
    let pipeline = Pipeline::builder()
        .with_session_backend(session.clone())
        .build()
        .unwrap();

    pipeline.ingest(EventBuilder::spawn().build()).await;
    pipeline
        .ingest(EventBuilder::health(15.0, 18.0, 2.5).build())
        .await;
    while pipeline.process_next().await {}

    assert_eq!(session.applied_count(), 2);
    let mirrored = session.state();
    assert_eq!(mirrored["minecraft"]["spawned"], json!(true));
    assert_eq!(mirrored, pipeline.synchronizer().current_state().await);
}

#[tokio::test]
async fn test_failing_session_does_not_undo_commits() {
    let session = Arc::new(FailingSession::new());
    let pipeline = Pipeline::builder()
        .with_session_backend(session.clone())
        .build()
        .unwrap();

    pipeline.ingest(EventBuilder::spawn().build()).await;
    while pipeline.process_next().await {}

    assert_eq!(session.attempts(), 1);
    assert_eq!(
        pipeline.synchronizer().get("minecraft.spawned").await,
        Some(json!(true))
    );
    assert_eq!(pipeline.queue().stats().total_processed, 1);
}

#[tokio::test]
async fn test_state_survives_restart_through_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let sync_config = SyncConfig {
        enable_persistence: true,
        persistence_path: Some(dir.path().join("bot")),
        ..SyncConfig::default()
    };

    {
        let pipeline = Pipeline::builder()
            .with_sync_config(sync_config.clone())
            .build()
            .unwrap();
        pipeline.start().await.unwrap();
        pipeline.ingest(EventBuilder::spawn().build()).await;
        wait_for_processed(&pipeline, 1).await;
        pipeline.stop().await.unwrap();
    }
    assert!(dir.path().join("bot_state.json").exists());

    let restarted = Pipeline::builder()
        .with_sync_config(sync_config)
        .build()
        .unwrap();
    restarted.start().await.unwrap();
    assert_eq!(
        restarted.synchronizer().get("minecraft.spawned").await,
        Some(json!(true))
    );
    assert_eq!(
        restarted.synchronizer().stats().counters.successful_syncs,
        1
    );
    restarted.stop().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_restore_rolls_back_state() {
    let pipeline = Pipeline::builder().build().unwrap();
    pipeline.ingest(EventBuilder::spawn().build()).await;
    while pipeline.process_next().await {}

    let sync = pipeline.synchronizer();
    let snapshot = sync.take_snapshot().await;

    pipeline
        .ingest(EventBuilder::health(4.0, 6.0, 0.0).build())
        .await;
    while pipeline.process_next().await {}
    assert_eq!(sync.get("minecraft.bot.health").await, Some(json!(4.0)));

    assert!(sync.restore_from_snapshot(&snapshot).await);
    assert_eq!(sync.current_state().await, snapshot.state);
}

#[tokio::test]
async fn test_subscribers_and_handlers_see_the_same_stream() {
    let pipeline = Pipeline::builder().build().unwrap();
    let recorder = SubscriptionRecorder::new();
    pipeline.subscribe("observer", recorder.handler()).unwrap();

    let events = vec![
        EventBuilder::spawn().id("e1").build(),
        EventBuilder::chat("alex", "hi").id("e2").build(),
        EventBuilder::health(19.0, 20.0, 5.0).id("e3").build(),
    ];
    for event in events {
        assert!(pipeline.ingest(event).await.is_queued());
    }
    assert_eq!(recorder.event_ids(), vec!["e1", "e2", "e3"]);

    // Priority order: spawn, health, chat.
    let order: Vec<String> = std::iter::from_fn(|| pipeline.queue().try_dequeue())
        .map(|event| event.event_id)
        .collect();
    assert_eq!(order, vec!["e1", "e3", "e2"]);
}
