//! Load tests for mcbridge
//!
//! These tests verify that the pipeline keeps its guarantees under high
//! event volume and concurrent producers.

use mcbridge::prelude::*;
use mcbridge::queue::QueueConfig;
use mcbridge::testing::{EventBuilder, RecordingHandler};
use mcbridge::StateValidator;
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn wait_until_idle(pipeline: &Pipeline, expected: u64, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let stats = pipeline.queue().stats();
        if stats.total_processed + stats.total_failed >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Test high-volume processing with several workers
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "Load test - run with --ignored"]
async fn test_high_volume_processing() {
    let config = QueueConfig {
        worker_count: 4,
        idle_sleep: Duration::from_millis(1),
        ..QueueConfig::default()
    };
    let pipeline = Pipeline::builder()
        .with_queue_config(config)
        .with_state_validator(StateValidator::new())
        .build()
        .unwrap();
    let recorder = RecordingHandler::new();
    pipeline.register_handler("minecraft:chat", recorder.clone());
    pipeline.start().await.unwrap();

    let total_events = 2_000u64;
    let start = Instant::now();
    let mut queued = 0;
    for i in 0..total_events {
        let event = EventBuilder::chat(&format!("player{}", i % 20), "hello").build();
        if pipeline.ingest(event).await.is_queued() {
            queued += 1;
        }
        // Stay under the per-type rate ceiling.
        if i % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(1_100)).await;
        }
    }

    assert!(wait_until_idle(&pipeline, queued, Duration::from_secs(60)).await);
    let elapsed = start.elapsed();
    println!(
        "Processed {} events in {:?} ({:.0} events/sec)",
        queued,
        elapsed,
        queued as f64 / elapsed.as_secs_f64()
    );

    assert_eq!(recorder.call_count() as u64, queued);
    assert_eq!(pipeline.queue().stats().total_failed, 0);
    pipeline.stop().await.unwrap();
}

/// Test concurrent producers against a bounded queue
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "Load test - run with --ignored"]
async fn test_concurrent_producers_respect_capacity() {
    let config = QueueConfig {
        max_size: 500,
        ..QueueConfig::default()
    };
    let pipeline = Arc::new(
        Pipeline::builder()
            .with_queue_config(config)
            .without_default_handlers()
            .build()
            .unwrap(),
    );

    let producers: Vec<_> = (0..8)
        .map(|producer| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                for i in 0..200 {
                    let event = EventBuilder::health(20.0, 20.0, 5.0)
                        .id(format!("p{}-{}", producer, i))
                        .build();
                    pipeline.ingest(event).await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    let stats = pipeline.queue().stats();
    assert!(stats.queue_size <= 500);
    assert!(stats.queue_size_peak <= 500);
    assert!(stats.total_dropped > 0);
    println!(
        "Enqueued {}, dropped {}, final size {}",
        stats.total_enqueued, stats.total_dropped, stats.queue_size
    );
}

/// Test that lifecycle bookkeeping stays bounded under load
#[tokio::test]
#[ignore = "Load test - run with --ignored"]
async fn test_lifecycle_history_is_bounded() {
    let lifecycle = mcbridge::LifecycleConfig {
        max_history: 1_000,
        ..mcbridge::LifecycleConfig::default()
    };
    let pipeline = Pipeline::builder()
        .with_lifecycle_config(lifecycle)
        .with_state_validator(StateValidator::new())
        .build()
        .unwrap();

    for i in 0..3_000 {
        pipeline
            .ingest(EventBuilder::health(20.0, 20.0, 5.0).id(format!("h{}", i)).build())
            .await;
        while pipeline.process_next().await {}
        if i % 90 == 89 {
            tokio::time::sleep(Duration::from_millis(1_000)).await;
        }
    }

    assert!(pipeline.lifecycle().history_len() <= 1_000);
    assert_eq!(pipeline.lifecycle().active_count(), 0);
}
