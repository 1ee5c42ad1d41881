//! End-to-end mcbridge example: a bot spawns, chats and takes damage.

use mcbridge::prelude::*;
use mcbridge::testing::EventBuilder;
use mcbridge::PriorityFilter;
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("mcbridge pipeline demo");
    println!();

    let pipeline = Pipeline::builder().build()?;

    // A dashboard that only cares about urgent events.
    pipeline
        .subscribe("dashboard", |event: InboundEvent| async move {
            println!("  [dashboard] {} ({})", event.event_type, event.event_id);
            Ok(())
        })?
        .add_filter(PriorityFilter::at_least(Priority::HIGH.value()));

    pipeline.start().await?;

    let events = vec![
        EventBuilder::spawn().id("spawn-1").build(),
        EventBuilder::chat("alex", "hello bot").id("chat-1").build(),
        EventBuilder::health(14.0, 18.0, 3.5).id("health-1").build(),
        EventBuilder::block_update(12, 64, -7, "minecraft:air")
            .id("block-1")
            .build(),
    ];

    println!("Ingesting events...");
    for event in events {
        let id = event.event_id.clone();
        let outcome = pipeline.ingest(event).await;
        println!("  {} -> {:?}", id, outcome);
    }

    // Records can also arrive as JSON text.
    let record = json!({
        "event": "minecraft:chat",
        "eventId": "chat-2",
        "data": {"username": "steve", "message": "anyone around?"}
    });
    let outcome = pipeline.ingest_json(&record.to_string()).await?;
    println!("  chat-2 -> {:?}", outcome);

    let malformed = pipeline.ingest_json(r#"{"event": ""}"#).await?;
    println!("  malformed -> {:?}", malformed);

    // Let the workers drain the queue and flush the block batch.
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let sync = pipeline.synchronizer();
    println!();
    println!("Bot state:");
    println!(
        "{}",
        serde_json::to_string_pretty(&sync.current_state().await)?
    );

    let stats = pipeline.stats();
    println!();
    println!(
        "Queue: {} enqueued, {} processed, {} failed, {} dropped",
        stats.queue.total_enqueued,
        stats.queue.total_processed,
        stats.queue.total_failed,
        stats.queue.total_dropped,
    );
    println!(
        "Lifecycle: {} transitions, {:.1}% errors",
        stats.lifecycle.total_events, stats.lifecycle.error_rate_percent
    );
    println!(
        "State: {} successful syncs, {} rejected",
        stats.sync.counters.successful_syncs, stats.sync.counters.failed_syncs
    );

    pipeline.stop().await?;
    println!();
    println!("Pipeline stopped");
    Ok(())
}
