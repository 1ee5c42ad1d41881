//! Tests for batching through the assembled pipeline

#[cfg(test)]
mod tests {
    use crate::event::FlushReason;
    use crate::lifecycle::EventStage;
    use crate::prelude::*;
    use crate::queue::{BatchConfig, QueueConfig};
    use crate::sync::StateValidator;
    use crate::testing::{EventBuilder, SubscriptionRecorder};
    use serde_json::json;
    use std::time::Duration;

    fn batching_pipeline(batch: BatchConfig) -> Pipeline {
        let mut config = QueueConfig::default();
        config
            .batch_configs
            .insert("minecraft:block_update".to_string(), batch);
        Pipeline::builder()
            .with_queue_config(config)
            .with_state_validator(StateValidator::new())
            .build()
            .unwrap()
    }

    fn block(id: &str, x: i64) -> InboundEvent {
        EventBuilder::block_update(x, 64, 0, "minecraft:stone")
            .id(id)
            .build()
    }

    #[tokio::test]
    async fn test_full_batch_is_processed_as_one_event() {
        let pipeline = batching_pipeline(BatchConfig::default().with_max_size(3));

        for (i, id) in ["b1", "b2", "b3"].iter().enumerate() {
            assert!(pipeline.ingest(block(id, i as i64)).await.is_queued());
        }
        assert_eq!(pipeline.queue().pending_batch_len("minecraft:block_update"), 0);
        assert_eq!(pipeline.queue().len(), 1);

        assert!(pipeline.process_next().await);
        assert!(!pipeline.process_next().await);

        let history = pipeline.lifecycle().event_timeline(None, 10);
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|e| e.stage == EventStage::Completed));
        let batch_ids: Vec<_> = history
            .iter()
            .map(|e| e.metadata.get("batch_id").cloned())
            .collect();
        assert!(batch_ids[0].is_some());
        assert!(batch_ids.iter().all(|id| *id == batch_ids[0]));

        assert_eq!(
            pipeline
                .synchronizer()
                .get("minecraft.events.last_event_id")
                .await,
            Some(json!("b3"))
        );
        let stats = pipeline.queue().stats();
        assert_eq!(stats.batch_count, 1);
        assert_eq!(stats.total_processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_flushes_partial_batch() {
        let pipeline = batching_pipeline(
            BatchConfig::default()
                .with_max_size(10)
                .with_window(Duration::from_millis(100)),
        );
        pipeline.ingest(block("b1", 0)).await;
        pipeline.ingest(block("b2", 1)).await;
        assert!(pipeline.queue().is_empty());

        tokio::time::sleep(Duration::from_millis(120)).await;

        let batch = pipeline.queue().try_dequeue().unwrap();
        let body = batch.as_batch().unwrap();
        assert_eq!(body.event_count(), 2);
        assert_eq!(body.flush_reason, FlushReason::Timer);
    }

    #[tokio::test]
    async fn test_subscribers_see_members_individually() {
        let pipeline = batching_pipeline(BatchConfig::default().with_max_size(2));
        let recorder = SubscriptionRecorder::new();
        pipeline.subscribe("ui", recorder.handler()).unwrap();

        pipeline.ingest(block("b1", 0)).await;
        pipeline.ingest(block("b2", 1)).await;

        assert_eq!(recorder.event_ids(), vec!["b1", "b2"]);
        assert_eq!(pipeline.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_batch_config_queues_directly() {
        let pipeline = batching_pipeline(BatchConfig::disabled());
        pipeline.ingest(block("b1", 0)).await;

        let queued = pipeline.queue().try_dequeue().unwrap();
        assert!(!queued.is_batch());
        assert_eq!(queued.event_type, "minecraft:block_update");
    }
}
