//! Tests for retry and terminal failure handling

#[cfg(test)]
mod tests {
    use crate::lifecycle::EventStage;
    use crate::prelude::*;
    use crate::queue::QueueConfig;
    use crate::testing::{EventBuilder, FailingHandler, FlakyHandler, PanickingHandler};
    use serde_json::json;

    fn pipeline_with_retries(max_retries: u32) -> Pipeline {
        let config = QueueConfig {
            default_max_retries: max_retries,
            ..QueueConfig::default()
        };
        Pipeline::builder()
            .with_queue_config(config)
            .without_default_handlers()
            .build()
            .unwrap()
    }

    async fn drain(pipeline: &Pipeline) -> usize {
        let mut processed = 0;
        while pipeline.process_next().await {
            processed += 1;
        }
        processed
    }

    #[tokio::test]
    async fn test_always_failing_handler_is_retried_max_times() {
        let pipeline = pipeline_with_retries(3);
        let handler = FailingHandler::new("boom");
        pipeline.register_handler("minecraft:chat", handler.clone());

        let event = EventBuilder::chat("alex", "hi").id("c1").build();
        assert!(pipeline.ingest(event).await.is_queued());
        assert_eq!(drain(&pipeline).await, 4);

        assert_eq!(handler.call_count(), 4);
        let stats = pipeline.queue().stats();
        assert_eq!(stats.total_failed, 4);
        assert_eq!(stats.retry_count, 3);
        assert_eq!(stats.total_processed, 0);

        let history = pipeline.lifecycle().event_timeline(None, 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].stage, EventStage::Failed);
        let error = history[0].error.as_deref().unwrap();
        assert!(error.starts_with("Processing failed after 3 retries"));
        assert!(error.ends_with("boom"));
    }

    #[tokio::test]
    async fn test_flaky_handler_completes_with_retry_count() {
        let pipeline = pipeline_with_retries(3);
        let handler = FlakyHandler::new(2);
        pipeline.register_handler("minecraft:chat", handler.clone());

        let event = EventBuilder::chat("alex", "hi").id("c1").build();
        assert!(pipeline.ingest(event).await.is_queued());
        assert_eq!(drain(&pipeline).await, 3);

        assert_eq!(handler.retry_counts(), vec![0, 1, 2]);
        let history = pipeline.lifecycle().event_timeline(None, 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].stage, EventStage::Completed);
        assert_eq!(history[0].metadata.get("retry_count"), Some(&json!(2)));

        let stats = pipeline.queue().stats();
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.total_failed, 2);
        assert_eq!(stats.retry_count, 2);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_immediately() {
        let pipeline = pipeline_with_retries(0);
        let handler = FailingHandler::new("nope");
        pipeline.register_handler("minecraft:chat", handler.clone());

        pipeline
            .ingest(EventBuilder::chat("alex", "hi").build())
            .await;
        assert_eq!(drain(&pipeline).await, 1);
        assert_eq!(handler.call_count(), 1);
        assert_eq!(pipeline.queue().stats().retry_count, 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_counts_as_failure() {
        let pipeline = pipeline_with_retries(1);
        pipeline.register_handler("minecraft:chat", PanickingHandler);

        pipeline
            .ingest(EventBuilder::chat("alex", "hi").id("c1").build())
            .await;
        assert_eq!(drain(&pipeline).await, 2);

        let history = pipeline.lifecycle().event_timeline(None, 10);
        assert_eq!(history[0].stage, EventStage::Failed);
        assert!(history[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Handler panicked: handler panicked"));
    }

    #[tokio::test]
    async fn test_one_failing_handler_retries_the_whole_event() {
        let pipeline = pipeline_with_retries(2);
        let flaky = FlakyHandler::new(1);
        let recorder = crate::testing::RecordingHandler::new();
        pipeline.register_handler("minecraft:chat", recorder.clone());
        pipeline.register_handler("minecraft:chat", flaky.clone());

        pipeline
            .ingest(EventBuilder::chat("alex", "hi").build())
            .await;
        drain(&pipeline).await;

        // Both handlers run again on the retry.
        assert_eq!(recorder.retry_counts(), vec![0, 1]);
        assert_eq!(flaky.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_yields_to_more_urgent_events() {
        let pipeline = pipeline_with_retries(1);
        let flaky = FlakyHandler::new(1);
        let recorder = crate::testing::RecordingHandler::new();
        pipeline.register_handler("minecraft:chat", flaky.clone());
        pipeline.register_handler("minecraft:health", recorder.clone());

        pipeline
            .ingest(EventBuilder::chat("alex", "hi").id("c1").build())
            .await;
        assert!(pipeline.process_next().await);

        // Health outranks chat, so it runs before the retried chat.
        pipeline
            .ingest(EventBuilder::health(18.0, 20.0, 5.0).id("h1").build())
            .await;
        let next = pipeline.queue().try_dequeue().unwrap();
        assert_eq!(next.event_id, "h1");
        let retried = pipeline.queue().try_dequeue().unwrap();
        assert_eq!(retried.event_id, "c1");
        assert_eq!(retried.retry_count, 1);
    }
}
