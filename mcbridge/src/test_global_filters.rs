//! Tests for global and per-subscription filtering through the pipeline

#[cfg(test)]
mod tests {
    use crate::filter::{FilterConfig, ManagedFilter, PriorityFilter, SourceFilter};
    use crate::pipeline::IngestOutcome;
    use crate::prelude::*;
    use crate::testing::{EventBuilder, SubscriptionRecorder};

    fn pipeline() -> Pipeline {
        Pipeline::builder().build().unwrap()
    }

    #[tokio::test]
    async fn test_global_filter_drops_before_queue_and_subscribers() {
        let pipeline = pipeline();
        let recorder = SubscriptionRecorder::new();
        pipeline.subscribe("ui", recorder.handler()).unwrap();
        pipeline.add_global_filter(EventTypeFilter::block(["minecraft:chat"]).unwrap());

        let outcome = pipeline
            .ingest(EventBuilder::chat("alex", "hi").id("c1").build())
            .await;
        assert_eq!(outcome, IngestOutcome::Dropped);
        assert!(recorder.events().is_empty());
        assert!(pipeline.queue().is_empty());

        // Admission drops are forgotten, not failed.
        assert_eq!(pipeline.lifecycle().active_count(), 0);
        assert_eq!(pipeline.lifecycle().history_len(), 0);
        assert_eq!(pipeline.queue().stats().total_dropped, 1);
    }

    #[tokio::test]
    async fn test_disabled_global_filter_passes_everything() {
        let pipeline = pipeline();
        pipeline.add_global_filter(EventTypeFilter::block(["minecraft:chat"]).unwrap());
        let filter = pipeline
            .subscriptions()
            .global_filters()
            .get_filter("event_type")
            .unwrap();
        filter.set_enabled(false);

        let outcome = pipeline
            .ingest(EventBuilder::chat("alex", "hi").build())
            .await;
        assert!(outcome.is_queued());
        assert_eq!(filter.stats().total_passed, 1);
    }

    #[tokio::test]
    async fn test_bypass_keyword_skips_global_filter() {
        let pipeline = pipeline();
        pipeline.add_global_filter(ManagedFilter::with_config(
            PriorityFilter::at_least(90),
            FilterConfig::with_bypass(),
        ));

        // Both fall below the threshold, but the spawn type carries a bypass keyword.
        let chat = pipeline
            .ingest(EventBuilder::chat("alex", "hi").build())
            .await;
        let spawn = pipeline
            .ingest(EventBuilder::spawn().priority(Priority::LOW).build())
            .await;
        assert_eq!(chat, IngestOutcome::Dropped);
        assert!(spawn.is_queued());
    }

    #[tokio::test]
    async fn test_subscription_filters_are_independent() {
        let pipeline = pipeline();
        let urgent = SubscriptionRecorder::new();
        let bot_one = SubscriptionRecorder::new();

        pipeline
            .subscribe("urgent", urgent.handler())
            .unwrap()
            .add_filter(PriorityFilter::at_least(Priority::CRITICAL.value()));
        pipeline
            .subscribe("bot-1", bot_one.handler())
            .unwrap()
            .add_filter(SourceFilter::new(["bot-1"], Vec::<String>::new()));

        let outcome = pipeline
            .ingest(EventBuilder::spawn().id("s1").bot("bot-2").build())
            .await;
        assert!(outcome.is_queued());
        pipeline
            .ingest(EventBuilder::chat("alex", "hi").id("c1").bot("bot-1").build())
            .await;

        assert_eq!(urgent.event_ids(), vec!["s1"]);
        assert_eq!(bot_one.event_ids(), vec!["c1"]);

        let stats = pipeline.subscriptions().stats();
        assert_eq!(stats.events_distributed, 2);
        assert_eq!(stats.global_filters.total_events, 2);

        pipeline.unsubscribe("urgent").unwrap();
        pipeline
            .ingest(EventBuilder::spawn().id("s2").build())
            .await;
        assert_eq!(urgent.event_ids(), vec!["s1"]);
        assert!(matches!(
            pipeline.unsubscribe("urgent"),
            Err(crate::error::FilterError::SubscriptionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_subscriber_failure_does_not_block_queue() {
        let pipeline = pipeline();
        pipeline
            .subscribe("broken", |_event| async {
                Err::<(), _>(crate::error::HandlerError::failed("subscriber down"))
            })
            .unwrap();

        match pipeline.ingest(EventBuilder::spawn().build()).await {
            IngestOutcome::Queued(outcome) => {
                assert_eq!(outcome.delivered, 0);
                assert_eq!(outcome.failures.len(), 1);
                assert_eq!(outcome.failures[0].0, "broken");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(pipeline.queue().len(), 1);
    }
}
