//! Prometheus export of pipeline statistics.
//!
//! [`PipelineMetrics`] owns its own [`Registry`] so several pipelines can
//! coexist in one process. Gauges are refreshed from a [`PipelineStats`]
//! snapshot, typically on a timer driven by the host.
//!
//! # Examples
//!
//! ```rust
//! use mcbridge::{Pipeline, PipelineMetrics};
//!
//! let pipeline = Pipeline::builder().build().unwrap();
//! let metrics = PipelineMetrics::new().unwrap();
//! metrics.refresh(&pipeline.stats());
//!
//! let text = metrics.export().unwrap();
//! assert!(text.contains("mcbridge_queue_size"));
//! ```

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::PipelineStats;
use prometheus::{Encoder, Gauge, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

/// Prometheus gauges mirroring queue, lifecycle and synchronizer figures.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,

    // Queue
    queue_size: IntGauge,
    queue_size_peak: IntGauge,
    enqueued: IntGauge,
    processed: IntGauge,
    failed: IntGauge,
    dropped: IntGauge,
    batches: IntGauge,
    retries: IntGauge,
    success_rate: Gauge,
    average_processing_seconds: Gauge,
    pending_batches: IntGaugeVec,

    // Lifecycle
    active_events: IntGauge,
    error_rate: Gauge,
    events_by_type: IntGaugeVec,
    latency_by_type: GaugeVec,

    // State
    state_keys: IntGauge,
    state_bytes: IntGauge,
    state_changes: IntGauge,
    syncs: IntGaugeVec,
    snapshots: IntGauge,

    // Subscriptions
    active_subscriptions: IntGauge,
    globally_filtered: IntGauge,
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics")
            .field("queue_size", &self.queue_size.get())
            .field("processed", &self.processed.get())
            .finish_non_exhaustive()
    }
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> PipelineResult<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> PipelineResult<Gauge> {
    let gauge = Gauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn int_gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> PipelineResult<IntGaugeVec> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl PipelineMetrics {
    /// Creates the gauges in a fresh registry.
    pub fn new() -> PipelineResult<Self> {
        Self::with_registry(Registry::new())
    }

    /// Creates the gauges in an existing registry.
    ///
    /// # Errors
    ///
    /// Fails if a collector with the same name is already registered.
    pub fn with_registry(registry: Registry) -> PipelineResult<Self> {
        let latency_by_type = GaugeVec::new(
            Opts::new(
                "mcbridge_lifecycle_latency_seconds",
                "Mean emitted-to-completed latency per event type",
            ),
            &["event_type"],
        )?;
        registry.register(Box::new(latency_by_type.clone()))?;

        Ok(Self {
            queue_size: int_gauge(&registry, "mcbridge_queue_size", "Events in the priority heap")?,
            queue_size_peak: int_gauge(
                &registry,
                "mcbridge_queue_size_peak",
                "Largest heap size observed",
            )?,
            enqueued: int_gauge(
                &registry,
                "mcbridge_queue_enqueued_total",
                "Events pushed onto the heap",
            )?,
            processed: int_gauge(
                &registry,
                "mcbridge_queue_processed_total",
                "Events whose handlers all succeeded",
            )?,
            failed: int_gauge(
                &registry,
                "mcbridge_queue_failed_total",
                "Failed processing attempts",
            )?,
            dropped: int_gauge(
                &registry,
                "mcbridge_queue_dropped_total",
                "Events dropped at admission or by capacity",
            )?,
            batches: int_gauge(&registry, "mcbridge_queue_batches_total", "Batches flushed")?,
            retries: int_gauge(&registry, "mcbridge_queue_retries_total", "Retries scheduled")?,
            success_rate: gauge(
                &registry,
                "mcbridge_queue_success_rate_percent",
                "Processed events among processed and failed ones",
            )?,
            average_processing_seconds: gauge(
                &registry,
                "mcbridge_queue_processing_seconds_avg",
                "Mean handler time of processed events",
            )?,
            pending_batches: int_gauge_vec(
                &registry,
                "mcbridge_queue_pending_batch_events",
                "Events waiting in each batch buffer",
                &["event_type"],
            )?,
            active_events: int_gauge(
                &registry,
                "mcbridge_lifecycle_active_events",
                "Events between emission and a terminal stage",
            )?,
            error_rate: gauge(
                &registry,
                "mcbridge_lifecycle_error_rate_percent",
                "Failed events as a percentage of transitions",
            )?,
            events_by_type: int_gauge_vec(
                &registry,
                "mcbridge_lifecycle_transitions_total",
                "Lifecycle transitions per event type",
                &["event_type"],
            )?,
            latency_by_type,
            state_keys: int_gauge(
                &registry,
                "mcbridge_state_keys",
                "Top-level keys in the synchronized state",
            )?,
            state_bytes: int_gauge(
                &registry,
                "mcbridge_state_bytes",
                "Serialized size of the synchronized state",
            )?,
            state_changes: int_gauge(
                &registry,
                "mcbridge_state_changes_total",
                "Changed keys across all commits",
            )?,
            syncs: int_gauge_vec(
                &registry,
                "mcbridge_state_syncs_total",
                "State deltas by outcome",
                &["outcome"],
            )?,
            snapshots: int_gauge(&registry, "mcbridge_state_snapshots", "Retained snapshots")?,
            active_subscriptions: int_gauge(
                &registry,
                "mcbridge_subscriptions_active",
                "Active subscriptions",
            )?,
            globally_filtered: int_gauge(
                &registry,
                "mcbridge_global_filter_rejected_total",
                "Events rejected by the global filter chain",
            )?,
            registry,
        })
    }

    /// Returns the registry holding the gauges.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Copies a statistics snapshot into the gauges.
    pub fn refresh(&self, stats: &PipelineStats) {
        let queue = &stats.queue;
        self.queue_size.set(queue.queue_size as i64);
        self.queue_size_peak.set(queue.queue_size_peak as i64);
        self.enqueued.set(to_i64(queue.total_enqueued));
        self.processed.set(to_i64(queue.total_processed));
        self.failed.set(to_i64(queue.total_failed));
        self.dropped.set(to_i64(queue.total_dropped));
        self.batches.set(to_i64(queue.batch_count));
        self.retries.set(to_i64(queue.retry_count));
        self.success_rate.set(queue.success_rate());
        self.average_processing_seconds
            .set(queue.average_processing_time().as_secs_f64());
        self.pending_batches.reset();
        for (key, pending) in &queue.pending_batches {
            self.pending_batches
                .with_label_values(&[key.as_str()])
                .set(*pending as i64);
        }

        let lifecycle = &stats.lifecycle;
        self.active_events.set(lifecycle.active_events as i64);
        self.error_rate.set(lifecycle.error_rate_percent);
        for (event_type, count) in &lifecycle.events_by_type {
            self.events_by_type
                .with_label_values(&[event_type.as_str()])
                .set(to_i64(*count));
        }
        for (event_type, timing) in &lifecycle.processing_times_by_type {
            self.latency_by_type
                .with_label_values(&[event_type.as_str()])
                .set(timing.average.as_secs_f64());
        }

        let sync = &stats.sync;
        self.state_keys.set(sync.current_state_size as i64);
        self.state_bytes.set(sync.counters.state_size as i64);
        self.state_changes.set(to_i64(sync.counters.total_changes));
        self.syncs
            .with_label_values(&["success"])
            .set(to_i64(sync.counters.successful_syncs));
        self.syncs
            .with_label_values(&["failure"])
            .set(to_i64(sync.counters.failed_syncs));
        self.snapshots.set(sync.snapshots_count as i64);

        self.active_subscriptions
            .set(stats.subscriptions.active_subscriptions as i64);
        self.globally_filtered
            .set(to_i64(stats.subscriptions.global_filters.events_filtered));

        debug!(queue_size = queue.queue_size, "Metrics refreshed");
    }

    /// Renders every gauge in the Prometheus text format.
    pub fn export(&self) -> PipelineResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| PipelineError::configuration(e.to_string()))
    }
}
