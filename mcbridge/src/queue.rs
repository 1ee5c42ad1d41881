//! Priority event queue.
//!
//! [`EventQueue`] admits inbound events through global filters, sampling and
//! rate limiting, buffers batch-eligible types, and keeps everything else in
//! a bounded priority heap. A pool of worker tasks pops the most urgent
//! event, runs every handler registered for its type, merges the returned
//! state deltas and commits them through the attached [`StateSynchronizer`].
//! Failed events are retried with a fresh timestamp up to their
//! `max_retries`.

pub mod admission;
pub mod batching;

pub use admission::{rate_ceiling, sampling_period, Admission};
pub use batching::BatchConfig;

use crate::error::HandlerError;
use crate::event::{InboundEvent, QueuedEvent, DEFAULT_MAX_RETRIES};
use crate::filter::manager::panic_message;
use crate::filter::FilterChain;
use crate::handler::{inbound_events, HandlerId, QueueHandler, StateDelta};
use crate::lifecycle::LifecycleLogger;
use crate::priority::{PriorityHeap, PushOutcome};
use crate::registry::EventRegistry;
use crate::sync::StateSynchronizer;
use batching::PendingBatch;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Configuration for the event queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the priority heap.
    pub max_size: usize,
    /// Number of worker tasks.
    pub worker_count: usize,
    /// Worker sleep when the heap is empty.
    pub idle_sleep: Duration,
    /// Interval of the max-wait batch sweep.
    pub batch_sweep_interval: Duration,
    /// Retries allowed before an event is terminally failed.
    pub default_max_retries: u32,
    /// Arrivals remembered per type by the rate limiter.
    pub rate_limit_window_slots: usize,
    /// Batch settings per full event type; batch-enabled types without an
    /// entry use [`BatchConfig::default`].
    pub batch_configs: HashMap<String, BatchConfig>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            worker_count: 3,
            idle_sleep: Duration::from_millis(10),
            batch_sweep_interval: Duration::from_millis(100),
            default_max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_window_slots: 100,
            batch_configs: HashMap::new(),
        }
    }
}

/// Queue counters and a point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    /// Events pushed onto the heap, including retries and batch events.
    pub total_enqueued: u64,
    /// Events whose handlers all succeeded.
    pub total_processed: u64,
    /// Failed processing attempts.
    pub total_failed: u64,
    /// Events dropped by filters, sampling, rate limiting or capacity.
    pub total_dropped: u64,
    /// Batches flushed.
    pub batch_count: u64,
    /// Retries scheduled.
    pub retry_count: u64,
    /// Largest heap size observed.
    pub queue_size_peak: usize,
    /// Total handler time of processed events.
    pub processing_time_total: Duration,
    /// Time since the queue was created.
    pub uptime: Duration,
    /// Current heap size.
    pub queue_size: usize,
    /// Pending batched events per event type.
    pub pending_batches: BTreeMap<String, usize>,
    /// Number of worker tasks running.
    pub worker_count: usize,
    /// Whether the workers are running.
    pub is_running: bool,
}

impl QueueStats {
    /// Percentage of processed events among processed and failed ones.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed + self.total_failed;
        if total == 0 {
            0.0
        } else {
            self.total_processed as f64 / total as f64 * 100.0
        }
    }

    /// Mean handler time of processed events.
    pub fn average_processing_time(&self) -> Duration {
        if self.total_processed == 0 {
            Duration::ZERO
        } else {
            let nanos = self.processing_time_total.as_nanos() / u128::from(self.total_processed);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }

    /// Processed events per second of uptime.
    pub fn events_per_second(&self) -> f64 {
        let elapsed = self.uptime.as_secs_f64();
        if elapsed > 0.0 {
            self.total_processed as f64 / elapsed
        } else {
            0.0
        }
    }
}

#[derive(Debug)]
pub(crate) struct Counters {
    total_enqueued: u64,
    total_processed: u64,
    total_failed: u64,
    total_dropped: u64,
    batch_count: u64,
    retry_count: u64,
    queue_size_peak: usize,
    processing_time_total: Duration,
    created: Instant,
}

impl Counters {
    fn new() -> Self {
        Self {
            total_enqueued: 0,
            total_processed: 0,
            total_failed: 0,
            total_dropped: 0,
            batch_count: 0,
            retry_count: 0,
            queue_size_peak: 0,
            processing_time_total: Duration::ZERO,
            created: Instant::now(),
        }
    }
}

struct HandlerEntry {
    id: HandlerId,
    handler: Arc<dyn QueueHandler>,
}

/// Bounded priority queue with batching, retry and a worker pool.
///
/// The queue is cheap to clone; clones share the same heap, handlers and
/// counters.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{EventQueue, HandlerResult, InboundEvent, Priority, QueuedEvent};
///
/// # tokio_test::block_on(async {
/// let queue = EventQueue::builder().with_max_size(100).build();
/// queue.register_handler("minecraft:chat", |event: QueuedEvent| async move {
///     assert_eq!(event.event_type, "minecraft:chat");
///     HandlerResult::Ok(None)
/// });
///
/// queue.enqueue(InboundEvent::new("minecraft:chat", "low").with_priority(Priority::new(10)));
/// queue.enqueue(InboundEvent::new("minecraft:chat", "high").with_priority(Priority::new(90)));
///
/// assert_eq!(queue.try_dequeue().unwrap().event_id, "high");
/// assert!(queue.process_next().await);
/// assert_eq!(queue.stats().total_processed, 1);
/// # });
/// ```
#[derive(Clone)]
pub struct EventQueue {
    config: Arc<QueueConfig>,
    registry: Arc<EventRegistry>,
    global_filters: Option<Arc<FilterChain>>,
    lifecycle: Option<Arc<LifecycleLogger>>,
    state_sink: Option<Arc<StateSynchronizer>>,
    heap: Arc<Mutex<PriorityHeap<QueuedEvent>>>,
    pub(crate) batches: Arc<Mutex<HashMap<String, PendingBatch>>>,
    pub(crate) batch_generation: Arc<AtomicU64>,
    admission: Arc<Mutex<Admission>>,
    handlers: Arc<RwLock<HashMap<String, Vec<HandlerEntry>>>>,
    pub(crate) stats: Arc<Mutex<Counters>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EventQueue {
    /// Returns a builder with the default configuration and registry.
    pub fn builder() -> QueueBuilder {
        QueueBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Returns the registry used for priorities, sampling and batching.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Admits an event into the queue.
    ///
    /// Returns `false` when the event is dropped: missing type or id, a
    /// global filter rejection, sampling, rate limiting, or a full heap
    /// holding nothing less urgent. The event's own priority wins over the
    /// registry priority.
    pub fn enqueue(&self, event: InboundEvent) -> bool {
        if event.event_type.is_empty() || event.event_id.is_empty() {
            error!(
                event_type = %event.event_type,
                event_id = %event.event_id,
                "Invalid event data for queue"
            );
            return false;
        }

        if let Some(filters) = &self.global_filters {
            if !filters.apply(&event) {
                debug!(
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    "Event dropped by global filters"
                );
                self.drop_at_admission(&event, "global filters");
                return false;
            }
        }

        let sampling_rate = self.registry.sampling_rate(&event.event_type);
        let (sampled, within_rate) = {
            let mut admission = self.admission.lock();
            let sampled = admission.should_sample(&event.event_type, sampling_rate);
            let within_rate =
                sampled && admission.check_rate_limit(&event.event_type, Instant::now());
            (sampled, within_rate)
        };
        if !sampled {
            debug!(
                event_type = %event.event_type,
                event_id = %event.event_id,
                "Event dropped due to sampling"
            );
            self.drop_at_admission(&event, "sampling");
            return false;
        }
        if !within_rate {
            debug!(
                event_type = %event.event_type,
                event_id = %event.event_id,
                "Event dropped due to rate limiting"
            );
            self.drop_at_admission(&event, "rate limiting");
            return false;
        }

        let priority = event
            .priority
            .unwrap_or_else(|| self.registry.priority(&event.event_type));
        let batch_config = self.batch_config(&event.event_type);

        let mut queued = QueuedEvent::single(event, priority);
        queued.max_retries = self.config.default_max_retries;

        match batch_config {
            Some(config) => self.enqueue_for_batch(queued, &config),
            None => self.push_event(queued),
        }
    }

    fn batch_config(&self, event_type: &str) -> Option<BatchConfig> {
        if !self.registry.is_batch_enabled(event_type) {
            return None;
        }
        let config = self
            .config
            .batch_configs
            .get(event_type)
            .cloned()
            .unwrap_or_default();
        config.enabled.then_some(config)
    }

    fn drop_at_admission(&self, event: &InboundEvent, reason: &str) {
        self.stats.lock().total_dropped += 1;
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.discard(&event.event_id, reason);
        }
    }

    /// Pushes onto the heap under the capacity policy.
    pub(crate) fn push_event(&self, event: QueuedEvent) -> bool {
        let event_type = event.event_type.clone();
        let event_id = event.event_id.clone();
        let priority = event.priority;

        let enqueued_at = event.enqueued_at;

        let (outcome, size) = {
            let mut heap = self.heap.lock();
            let outcome = heap.push(event, priority, enqueued_at);
            (outcome, heap.len())
        };

        let mut stats = self.stats.lock();
        match outcome {
            PushOutcome::Rejected(rejected) => {
                stats.total_dropped += 1;
                drop(stats);
                warn!(
                    event_type = %rejected.event_type,
                    event_id = %rejected.event_id,
                    "Queue full, dropping new event"
                );
                self.fail_members(&rejected, "Dropped: queue full");
                return false;
            }
            PushOutcome::Evicted(evicted) => {
                stats.total_dropped += 1;
                stats.total_enqueued += 1;
                stats.queue_size_peak = stats.queue_size_peak.max(size);
                drop(stats);
                warn!(
                    dropped_event_type = %evicted.event_type,
                    dropped_event_id = %evicted.event_id,
                    "Queue full, dropped low priority event"
                );
                self.fail_members(&evicted, "Dropped: evicted by higher priority event");
            }
            PushOutcome::Admitted => {
                stats.total_enqueued += 1;
                stats.queue_size_peak = stats.queue_size_peak.max(size);
            }
        }

        debug!(
            event_type = %event_type,
            event_id = %event_id,
            priority = %priority,
            queue_size = size,
            "Event enqueued"
        );
        true
    }

    fn fail_members(&self, event: &QueuedEvent, reason: &str) {
        if let Some(lifecycle) = &self.lifecycle {
            for member in inbound_events(event) {
                lifecycle.failed(&member.event_id, reason);
            }
        }
    }

    /// Removes and returns the most urgent queued event.
    pub fn try_dequeue(&self) -> Option<QueuedEvent> {
        self.heap.lock().pop()
    }

    /// Returns the number of events in the heap.
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Returns `true` if the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Registers a handler for an event type.
    ///
    /// Handlers of one type run sequentially in registration order. Batch
    /// events are dispatched under their synthetic type, e.g.
    /// `minecraft:batch`.
    pub fn register_handler<S, H>(&self, event_type: S, handler: H) -> HandlerId
    where
        S: Into<String>,
        H: QueueHandler,
    {
        let event_type = event_type.into();
        let id = HandlerId::new();
        info!(
            event_type = %event_type,
            handler = handler.handler_name(),
            handler_id = %id,
            "Handler registered with queue"
        );
        self.handlers
            .write()
            .entry(event_type)
            .or_default()
            .push(HandlerEntry {
                id,
                handler: Arc::new(handler),
            });
        id
    }

    /// Removes a handler, returning `true` if it was registered.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        for entries in handlers.values_mut() {
            if let Some(index) = entries.iter().position(|entry| entry.id == id) {
                entries.remove(index);
                return true;
            }
        }
        false
    }

    /// Returns the number of handlers registered for a type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.read().get(event_type).map_or(0, Vec::len)
    }

    /// Dequeues and processes one event. Returns `false` if the heap was empty.
    pub async fn process_next(&self) -> bool {
        match self.try_dequeue() {
            Some(event) => {
                self.process_event(event).await;
                true
            }
            None => false,
        }
    }

    async fn process_event(&self, event: QueuedEvent) {
        let started = Instant::now();
        let queue_latency = started.saturating_duration_since(event.enqueued_at);

        if let Some(lifecycle) = &self.lifecycle {
            for member in inbound_events(&event) {
                lifecycle.received(&member.event_id, &member.event_type, Some(queue_latency));
            }
        }

        let handlers: Vec<Arc<dyn QueueHandler>> = self
            .handlers
            .read()
            .get(&event.event_type)
            .map(|entries| entries.iter().map(|entry| Arc::clone(&entry.handler)).collect())
            .unwrap_or_default();

        let mut delta = StateDelta::new();
        let mut errors: Vec<HandlerError> = Vec::new();
        for handler in &handlers {
            let outcome = AssertUnwindSafe(handler.handle(&event))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(HandlerError::panic(panic_message(&*panic))));
            match outcome {
                Ok(Some(partial)) => delta.extend(partial),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        event_type = %event.event_type,
                        event_id = %event.event_id,
                        handler = handler.handler_name(),
                        error = %e,
                        "Event handler failed"
                    );
                    errors.push(e);
                }
            }
        }

        if let Some(first) = errors.into_iter().next() {
            self.stats.lock().total_failed += 1;
            self.retry_or_fail(event, &first.to_string());
            return;
        }

        let state_keys: Vec<String> = delta.keys().cloned().collect();
        if let Some(lifecycle) = &self.lifecycle {
            for member in inbound_events(&event) {
                lifecycle.processed(&member.event_id, &member.event_type, &state_keys);
            }
        }

        if let Some(sink) = &self.state_sink {
            if !delta.is_empty()
                && !sink
                    .apply_delta(&delta, Some(&event.event_id), "event")
                    .await
            {
                self.stats.lock().total_failed += 1;
                error!(
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    "State delta rejected"
                );
                self.fail_members(&event, "State delta rejected by validation");
                return;
            }
        }

        let processing_time = started.elapsed();
        {
            let mut stats = self.stats.lock();
            stats.total_processed += 1;
            stats.processing_time_total += processing_time;
        }
        debug!(
            event_type = %event.event_type,
            event_id = %event.event_id,
            processing_time_ms = processing_time.as_secs_f64() * 1000.0,
            "Event processed successfully"
        );

        if let Some(lifecycle) = &self.lifecycle {
            let mut metadata = Map::new();
            metadata.insert("retry_count".to_string(), json!(event.retry_count));
            metadata.insert("state_keys".to_string(), json!(state_keys));
            if let Some(batch_id) = &event.batch_id {
                metadata.insert("batch_id".to_string(), Value::String(batch_id.clone()));
            }
            for member in inbound_events(&event) {
                lifecycle.completed(&member.event_id, metadata.clone());
            }
        }
    }

    fn retry_or_fail(&self, mut event: QueuedEvent, error: &str) {
        if event.retry_count < event.max_retries {
            event.retry_count += 1;
            event.enqueued_at = Instant::now();
            let retry_count = event.retry_count;
            let event_type = event.event_type.clone();
            let event_id = event.event_id.clone();
            if self.push_event(event) {
                self.stats.lock().retry_count += 1;
                warn!(
                    event_type = %event_type,
                    event_id = %event_id,
                    retry_count,
                    error = %error,
                    "Event processing failed, retrying"
                );
            }
            return;
        }

        error!(
            event_type = %event.event_type,
            event_id = %event.event_id,
            error = %error,
            "Event processing failed after max retries"
        );
        let message = format!(
            "Processing failed after {} retries: {}",
            event.max_retries, error
        );
        self.fail_members(&event, &message);
    }

    /// Returns counters and a view of the heap and pending batches.
    pub fn stats(&self) -> QueueStats {
        let queue_size = self.len();
        let pending_batches = self
            .batches
            .lock()
            .iter()
            .map(|(key, batch)| (key.clone(), batch.len()))
            .collect();
        let worker_count = if self.is_running() {
            self.config.worker_count
        } else {
            0
        };
        let stats = self.stats.lock();
        QueueStats {
            total_enqueued: stats.total_enqueued,
            total_processed: stats.total_processed,
            total_failed: stats.total_failed,
            total_dropped: stats.total_dropped,
            batch_count: stats.batch_count,
            retry_count: stats.retry_count,
            queue_size_peak: stats.queue_size_peak,
            processing_time_total: stats.processing_time_total,
            uptime: stats.created.elapsed(),
            queue_size,
            pending_batches,
            worker_count,
            is_running: self.is_running(),
        }
    }

    /// Returns `true` while the workers are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawns the worker pool and the batch sweep.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(worker_count = self.config.worker_count, "Starting event queue workers");

        let mut tasks = Vec::with_capacity(self.config.worker_count + 1);
        for worker in 0..self.config.worker_count {
            let queue = self.clone();
            tasks.push(tokio::spawn(async move {
                queue.run_worker(worker).await;
            }));
        }

        let queue = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(queue.config.batch_sweep_interval);
            while queue.is_running() {
                interval.tick().await;
                queue.sweep_batches();
            }
        }));

        self.tasks.lock().extend(tasks);
        info!("Event queue started");
    }

    async fn run_worker(&self, worker: usize) {
        info!(worker, "Queue worker started");
        while self.is_running() {
            if !self.process_next().await {
                tokio::time::sleep(self.config.idle_sleep).await;
            }
        }
        info!(worker, "Queue worker stopped");
    }

    /// Stops workers, the sweep and batch timers, and waits for them to exit.
    ///
    /// Pending batches and queued events are left in place.
    pub async fn stop(&self) {
        info!("Stopping event queue");
        self.running.store(false, Ordering::Release);

        for batch in self.batches.lock().values_mut() {
            batch.cancel_timer();
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("Event queue stopped");
    }
}

/// Builder for [`EventQueue`].
#[derive(Default)]
pub struct QueueBuilder {
    config: QueueConfig,
    registry: Option<Arc<EventRegistry>>,
    global_filters: Option<Arc<FilterChain>>,
    lifecycle: Option<Arc<LifecycleLogger>>,
    state_sink: Option<Arc<StateSynchronizer>>,
}

impl QueueBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the heap capacity.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// Sets the number of workers.
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.config.worker_count = worker_count;
        self
    }

    /// Sets the worker idle sleep.
    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.config.idle_sleep = idle_sleep;
        self
    }

    /// Sets the retries allowed per event.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.default_max_retries = max_retries;
        self
    }

    /// Sets the batch configuration of a full event type.
    pub fn with_batch_config<S: Into<String>>(mut self, event_type: S, config: BatchConfig) -> Self {
        self.config.batch_configs.insert(event_type.into(), config);
        self
    }

    /// Sets the registry; defaults to [`EventRegistry::with_defaults`].
    pub fn with_registry(mut self, registry: Arc<EventRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Applies a global filter chain at admission.
    pub fn with_global_filters(mut self, filters: Arc<FilterChain>) -> Self {
        self.global_filters = Some(filters);
        self
    }

    /// Reports lifecycle stages to a logger.
    pub fn with_lifecycle(mut self, lifecycle: Arc<LifecycleLogger>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Commits merged handler deltas through a synchronizer.
    pub fn with_state_sink(mut self, sink: Arc<StateSynchronizer>) -> Self {
        self.state_sink = Some(sink);
        self
    }

    /// Builds the queue.
    pub fn build(self) -> EventQueue {
        let config = self.config;
        EventQueue {
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(EventRegistry::with_defaults())),
            global_filters: self.global_filters,
            lifecycle: self.lifecycle,
            state_sink: self.state_sink,
            heap: Arc::new(Mutex::new(PriorityHeap::with_capacity(config.max_size))),
            batches: Arc::new(Mutex::new(HashMap::new())),
            batch_generation: Arc::new(AtomicU64::new(0)),
            admission: Arc::new(Mutex::new(Admission::new(config.rate_limit_window_slots))),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(Mutex::new(Counters::new())),
            tasks: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            config: Arc::new(config),
        }
    }
}
