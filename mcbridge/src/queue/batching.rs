//! Batch accumulation and flushing.
//!
//! Batch-eligible events are buffered per event type, so equally named
//! types from different domains never share a buffer. A buffer is flushed into one synthetic event when it
//! reaches its max size, when its window timer fires, or when the periodic
//! sweep finds it older than its max wait.

use super::EventQueue;
use crate::event::{domain_of, short_type_of, FlushReason, QueuedEvent};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Batching parameters for one event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Whether events of this type are batched.
    pub enabled: bool,
    /// Flush as soon as the batch holds this many events.
    pub max_size: usize,
    /// Flush this long after the first event arrives.
    pub window: Duration,
    /// The sweep flushes batches older than this.
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100,
            window: Duration::from_millis(100),
            max_wait: Duration::from_millis(1000),
        }
    }
}

impl BatchConfig {
    /// Sets the max size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    /// Sets the window.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the max wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Disables batching.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub(crate) struct PendingBatch {
    generation: u64,
    events: Vec<QueuedEvent>,
    started: Instant,
    max_wait: Duration,
    timer: Option<JoinHandle<()>>,
}

impl PendingBatch {
    fn new(generation: u64, max_wait: Duration) -> Self {
        Self {
            generation,
            events: Vec::new(),
            started: Instant::now(),
            max_wait,
            timer: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl EventQueue {
    /// Appends an event to its pending batch, flushing when it is full.
    pub(crate) fn enqueue_for_batch(&self, event: QueuedEvent, config: &BatchConfig) -> bool {
        let key = event.event_type.clone();

        let full = {
            let mut batches = self.batches.lock();
            let batch = batches.entry(key.clone()).or_insert_with(|| {
                let generation = self.batch_generation.fetch_add(1, Ordering::Relaxed);
                PendingBatch::new(generation, config.max_wait)
            });
            debug!(
                event_type = %event.event_type,
                event_id = %event.event_id,
                batch_key = %key,
                batch_size = batch.len() + 1,
                "Event added to batch"
            );
            batch.events.push(event);

            if batch.len() >= config.max_size {
                true
            } else {
                if batch.timer.is_none() {
                    batch.timer = self.spawn_batch_timer(&key, batch.generation, config.window);
                }
                false
            }
        };

        if full {
            self.flush_batch(&key, FlushReason::SizeLimit);
        }
        true
    }

    fn spawn_batch_timer(
        &self,
        key: &str,
        generation: u64,
        window: Duration,
    ) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let queue = self.clone();
        let key = key.to_string();
        Some(runtime.spawn(async move {
            tokio::time::sleep(window).await;
            queue.flush_generation(&key, generation);
        }))
    }

    /// Timer flush that only fires for the batch the timer was started for.
    ///
    /// A timer already running when its batch was flushed by size or sweep
    /// must not flush the next batch under the same key.
    pub(crate) fn flush_generation(&self, key: &str, generation: u64) -> bool {
        let batch = {
            let mut batches = self.batches.lock();
            match batches.get(key) {
                Some(batch) if batch.generation == generation => batches.remove(key),
                _ => None,
            }
        };
        match batch {
            Some(mut batch) => {
                batch.timer.take();
                self.push_batch(key, batch, FlushReason::Timer)
            }
            None => {
                debug!(batch_key = %key, generation, "Stale batch timer ignored");
                false
            }
        }
    }

    /// Flushes one pending batch into the main heap.
    ///
    /// Returns `false` when no events were pending under `key` or the
    /// synthetic event was rejected by the capacity policy.
    pub fn flush_batch(&self, key: &str, reason: FlushReason) -> bool {
        let Some(mut batch) = self.batches.lock().remove(key) else {
            return false;
        };
        batch.cancel_timer();
        self.push_batch(key, batch, reason)
    }

    fn push_batch(&self, key: &str, mut batch: PendingBatch, reason: FlushReason) -> bool {
        if batch.events.is_empty() {
            return false;
        }

        let batch_id = format!(
            "batch_{}_{}",
            short_type_of(key),
            Uuid::new_v4().simple()
        );
        let mut events = std::mem::take(&mut batch.events);
        for event in &mut events {
            event.batch_id = Some(batch_id.clone());
        }
        let size = events.len();

        let mut synthetic = QueuedEvent::batch(
            batch_id,
            domain_of(key),
            short_type_of(key).to_string(),
            events,
            reason,
        );
        synthetic.max_retries = self.config.default_max_retries;

        let admitted = self.push_event(synthetic);
        self.stats.lock().batch_count += 1;
        info!(
            batch_key = %key,
            batch_size = size,
            flush_reason = %reason,
            "Batch flushed to queue"
        );
        admitted
    }

    /// Flushes every pending batch, returning how many were flushed.
    pub fn flush_all(&self, reason: FlushReason) -> usize {
        let keys: Vec<String> = self.batches.lock().keys().cloned().collect();
        keys.iter()
            .filter(|key| self.flush_batch(key, reason))
            .count()
    }

    /// Flushes batches that have waited longer than their max wait.
    pub fn sweep_batches(&self) -> usize {
        let expired: Vec<String> = self
            .batches
            .lock()
            .iter()
            .filter(|(_, batch)| !batch.events.is_empty() && batch.started.elapsed() > batch.max_wait)
            .map(|(key, _)| key.clone())
            .collect();
        expired
            .iter()
            .filter(|key| self.flush_batch(key, FlushReason::Timeout))
            .count()
    }

    /// Returns the number of events pending for an event type.
    pub fn pending_batch_len(&self, key: &str) -> usize {
        self.batches.lock().get(key).map_or(0, PendingBatch::len)
    }
}
