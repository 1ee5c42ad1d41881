//! Event lifecycle tracking.
//!
//! Every event moves through `emitted → received → processed →
//! completed | failed`. The [`LifecycleLogger`] keeps in-flight events in an
//! active map, moves them into a bounded history ring once they reach a
//! terminal stage, and computes rolling statistics over recent completions.
//! Transitions are tolerant of missing earlier stages; terminal transitions
//! for unknown ids are ignored with a warning.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Error recorded for events force-failed by the expiry sweep.
pub const EXPIRED_ERROR: &str = "Event expired - processing timeout";

/// A stage in an event's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStage {
    /// Accepted from the producer.
    Emitted,
    /// Dequeued by a worker.
    Received,
    /// Handlers ran and produced a delta.
    Processed,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl EventStage {
    /// Returns the lowercase stage name.
    pub fn as_str(self) -> &'static str {
        match self {
            EventStage::Emitted => "emitted",
            EventStage::Received => "received",
            EventStage::Processed => "processed",
            EventStage::Completed => "completed",
            EventStage::Failed => "failed",
        }
    }

    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventStage::Completed | EventStage::Failed)
    }
}

impl std::fmt::Display for EventStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event's lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Event id.
    pub event_id: String,
    /// Event type.
    pub event_type: String,
    /// Latest stage reached.
    pub stage: EventStage,
    /// Wall-clock time the entry was created.
    pub timestamp: DateTime<Utc>,
    /// Serialized payload size in bytes.
    pub payload_size: usize,
    /// Queue latency while in flight, total elapsed time once completed.
    pub processing_time: Option<Duration>,
    /// Failure reason for failed events.
    pub error: Option<String>,
    /// Free-form details such as payload keys, state keys and retry count.
    pub metadata: Map<String, Value>,
}

/// Configuration for the lifecycle logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Capacity of the history ring.
    pub max_history: usize,
    /// Log every transition at debug level.
    pub debug_mode: bool,
    /// Active entries older than this are force-failed.
    pub expiry: Duration,
    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,
    /// How often the metrics summary is logged.
    pub metrics_interval: Duration,
    /// Rolling window for recent-event statistics.
    pub performance_window: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_history: 10_000,
            debug_mode: false,
            expiry: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            metrics_interval: Duration::from_secs(300),
            performance_window: Duration::from_secs(300),
        }
    }
}

/// Count and mean latency of completed events of one type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeTiming {
    /// Completed events.
    pub count: u64,
    /// Mean emitted-to-completed latency.
    pub average: Duration,
}

/// Rolling performance figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Stage transitions recorded.
    pub total_events: u64,
    /// Transitions per second since the logger was created.
    pub events_per_second: f64,
    /// Events currently in flight.
    pub active_events: usize,
    /// Completions inside the performance window.
    pub recent_events: usize,
    /// Failed events as a percentage of transitions.
    pub error_rate_percent: f64,
    /// Mean latency across all completed events.
    pub average_processing_time: Duration,
    /// Transitions per event type.
    pub events_by_type: BTreeMap<String, u64>,
    /// Recent completions per event type.
    pub recent_events_by_type: BTreeMap<String, u64>,
    /// Completion latency per event type.
    pub processing_times_by_type: BTreeMap<String, TypeTiming>,
}

/// Cumulative transition counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleStats {
    /// Stage transitions recorded.
    pub total_events: u64,
    /// Transitions per event type.
    pub events_by_type: BTreeMap<String, u64>,
    /// Transitions per stage.
    pub events_by_stage: BTreeMap<EventStage, u64>,
    /// Failed events.
    pub error_count: u64,
    /// Failed events per type.
    pub errors_by_type: BTreeMap<String, u64>,
}

#[derive(Debug)]
struct ActiveEntry {
    entry: EventLogEntry,
    started: Instant,
}

impl ActiveEntry {
    fn untracked(event_id: &str, event_type: &str) -> Self {
        Self {
            entry: EventLogEntry {
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                stage: EventStage::Emitted,
                timestamp: Utc::now(),
                payload_size: 0,
                processing_time: None,
                error: None,
                metadata: Map::new(),
            },
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Timing {
    count: u64,
    total: Duration,
}

#[derive(Debug, Default)]
struct LifecycleState {
    active: HashMap<String, ActiveEntry>,
    history: VecDeque<EventLogEntry>,
    recent: VecDeque<(Instant, String)>,
    stats: LifecycleStats,
    timings: HashMap<String, Timing>,
}

impl LifecycleState {
    fn record(&mut self, stage: EventStage, event_type: &str) {
        self.stats.total_events += 1;
        *self
            .stats
            .events_by_type
            .entry(event_type.to_string())
            .or_default() += 1;
        *self.stats.events_by_stage.entry(stage).or_default() += 1;
    }

    fn archive(&mut self, entry: EventLogEntry, max_history: usize) {
        if max_history == 0 {
            return;
        }
        while self.history.len() >= max_history {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }
}

/// Tracks events through their lifecycle stages.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{EventStage, LifecycleLogger};
/// use serde_json::Map;
///
/// # tokio_test::block_on(async {
/// let logger = LifecycleLogger::new(Default::default());
///
/// logger.emitted("e1", "minecraft:chat", &Map::new());
/// logger.received("e1", "minecraft:chat", None);
/// assert!(logger.completed("e1", Map::new()));
///
/// let timeline = logger.event_timeline(None, 10);
/// assert_eq!(timeline[0].stage, EventStage::Completed);
/// # });
/// ```
#[derive(Debug)]
pub struct LifecycleLogger {
    config: LifecycleConfig,
    state: Mutex<LifecycleState>,
    created: Instant,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Default for LifecycleLogger {
    fn default() -> Self {
        Self::new(LifecycleConfig::default())
    }
}

impl LifecycleLogger {
    /// Creates a logger with the given configuration.
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LifecycleState::default()),
            created: Instant::now(),
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Records that an event was accepted from the producer.
    pub fn emitted(&self, event_id: &str, event_type: &str, payload: &Map<String, Value>) {
        let payload_size = if payload.is_empty() {
            0
        } else {
            serde_json::to_string(payload).map(|s| s.len()).unwrap_or(0)
        };

        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("producer"));
        metadata.insert(
            "payload_keys".to_string(),
            json!(payload.keys().collect::<Vec<_>>()),
        );

        let entry = EventLogEntry {
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            stage: EventStage::Emitted,
            timestamp: Utc::now(),
            payload_size,
            processing_time: None,
            error: None,
            metadata,
        };

        let mut state = self.state.lock();
        state.active.insert(
            event_id.to_string(),
            ActiveEntry {
                entry,
                started: Instant::now(),
            },
        );
        state.record(EventStage::Emitted, event_type);
        drop(state);

        if self.config.debug_mode {
            debug!(event_id, event_type, payload_size, "Event emitted");
        }
    }

    fn advance<F>(&self, event_id: &str, event_type: &str, stage: EventStage, update: F)
    where
        F: FnOnce(&mut EventLogEntry),
    {
        let mut state = self.state.lock();
        let known = state.active.contains_key(event_id);
        state.record(stage, event_type);

        let active = state
            .active
            .entry(event_id.to_string())
            .or_insert_with(|| ActiveEntry::untracked(event_id, event_type));
        active.entry.stage = stage;
        update(&mut active.entry);
        drop(state);

        if !known {
            warn!(event_id, event_type, stage = %stage, "Transition for unknown event");
        }
    }

    /// Records that a worker dequeued the event after `queue_latency`.
    pub fn received(&self, event_id: &str, event_type: &str, queue_latency: Option<Duration>) {
        self.advance(event_id, event_type, EventStage::Received, |entry| {
            entry.processing_time = queue_latency;
        });

        if self.config.debug_mode {
            debug!(event_id, event_type, queue_latency = ?queue_latency, "Event received");
        }
    }

    /// Records that handlers produced a delta touching `state_keys`.
    pub fn processed(&self, event_id: &str, event_type: &str, state_keys: &[String]) {
        self.advance(event_id, event_type, EventStage::Processed, |entry| {
            if !state_keys.is_empty() {
                entry
                    .metadata
                    .insert("state_changes".to_string(), json!(state_keys));
            }
        });

        if self.config.debug_mode {
            debug!(event_id, event_type, state_changes = state_keys.len(), "Event processed");
        }
    }

    /// Moves an active event into history as completed.
    ///
    /// `metadata` is merged into the entry. Returns `false` (and logs a
    /// warning) if the event is not active.
    pub fn completed(&self, event_id: &str, metadata: Map<String, Value>) -> bool {
        let mut state = self.state.lock();
        let Some(ActiveEntry { mut entry, started }) = state.active.remove(event_id) else {
            drop(state);
            warn!(event_id, "Completed unknown event");
            return false;
        };

        let total_time = started.elapsed();
        entry.stage = EventStage::Completed;
        entry.processing_time = Some(total_time);
        entry.metadata.extend(metadata);

        let event_type = entry.event_type.clone();
        state.record(EventStage::Completed, &event_type);
        let timing = state.timings.entry(event_type.clone()).or_default();
        timing.count += 1;
        timing.total += total_time;
        state.recent.push_back((Instant::now(), event_type.clone()));
        while state.recent.len() > self.config.max_history.max(1) {
            state.recent.pop_front();
        }
        state.archive(entry, self.config.max_history);
        drop(state);

        if self.config.debug_mode {
            debug!(event_id, event_type = %event_type, total_time = ?total_time, "Event completed");
        }
        true
    }

    /// Moves an active event into history as failed.
    ///
    /// Returns `false` (and logs a warning) if the event is not active.
    pub fn failed(&self, event_id: &str, error: &str) -> bool {
        let mut state = self.state.lock();
        let Some(ActiveEntry { mut entry, .. }) = state.active.remove(event_id) else {
            drop(state);
            warn!(event_id, error, "Failed unknown event");
            return false;
        };

        entry.stage = EventStage::Failed;
        entry.error = Some(error.to_string());

        let event_type = entry.event_type.clone();
        state.record(EventStage::Failed, &event_type);
        state.stats.error_count += 1;
        *state
            .stats
            .errors_by_type
            .entry(event_type.clone())
            .or_default() += 1;
        state.archive(entry, self.config.max_history);
        drop(state);

        warn!(event_id, event_type = %event_type, error, "Event failed");
        true
    }

    /// Forgets an active event that was dropped at admission.
    ///
    /// Nothing is archived or counted as an error.
    pub fn discard(&self, event_id: &str, reason: &str) -> bool {
        let removed = self.state.lock().active.remove(event_id).is_some();
        if removed && self.config.debug_mode {
            debug!(event_id, reason, "Event discarded");
        }
        removed
    }

    /// Force-fails every active event older than the configured expiry.
    ///
    /// Returns the number of expired events.
    pub fn sweep_expired(&self) -> usize {
        let expired: Vec<String> = {
            let state = self.state.lock();
            state
                .active
                .iter()
                .filter(|(_, active)| active.started.elapsed() > self.config.expiry)
                .map(|(id, _)| id.clone())
                .collect()
        };

        let count = expired
            .iter()
            .filter(|id| self.failed(id, EXPIRED_ERROR))
            .count();
        if count > 0 {
            warn!(count, "Cleaned up expired events");
        }
        count
    }

    /// Drops recent completions that fell out of the performance window.
    pub fn prune_recent(&self) {
        let window = self.config.performance_window;
        let mut state = self.state.lock();
        while let Some((at, _)) = state.recent.front() {
            if at.elapsed() > window {
                state.recent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns current rolling statistics.
    pub fn performance_summary(&self) -> PerformanceSummary {
        let window = self.config.performance_window;
        let state = self.state.lock();

        let mut recent_events_by_type: BTreeMap<String, u64> = BTreeMap::new();
        let mut recent_events = 0;
        for (at, event_type) in &state.recent {
            if at.elapsed() <= window {
                recent_events += 1;
                *recent_events_by_type.entry(event_type.clone()).or_default() += 1;
            }
        }

        let (count, total) = state
            .timings
            .values()
            .fold((0u64, Duration::ZERO), |(c, t), timing| (c + timing.count, t + timing.total));
        let average_processing_time = average(total, count);

        let elapsed = self.created.elapsed().as_secs_f64();
        let stats = &state.stats;

        PerformanceSummary {
            total_events: stats.total_events,
            events_per_second: if elapsed > 0.0 {
                stats.total_events as f64 / elapsed
            } else {
                0.0
            },
            active_events: state.active.len(),
            recent_events,
            error_rate_percent: if stats.total_events > 0 {
                stats.error_count as f64 / stats.total_events as f64 * 100.0
            } else {
                0.0
            },
            average_processing_time,
            events_by_type: stats.events_by_type.clone(),
            recent_events_by_type,
            processing_times_by_type: state
                .timings
                .iter()
                .filter(|(_, t)| t.count > 0)
                .map(|(event_type, t)| {
                    (
                        event_type.clone(),
                        TypeTiming {
                            count: t.count,
                            average: average(t.total, t.count),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Returns the most recent `limit` history entries, oldest first,
    /// optionally restricted to one event type.
    pub fn event_timeline(&self, event_type: Option<&str>, limit: usize) -> Vec<EventLogEntry> {
        let state = self.state.lock();
        let matching: Vec<&EventLogEntry> = state
            .history
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Returns the active entry for an event.
    pub fn active_entry(&self, event_id: &str) -> Option<EventLogEntry> {
        self.state
            .lock()
            .active
            .get(event_id)
            .map(|a| a.entry.clone())
    }

    /// Returns the number of in-flight events.
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Returns the number of history entries.
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Returns the cumulative counters.
    pub fn stats(&self) -> LifecycleStats {
        self.state.lock().stats.clone()
    }

    fn log_summary(&self) {
        let summary = self.performance_summary();
        info!(
            total_events = summary.total_events,
            events_per_second = summary.events_per_second,
            active_events = summary.active_events,
            recent_events = summary.recent_events,
            error_rate = summary.error_rate_percent,
            avg_processing_time = ?summary.average_processing_time,
            "Event pipeline metrics"
        );
    }

    /// Spawns the expiry sweep and the periodic summary tasks.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let sweeper = Arc::clone(self);
        let sweep = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweeper.config.sweep_interval);
            while sweeper.running.load(Ordering::Acquire) {
                interval.tick().await;
                sweeper.sweep_expired();
            }
        });

        let reporter = Arc::clone(self);
        let metrics = tokio::spawn(async move {
            while reporter.running.load(Ordering::Acquire) {
                tokio::time::sleep(reporter.config.metrics_interval).await;
                reporter.prune_recent();
                reporter.log_summary();
            }
        });

        self.tasks.lock().extend([sweep, metrics]);
        info!("Lifecycle logger started");
    }

    /// Stops the background tasks and waits for them to exit.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("Lifecycle logger stopped");
    }
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        let nanos = total.as_nanos() / u128::from(count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
