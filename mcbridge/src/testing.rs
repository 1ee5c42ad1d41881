//! Testing utilities for mcbridge applications.
//!
//! Handlers that record, fail or recover on demand, a session backend that
//! always errors, a recorder for subscriptions, and an [`EventBuilder`] for
//! well-formed inbound events.

use crate::error::{HandlerError, HandlerResult, StateError, StateResult};
use crate::event::{unix_millis, InboundEvent, QueuedEvent};
use crate::handler::{QueueHandler, StateDelta};
use crate::priority::Priority;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub use crate::sync::InMemorySession;

/// A handler that records every event it sees.
///
/// Clones share the same record, so a clone can be registered while the
/// original is kept for assertions.
///
/// # Examples
///
/// ```rust
/// use mcbridge::testing::{EventBuilder, RecordingHandler};
/// use mcbridge::EventQueue;
///
/// # tokio_test::block_on(async {
/// let queue = EventQueue::builder().build();
/// let recorder = RecordingHandler::new();
/// queue.register_handler("minecraft:chat", recorder.clone());
///
/// queue.enqueue(EventBuilder::chat("alex", "hi").build());
/// queue.process_next().await;
///
/// recorder.assert_called_times(1);
/// assert_eq!(recorder.events()[0].event_type, "minecraft:chat");
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<QueuedEvent>>>,
    delta: Option<StateDelta>,
}

impl RecordingHandler {
    /// Creates a handler that returns no delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handler that returns `delta` for every event.
    pub fn with_delta(delta: StateDelta) -> Self {
        Self {
            events: Arc::default(),
            delta: Some(delta),
        }
    }

    /// Returns the recorded events in call order.
    pub fn events(&self) -> Vec<QueuedEvent> {
        self.events.lock().clone()
    }

    /// Returns the number of calls.
    pub fn call_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns the `retry_count` of each recorded event.
    pub fn retry_counts(&self) -> Vec<u32> {
        self.events.lock().iter().map(|e| e.retry_count).collect()
    }

    /// Forgets every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Panics unless the handler ran exactly `expected` times.
    pub fn assert_called_times(&self, expected: usize) {
        let actual = self.call_count();
        assert_eq!(
            actual, expected,
            "expected handler to be called {} times, was called {} times",
            expected, actual
        );
    }
}

impl QueueHandler for RecordingHandler {
    fn handle(&self, event: &QueuedEvent) -> BoxFuture<'static, HandlerResult<Option<StateDelta>>> {
        self.events.lock().push(event.clone());
        futures::future::ready(Ok(self.delta.clone())).boxed()
    }

    fn handler_name(&self) -> &'static str {
        "recording"
    }
}

/// A handler that fails a fixed number of times, then succeeds.
#[derive(Debug, Clone)]
pub struct FlakyHandler {
    failures: usize,
    recorder: RecordingHandler,
}

impl FlakyHandler {
    /// Creates a handler that fails its first `failures` calls.
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            recorder: RecordingHandler::new(),
        }
    }

    /// Returns the `retry_count` seen on each call.
    pub fn retry_counts(&self) -> Vec<u32> {
        self.recorder.retry_counts()
    }

    /// Returns the number of calls.
    pub fn call_count(&self) -> usize {
        self.recorder.call_count()
    }
}

impl QueueHandler for FlakyHandler {
    fn handle(&self, event: &QueuedEvent) -> BoxFuture<'static, HandlerResult<Option<StateDelta>>> {
        let call = self.recorder.call_count();
        self.recorder.events.lock().push(event.clone());
        let result = if call < self.failures {
            Err(HandlerError::failed(format!("flaky failure {}", call + 1)))
        } else {
            Ok(None)
        };
        futures::future::ready(result).boxed()
    }

    fn handler_name(&self) -> &'static str {
        "flaky"
    }
}

/// A handler that always fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    message: String,
    calls: Arc<AtomicUsize>,
}

impl FailingHandler {
    /// Creates a handler failing with `message`.
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            calls: Arc::default(),
        }
    }

    /// Returns the number of calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QueueHandler for FailingHandler {
    fn handle(&self, _event: &QueuedEvent) -> BoxFuture<'static, HandlerResult<Option<StateDelta>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Err(HandlerError::failed(self.message.clone()))).boxed()
    }

    fn handler_name(&self) -> &'static str {
        "failing"
    }
}

fn explode() -> HandlerResult<Option<StateDelta>> {
    panic!("handler panicked")
}

/// A handler that panics on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingHandler;

impl QueueHandler for PanickingHandler {
    fn handle(&self, _event: &QueuedEvent) -> BoxFuture<'static, HandlerResult<Option<StateDelta>>> {
        async { explode() }.boxed()
    }

    fn handler_name(&self) -> &'static str {
        "panicking"
    }
}

/// A session backend whose every call fails.
#[derive(Debug, Default)]
pub struct FailingSession {
    attempts: AtomicU64,
}

impl FailingSession {
    /// Creates the backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many deltas were offered.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl crate::sync::SessionBackend for FailingSession {
    fn apply(&self, _delta: &StateDelta) -> BoxFuture<'_, StateResult<()>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Err(StateError::backend("session unavailable"))).boxed()
    }

    fn read(&self) -> BoxFuture<'_, StateResult<Map<String, Value>>> {
        futures::future::ready(Err(StateError::backend("session unavailable"))).boxed()
    }
}

/// Collects the events delivered to a subscription.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRecorder {
    events: Arc<Mutex<Vec<InboundEvent>>>,
}

impl SubscriptionRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a subscription handler feeding this recorder.
    pub fn handler(
        &self,
    ) -> impl Fn(InboundEvent) -> BoxFuture<'static, HandlerResult<()>> + Send + Sync + 'static
    {
        let events = Arc::clone(&self.events);
        move |event| {
            events.lock().push(event);
            futures::future::ready(Ok(())).boxed()
        }
    }

    /// Returns the delivered events.
    pub fn events(&self) -> Vec<InboundEvent> {
        self.events.lock().clone()
    }

    /// Returns the ids of the delivered events.
    pub fn event_ids(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.event_id.clone()).collect()
    }
}

/// Builds well-formed inbound events with unique ids and a current `time`.
///
/// # Examples
///
/// ```rust
/// use mcbridge::testing::EventBuilder;
///
/// let event = EventBuilder::position(1.0, 64.0, -3.5).bot("bot-1").build();
/// assert_eq!(event.event_type, "minecraft:position");
/// assert_eq!(event.bot_id.as_deref(), Some("bot-1"));
/// assert!(event.data.contains_key("time"));
/// ```
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: InboundEvent,
}

fn next_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("test-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

impl EventBuilder {
    /// Starts an event of the given type.
    pub fn new<S: Into<String>>(event_type: S) -> Self {
        Self {
            event: InboundEvent::new(event_type, next_id()).with_field("time", json!(unix_millis())),
        }
    }

    /// A `minecraft:spawn` event at the origin with full vitals.
    pub fn spawn() -> Self {
        Self::new("minecraft:spawn")
            .field("spawned", json!(true))
            .field("position", json!({"x": 0.0, "y": 64.0, "z": 0.0}))
            .field("health", json!(20))
            .field("food", json!(20))
    }

    /// A `minecraft:chat` event.
    pub fn chat(username: &str, message: &str) -> Self {
        Self::new("minecraft:chat")
            .field("username", json!(username))
            .field("message", json!(message))
    }

    /// A `minecraft:position` event.
    pub fn position(x: f64, y: f64, z: f64) -> Self {
        Self::new("minecraft:position")
            .field("x", json!(x))
            .field("y", json!(y))
            .field("z", json!(z))
    }

    /// A `minecraft:health` event.
    pub fn health(health: f64, food: f64, saturation: f64) -> Self {
        Self::new("minecraft:health")
            .field("health", json!(health))
            .field("food", json!(food))
            .field("saturation", json!(saturation))
    }

    /// A `minecraft:block_update` event.
    pub fn block_update(x: i64, y: i64, z: i64, new_block: &str) -> Self {
        Self::new("minecraft:block_update")
            .field("position", json!({"x": x, "y": y, "z": z}))
            .field("new_block", json!(new_block))
    }

    /// Sets the event id.
    pub fn id<S: Into<String>>(mut self, id: S) -> Self {
        self.event.event_id = id.into();
        self
    }

    /// Sets a payload field.
    pub fn field<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.event.data.insert(key.into(), value);
        self
    }

    /// Removes a payload field.
    pub fn without<K: AsRef<str>>(mut self, key: K) -> Self {
        self.event.data.remove(key.as_ref());
        self
    }

    /// Sets the payload `time`.
    pub fn time(self, millis: i64) -> Self {
        self.field("time", json!(millis))
    }

    /// Sets the producing bot.
    pub fn bot<S: Into<String>>(mut self, bot_id: S) -> Self {
        self.event.bot_id = Some(bot_id.into());
        self
    }

    /// Sets an explicit priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.event.priority = Some(priority);
        self
    }

    /// Sets a metadata entry.
    pub fn metadata<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.event.metadata.insert(key.into(), value);
        self
    }

    /// Returns the event.
    pub fn build(self) -> InboundEvent {
        self.event
    }
}
