//! Queue handlers for mcbridge.
//!
//! A [`QueueHandler`] is invoked by a queue worker for every dequeued event of
//! the type it was registered for. Handlers may return a [`StateDelta`]; the
//! worker merges the deltas of all handlers in registration order and hands
//! the result to the state synchronizer.

use crate::error::HandlerResult;
use crate::event::{unix_millis, InboundEvent, QueuedEvent};
use crate::registry::EventRegistry;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// A partial mapping of dot-path state keys to new values.
pub type StateDelta = Map<String, Value>;

/// Unique identifier for registered queue handlers.
///
/// Returned by `register_handler` and used to unregister the handler later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Creates a new unique handler ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

/// Processes queued events and optionally produces a state delta.
///
/// Closures of the shape `Fn(QueuedEvent) -> impl Future<Output =
/// HandlerResult<Option<StateDelta>>>` implement this trait automatically.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{HandlerResult, QueueHandler, QueuedEvent, StateDelta};
/// use serde_json::json;
///
/// let handler = |event: QueuedEvent| async move {
///     let mut delta = StateDelta::new();
///     delta.insert("last.seen".to_string(), json!(event.event_id));
///     HandlerResult::Ok(Some(delta))
/// };
///
/// fn assert_handler<H: QueueHandler>(_: &H) {}
/// assert_handler(&handler);
/// ```
pub trait QueueHandler: Send + Sync + 'static {
    /// Handles one dequeued event.
    ///
    /// The event carries its current `retry_count`.
    fn handle(&self, event: &QueuedEvent) -> BoxFuture<'static, HandlerResult<Option<StateDelta>>>;

    /// Returns the handler's name for logging.
    fn handler_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F, Fut> QueueHandler for F
where
    F: Fn(QueuedEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Option<StateDelta>>> + Send + 'static,
{
    fn handle(&self, event: &QueuedEvent) -> BoxFuture<'static, HandlerResult<Option<StateDelta>>> {
        self(event.clone()).boxed()
    }
}

/// Returns the inbound events carried by a queued event, in arrival order.
pub fn inbound_events(event: &QueuedEvent) -> Vec<&InboundEvent> {
    match event.as_batch() {
        Some(batch) => batch.events.iter().filter_map(QueuedEvent::as_single).collect(),
        None => event.as_single().into_iter().collect(),
    }
}

fn event_time(event: &InboundEvent) -> Value {
    match event.data.get("time") {
        Some(time) if !time.is_null() => time.clone(),
        _ => json!(unix_millis()),
    }
}

/// Applies the registry's state mapping and records last-event bookkeeping.
///
/// For a batch every member's mapping is merged in arrival order and the
/// bookkeeping keys describe the last member.
#[derive(Debug, Clone)]
pub struct StateMappingHandler {
    registry: Arc<EventRegistry>,
}

impl StateMappingHandler {
    /// Creates a handler backed by the given registry.
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self { registry }
    }

    /// Builds the delta for a queued event.
    pub fn delta_for(&self, event: &QueuedEvent) -> StateDelta {
        let mut delta = StateDelta::new();
        let members = inbound_events(event);

        for member in &members {
            delta.extend(
                self.registry
                    .resolve_state_mapping(&member.event_type, &member.data),
            );
        }

        if let Some(last) = members.last() {
            delta.insert(
                "minecraft.events.last_event_type".to_string(),
                json!(last.event_type),
            );
            delta.insert("minecraft.events.last_event_time".to_string(), event_time(last));
            delta.insert(
                "minecraft.events.last_event_id".to_string(),
                json!(last.event_id),
            );
        }
        delta
    }
}

impl QueueHandler for StateMappingHandler {
    fn handle(&self, event: &QueuedEvent) -> BoxFuture<'static, HandlerResult<Option<StateDelta>>> {
        let delta = Some(self.delta_for(event)).filter(|d| !d.is_empty());
        futures::future::ready(Ok(delta)).boxed()
    }

    fn handler_name(&self) -> &'static str {
        "state_mapping"
    }
}

/// Marks the bot as spawned and connected, with position and vitals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnHandler;

impl SpawnHandler {
    fn delta_for(event: &InboundEvent) -> StateDelta {
        let data = &event.data;
        let time = event_time(event);

        let mut delta = StateDelta::new();
        delta.insert("minecraft.spawned".to_string(), json!(true));
        delta.insert("minecraft.bot.ready".to_string(), json!(true));
        delta.insert("minecraft.connection.status".to_string(), json!("connected"));
        delta.insert("minecraft.spawn_time".to_string(), time.clone());

        if let Some(position) = data.get("position").and_then(Value::as_object) {
            for axis in ["x", "y", "z"] {
                delta.insert(
                    format!("minecraft.bot.position.{}", axis),
                    position.get(axis).cloned().unwrap_or_else(|| json!(0)),
                );
            }
            delta.insert("minecraft.bot.position.last_update".to_string(), time);
        }

        for vital in ["health", "food"] {
            if let Some(value) = data.get(vital) {
                delta.insert(format!("minecraft.bot.{}", vital), value.clone());
            }
        }
        delta
    }
}

impl QueueHandler for SpawnHandler {
    fn handle(&self, event: &QueuedEvent) -> BoxFuture<'static, HandlerResult<Option<StateDelta>>> {
        let mut delta = StateDelta::new();
        for member in inbound_events(event) {
            delta.extend(Self::delta_for(member));
        }
        info!(
            event_id = %event.event_id,
            state_keys = delta.len(),
            "Processed spawn event"
        );
        futures::future::ready(Ok(Some(delta))).boxed()
    }

    fn handler_name(&self) -> &'static str {
        "spawn"
    }
}

/// Records recent chat per speaker and flags non-empty messages for a reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatHandler;

impl ChatHandler {
    fn delta_for(event: &InboundEvent) -> StateDelta {
        let data = &event.data;
        let username = data
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let message = data.get("message").and_then(Value::as_str).unwrap_or("");
        let time = event_time(event);

        let mut delta = StateDelta::new();
        delta.insert(
            format!("minecraft.chat.recent.{}", username),
            json!({ "message": message, "time": time }),
        );
        delta.insert("minecraft.chat.last_message".to_string(), json!(message));
        delta.insert("minecraft.chat.last_speaker".to_string(), json!(username));
        delta.insert("minecraft.chat.last_time".to_string(), time);

        if !message.trim().is_empty() {
            delta.insert("minecraft.chat.needs_response".to_string(), json!(true));
        }
        delta
    }
}

impl QueueHandler for ChatHandler {
    fn handle(&self, event: &QueuedEvent) -> BoxFuture<'static, HandlerResult<Option<StateDelta>>> {
        let mut delta = StateDelta::new();
        for member in inbound_events(event) {
            delta.extend(Self::delta_for(member));
        }
        futures::future::ready(Ok(Some(delta))).boxed()
    }

    fn handler_name(&self) -> &'static str {
        "chat"
    }
}
