//! Event records flowing through the pipeline.
//!
//! [`InboundEvent`] is the wire contract consumed from the upstream producer.
//! [`QueuedEvent`] is the queue's own envelope around either a single inbound
//! event or a flushed batch of them.

use crate::priority::Priority;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::time::Instant;

/// Default number of retries before a queued event is terminally failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Event type suffix used for synthetic batch events.
pub const BATCH_EVENT_SUFFIX: &str = "batch";

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A raw event as delivered by the upstream producer.
///
/// Field names follow the wire format: `event`, `eventId`, `data`,
/// `timestamp` (or `time`), `botId` and `metadata`. Missing type or id
/// deserialize as empty strings so the queue can reject them explicitly.
///
/// # Examples
///
/// ```rust
/// use mcbridge::InboundEvent;
///
/// let raw = r#"{
///     "event": "minecraft:chat",
///     "eventId": "e-42",
///     "data": {"username": "alex", "message": "hi", "time": 1700000000000},
///     "botId": "bot-1",
///     "metadata": {"dimension": "overworld"}
/// }"#;
///
/// let event: InboundEvent = serde_json::from_str(raw).unwrap();
/// assert_eq!(event.event_type, "minecraft:chat");
/// assert_eq!(event.short_type(), "chat");
/// assert_eq!(event.time_ms(), Some(1_700_000_000_000));
/// assert_eq!(event.dimension(), Some("overworld"));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Namespaced event type, e.g. `minecraft:spawn`.
    #[serde(rename = "event", default)]
    pub event_type: String,

    /// Producer-assigned unique id.
    #[serde(rename = "eventId", default)]
    pub event_id: String,

    /// Type-specific payload fields.
    #[serde(default)]
    pub data: Map<String, Value>,

    /// Record timestamp in milliseconds since the epoch.
    #[serde(default, alias = "time", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Identifier of the bot that produced the event.
    #[serde(rename = "botId", default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,

    /// Free-form producer metadata, may hold `dimension`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// Explicit priority, stamped from the registry when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl InboundEvent {
    /// Creates an event with an empty payload.
    pub fn new<T: Into<String>, I: Into<String>>(event_type: T, event_id: I) -> Self {
        Self {
            event_type: event_type.into(),
            event_id: event_id.into(),
            ..Self::default()
        }
    }

    /// Replaces the payload.
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Sets a single payload field.
    pub fn with_field<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Sets the record timestamp.
    pub fn with_timestamp(mut self, millis: i64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    /// Sets the bot identifier.
    pub fn with_bot_id<S: Into<String>>(mut self, bot_id: S) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    /// Sets a metadata field.
    pub fn with_metadata<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Sets an explicit priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Returns the namespace part of the type (`minecraft` for `minecraft:chat`).
    pub fn domain(&self) -> &str {
        domain_of(&self.event_type)
    }

    /// Returns the type with its namespace stripped (`chat` for `minecraft:chat`).
    pub fn short_type(&self) -> &str {
        short_type_of(&self.event_type)
    }

    /// Returns the event time, preferring `data.time` over the record timestamp.
    pub fn time_ms(&self) -> Option<i64> {
        self.data
            .get("time")
            .and_then(Value::as_f64)
            .map(|t| t as i64)
            .or(self.timestamp)
    }

    /// Returns `metadata.dimension` when it is a string.
    pub fn dimension(&self) -> Option<&str> {
        self.metadata.get("dimension").and_then(Value::as_str)
    }

    /// Returns the explicit priority or [`Priority::NONE`].
    pub fn priority_or_default(&self) -> Priority {
        self.priority.unwrap_or(Priority::NONE)
    }

    /// Returns the serialized length of the payload in bytes.
    pub fn payload_size(&self) -> usize {
        serde_json::to_string(&self.data).map(|s| s.len()).unwrap_or(0)
    }
}

/// Returns the namespace of an event type, or an empty string if it has none.
pub fn domain_of(event_type: &str) -> &str {
    event_type.split_once(':').map(|(domain, _)| domain).unwrap_or("")
}

/// Returns an event type with its namespace stripped.
pub fn short_type_of(event_type: &str) -> &str {
    event_type
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(event_type)
}

/// Returns the synthetic batch type for a domain (`minecraft:batch`).
pub fn batch_type_for(domain: &str) -> String {
    if domain.is_empty() {
        BATCH_EVENT_SUFFIX.to_string()
    } else {
        format!("{}:{}", domain, BATCH_EVENT_SUFFIX)
    }
}

/// Why a pending batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    /// The batch reached its configured max size.
    SizeLimit,
    /// The batch window timer fired.
    Timer,
    /// The max-wait sweep found the batch too old.
    Timeout,
    /// The batch was flushed explicitly.
    Shutdown,
}

impl FlushReason {
    /// Returns the wire name of this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            FlushReason::SizeLimit => "size_limit",
            FlushReason::Timer => "timer",
            FlushReason::Timeout => "timeout",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of a synthetic batch event.
#[derive(Debug, Clone)]
pub struct BatchBody {
    /// Short type shared by every member.
    pub batch_type: String,
    /// Members in arrival order.
    pub events: Vec<QueuedEvent>,
    /// What triggered the flush.
    pub flush_reason: FlushReason,
}

impl BatchBody {
    /// Returns the number of member events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Payload of a queued event.
#[derive(Debug, Clone)]
pub enum EventBody {
    /// A single inbound event.
    Single(InboundEvent),
    /// A flushed batch of events of one type.
    Batch(BatchBody),
}

/// The queue's envelope around an event.
///
/// Ordering inside the queue is priority descending, then `enqueued_at`
/// ascending. The queue resets `enqueued_at` and increments `retry_count`
/// when it re-enqueues a failed event.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    /// Effective priority.
    pub priority: Priority,
    /// When the event entered (or re-entered) the queue.
    pub enqueued_at: Instant,
    /// Unique event id.
    pub event_id: String,
    /// Full event type.
    pub event_type: String,
    /// Single event or batch.
    pub body: EventBody,
    /// Id of the batch this event was flushed in, if any.
    pub batch_id: Option<String>,
    /// Number of retries performed so far.
    pub retry_count: u32,
    /// Retries allowed before terminal failure.
    pub max_retries: u32,
}

impl QueuedEvent {
    /// Wraps a single inbound event.
    pub fn single(event: InboundEvent, priority: Priority) -> Self {
        Self {
            priority,
            enqueued_at: Instant::now(),
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            body: EventBody::Single(event),
            batch_id: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Builds the synthetic event for a flushed batch.
    ///
    /// Priority is the most urgent member plus [`Priority::BATCH_BOOST`] and
    /// the enqueue instant is that of the earliest member.
    pub fn batch(
        batch_id: String,
        domain: &str,
        batch_type: String,
        events: Vec<QueuedEvent>,
        flush_reason: FlushReason,
    ) -> Self {
        let priority = events
            .iter()
            .map(|e| e.priority)
            .max()
            .unwrap_or(Priority::NONE)
            .boosted(Priority::BATCH_BOOST);
        let enqueued_at = events
            .iter()
            .map(|e| e.enqueued_at)
            .min()
            .unwrap_or_else(Instant::now);

        Self {
            priority,
            enqueued_at,
            event_id: batch_id.clone(),
            event_type: batch_type_for(domain),
            body: EventBody::Batch(BatchBody {
                batch_type,
                events,
                flush_reason,
            }),
            batch_id: Some(batch_id),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Returns the inbound event for single events.
    pub fn as_single(&self) -> Option<&InboundEvent> {
        match &self.body {
            EventBody::Single(event) => Some(event),
            EventBody::Batch(_) => None,
        }
    }

    /// Returns the batch body for batch events.
    pub fn as_batch(&self) -> Option<&BatchBody> {
        match &self.body {
            EventBody::Batch(batch) => Some(batch),
            EventBody::Single(_) => None,
        }
    }

    /// Returns whether this is a synthetic batch event.
    pub fn is_batch(&self) -> bool {
        matches!(self.body, EventBody::Batch(_))
    }

    /// Returns the ids of the inbound events carried by this envelope.
    pub fn member_ids(&self) -> Vec<&str> {
        match &self.body {
            EventBody::Single(_) => vec![self.event_id.as_str()],
            EventBody::Batch(batch) => batch.events.iter().map(|e| e.event_id.as_str()).collect(),
        }
    }

    /// Renders the payload as JSON.
    ///
    /// Single events render their `data`; batches render
    /// `{batch_type, events, event_count, flush_reason}`.
    pub fn payload(&self) -> Value {
        match &self.body {
            EventBody::Single(event) => Value::Object(event.data.clone()),
            EventBody::Batch(batch) => json!({
                "batch_type": batch.batch_type,
                "events": batch
                    .events
                    .iter()
                    .filter_map(|e| e.as_single())
                    .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
                    .collect::<Vec<_>>(),
                "event_count": batch.event_count(),
                "flush_reason": batch.flush_reason.as_str(),
            }),
        }
    }
}
