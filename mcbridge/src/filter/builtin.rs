//! Built-in filter predicates.

use crate::error::{FilterError, FilterResult};
use crate::event::InboundEvent;
use crate::filter::EventFilter;
use chrono::{Datelike, FixedOffset, Offset, TimeZone, Timelike, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::time::Instant;
use tracing::error;

fn is_glob(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Compiles a `*`/`?` glob into a regex anchored at both ends.
fn glob_to_regex(pattern: &str) -> FilterResult<Regex> {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).map_err(|e| FilterError::invalid_pattern(pattern, e))
}

fn split_patterns<I, S>(entries: I) -> FilterResult<(HashSet<String>, Vec<Regex>)>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut exact = HashSet::new();
    let mut patterns = Vec::new();
    for entry in entries {
        let entry = entry.into();
        if is_glob(&entry) {
            patterns.push(glob_to_regex(&entry)?);
        }
        exact.insert(entry);
    }
    Ok((exact, patterns))
}

/// Filters by event type using exact names and `*`/`?` globs.
///
/// Blocked entries are checked first and any match rejects. With no allowed
/// entries everything else passes; otherwise the type must match one.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{EventFilter, EventTypeFilter, InboundEvent};
///
/// let filter = EventTypeFilter::new(["minecraft:*"], ["minecraft:position"]).unwrap();
///
/// assert!(filter.should_process(&InboundEvent::new("minecraft:chat", "1")));
/// assert!(!filter.should_process(&InboundEvent::new("minecraft:position", "2")));
/// assert!(!filter.should_process(&InboundEvent::new("other:chat", "3")));
/// ```
#[derive(Debug, Clone)]
pub struct EventTypeFilter {
    allowed: HashSet<String>,
    allowed_patterns: Vec<Regex>,
    blocked: HashSet<String>,
    blocked_patterns: Vec<Regex>,
}

impl EventTypeFilter {
    /// Creates a filter from allowed and blocked entries.
    pub fn new<A, B, S, T>(allowed: A, blocked: B) -> FilterResult<Self>
    where
        A: IntoIterator<Item = S>,
        B: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let (allowed, allowed_patterns) = split_patterns(allowed)?;
        let (blocked, blocked_patterns) = split_patterns(blocked)?;
        Ok(Self {
            allowed,
            allowed_patterns,
            blocked,
            blocked_patterns,
        })
    }

    /// Creates a filter passing only the given entries.
    pub fn allow<I, S>(allowed: I) -> FilterResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(allowed, std::iter::empty::<String>())
    }

    /// Creates a filter rejecting only the given entries.
    pub fn block<I, S>(blocked: I) -> FilterResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(std::iter::empty::<String>(), blocked)
    }
}

impl EventFilter for EventTypeFilter {
    fn should_process(&self, event: &InboundEvent) -> bool {
        let event_type = event.event_type.as_str();

        if self.blocked.contains(event_type)
            || self.blocked_patterns.iter().any(|p| p.is_match(event_type))
        {
            return false;
        }

        if self.allowed.is_empty() && self.allowed_patterns.is_empty() {
            return true;
        }

        self.allowed.contains(event_type)
            || self.allowed_patterns.iter().any(|p| p.is_match(event_type))
    }

    fn filter_name(&self) -> &str {
        "event_type"
    }
}

/// Passes events whose priority lies in `[min, max]`.
///
/// Events without an explicit priority are treated as priority 0.
#[derive(Debug, Clone, Copy)]
pub struct PriorityFilter {
    min_priority: i32,
    max_priority: i32,
}

impl PriorityFilter {
    /// Creates a filter for the inclusive range `[min, max]`.
    pub fn new(min_priority: i32, max_priority: i32) -> Self {
        Self {
            min_priority,
            max_priority,
        }
    }

    /// Creates a filter with a minimum and the default maximum of 100.
    pub fn at_least(min_priority: i32) -> Self {
        Self::new(min_priority, 100)
    }
}

impl Default for PriorityFilter {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

impl EventFilter for PriorityFilter {
    fn should_process(&self, event: &InboundEvent) -> bool {
        let priority = event.priority_or_default().value();
        self.min_priority <= priority && priority <= self.max_priority
    }

    fn filter_name(&self) -> &str {
        "priority"
    }
}

/// Per-type sliding window rate limit.
///
/// An event is rejected when its type already has
/// `max_events_per_second * window` accepted events inside the window.
#[derive(Debug)]
pub struct FrequencyFilter {
    max_events_per_second: f64,
    window: Duration,
    seen: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl FrequencyFilter {
    /// Creates a filter with the given rate and window.
    pub fn new(max_events_per_second: f64, window: Duration) -> Self {
        Self {
            max_events_per_second,
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a filter with the given rate and the default 60 second window.
    pub fn per_second(max_events_per_second: f64) -> Self {
        Self::new(max_events_per_second, Duration::from_secs(60))
    }

    fn capacity(&self) -> f64 {
        self.max_events_per_second * self.window.as_secs_f64()
    }
}

impl Default for FrequencyFilter {
    fn default() -> Self {
        Self::per_second(10.0)
    }
}

impl EventFilter for FrequencyFilter {
    fn should_process(&self, event: &InboundEvent) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock();
        let times = seen.entry(event.event_type.clone()).or_default();

        while let Some(&oldest) = times.front() {
            if now.duration_since(oldest) >= self.window {
                times.pop_front();
            } else {
                break;
            }
        }

        if times.len() as f64 >= self.capacity() {
            return false;
        }
        times.push_back(now);
        true
    }

    fn filter_name(&self) -> &str {
        "frequency"
    }
}

/// Requires payload fields and optionally matches their values.
///
/// Patterns are anchored at the start of the stringified value.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    required_fields: Vec<String>,
    field_patterns: Vec<(String, Regex)>,
}

impl ContentFilter {
    /// Creates a filter from required fields and `(field, regex)` pairs.
    pub fn new<R, P, S, F, Q>(required_fields: R, field_patterns: P) -> FilterResult<Self>
    where
        R: IntoIterator<Item = S>,
        P: IntoIterator<Item = (F, Q)>,
        S: Into<String>,
        F: Into<String>,
        Q: AsRef<str>,
    {
        let field_patterns = field_patterns
            .into_iter()
            .map(|(field, pattern)| {
                let pattern = pattern.as_ref();
                Regex::new(&format!("^(?:{})", pattern))
                    .map(|regex| (field.into(), regex))
                    .map_err(|e| FilterError::invalid_pattern(pattern, e))
            })
            .collect::<FilterResult<Vec<_>>>()?;

        Ok(Self {
            required_fields: required_fields.into_iter().map(Into::into).collect(),
            field_patterns,
        })
    }
}

impl EventFilter for ContentFilter {
    fn should_process(&self, event: &InboundEvent) -> bool {
        if !self
            .required_fields
            .iter()
            .all(|field| event.data.contains_key(field))
        {
            return false;
        }

        self.field_patterns.iter().all(|(field, pattern)| {
            match event.data.get(field) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => pattern.is_match(s),
                Some(other) => pattern.is_match(&other.to_string()),
            }
        })
    }

    fn filter_name(&self) -> &str {
        "content"
    }
}

/// Restricts events to allowed bots and dimensions.
///
/// Empty allow-sets impose no restriction. Events without a dimension pass
/// the dimension check.
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    allowed_bots: HashSet<String>,
    allowed_dimensions: HashSet<String>,
}

impl SourceFilter {
    /// Creates a filter from allowed bot ids and dimensions.
    pub fn new<B, D, S, T>(allowed_bots: B, allowed_dimensions: D) -> Self
    where
        B: IntoIterator<Item = S>,
        D: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            allowed_bots: allowed_bots.into_iter().map(Into::into).collect(),
            allowed_dimensions: allowed_dimensions.into_iter().map(Into::into).collect(),
        }
    }
}

impl EventFilter for SourceFilter {
    fn should_process(&self, event: &InboundEvent) -> bool {
        if !self.allowed_bots.is_empty() {
            let bot_id = event.bot_id.as_deref().unwrap_or("");
            if !self.allowed_bots.contains(bot_id) {
                return false;
            }
        }

        if !self.allowed_dimensions.is_empty() {
            if let Some(dimension) = event.dimension().filter(|d| !d.is_empty()) {
                if !self.allowed_dimensions.contains(dimension) {
                    return false;
                }
            }
        }

        true
    }

    fn filter_name(&self) -> &str {
        "source"
    }
}

/// Restricts events to weekdays and an hour-of-day range `[start, end)`.
///
/// Weekdays are numbered from 0 (Monday) to 6 (Sunday). Times are evaluated
/// in UTC unless another offset is configured. Events without a positive
/// timestamp always pass.
#[derive(Debug, Clone)]
pub struct TimeWindowFilter {
    start_hour: u32,
    end_hour: u32,
    allowed_days: HashSet<u32>,
    offset: FixedOffset,
}

impl TimeWindowFilter {
    /// Creates a filter for `[start_hour, end_hour)` on the given weekdays.
    ///
    /// An empty weekday list allows every day.
    pub fn new<I: IntoIterator<Item = u32>>(start_hour: u32, end_hour: u32, allowed_days: I) -> Self {
        let mut allowed_days: HashSet<u32> = allowed_days.into_iter().collect();
        if allowed_days.is_empty() {
            allowed_days = (0..7).collect();
        }
        Self {
            start_hour,
            end_hour,
            allowed_days,
            offset: Utc.fix(),
        }
    }

    /// Evaluates times in the given fixed offset instead of UTC.
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }
}

impl Default for TimeWindowFilter {
    fn default() -> Self {
        Self::new(0, 24, 0..7)
    }
}

impl EventFilter for TimeWindowFilter {
    fn should_process(&self, event: &InboundEvent) -> bool {
        let Some(millis) = event.time_ms().filter(|t| *t > 0) else {
            return true;
        };
        let Some(moment) = Utc.timestamp_millis_opt(millis).single() else {
            return true;
        };
        let local = moment.with_timezone(&self.offset);

        if !self
            .allowed_days
            .contains(&local.weekday().num_days_from_monday())
        {
            return false;
        }
        self.start_hour <= local.hour() && local.hour() < self.end_hour
    }

    fn filter_name(&self) -> &str {
        "time_window"
    }
}

type Predicate = Box<dyn Fn(&InboundEvent) -> Result<bool, String> + Send + Sync>;

/// Wraps an arbitrary predicate.
///
/// A predicate that errors or panics lets the event through and logs the
/// failure.
pub struct CustomFilter {
    name: String,
    predicate: Predicate,
}

impl std::fmt::Debug for CustomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomFilter")
            .field("name", &self.name)
            .finish()
    }
}

impl CustomFilter {
    /// Creates a filter from an infallible predicate.
    pub fn new<S, F>(name: S, predicate: F) -> Self
    where
        S: Into<String>,
        F: Fn(&InboundEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(move |event| Ok(predicate(event))),
        }
    }

    /// Creates a filter from a fallible predicate.
    pub fn fallible<S, F, E>(name: S, predicate: F) -> Self
    where
        S: Into<String>,
        F: Fn(&InboundEvent) -> Result<bool, E> + Send + Sync + 'static,
        E: std::fmt::Display,
    {
        Self {
            name: name.into(),
            predicate: Box::new(move |event| predicate(event).map_err(|e| e.to_string())),
        }
    }
}

impl EventFilter for CustomFilter {
    fn should_process(&self, event: &InboundEvent) -> bool {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.predicate)(event)))
            .unwrap_or_else(|_| Err("predicate panicked".to_string()));

        match outcome {
            Ok(passed) => passed,
            Err(message) => {
                error!(filter_name = %self.name, error = %message, "Custom filter error");
                true
            }
        }
    }

    fn filter_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;
    use serde_json::json;

    fn event(event_type: &str) -> InboundEvent {
        InboundEvent::new(event_type, "id")
    }

    #[test]
    fn test_glob_is_fully_anchored() {
        let regex = glob_to_regex("minecraft:entity_?").unwrap();
        assert!(regex.is_match("minecraft:entity_a"));
        assert!(!regex.is_match("minecraft:entity_ab"));
        assert!(!regex.is_match("xminecraft:entity_a"));

        let regex = glob_to_regex("a.b*").unwrap();
        assert!(regex.is_match("a.bcd"));
        assert!(!regex.is_match("axbcd"));
    }

    #[test]
    fn test_type_filter_blocks_before_allowing() {
        let filter =
            EventTypeFilter::new(["minecraft:chat", "minecraft:block_*"], ["minecraft:block_update"])
                .unwrap();

        assert!(filter.should_process(&event("minecraft:chat")));
        assert!(filter.should_process(&event("minecraft:block_break")));
        assert!(!filter.should_process(&event("minecraft:block_update")));
        assert!(!filter.should_process(&event("minecraft:health")));
    }

    #[test]
    fn test_type_filter_without_allow_list() {
        let filter = EventTypeFilter::block(["minecraft:position"]).unwrap();
        assert!(filter.should_process(&event("anything")));
        assert!(!filter.should_process(&event("minecraft:position")));
    }

    #[test]
    fn test_priority_filter_is_inclusive() {
        let filter = PriorityFilter::new(10, 50);
        assert!(filter.should_process(&event("a").with_priority(Priority::new(10))));
        assert!(filter.should_process(&event("a").with_priority(Priority::new(50))));
        assert!(!filter.should_process(&event("a").with_priority(Priority::new(51))));
        assert!(!filter.should_process(&event("a")));

        assert!(PriorityFilter::default().should_process(&event("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frequency_filter_window() {
        let filter = FrequencyFilter::new(1.0, Duration::from_secs(2));

        assert!(filter.should_process(&event("a")));
        assert!(filter.should_process(&event("a")));
        assert!(!filter.should_process(&event("a")));
        assert!(filter.should_process(&event("b")));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(filter.should_process(&event("a")));
    }

    #[test]
    fn test_content_filter() {
        let filter = ContentFilter::new(["username"], [("message", "hello")]).unwrap();

        let matching = event("minecraft:chat")
            .with_field("username", json!("alex"))
            .with_field("message", json!("hello world"));
        assert!(filter.should_process(&matching));

        let wrong_text = event("minecraft:chat")
            .with_field("username", json!("alex"))
            .with_field("message", json!("say hello"));
        assert!(!filter.should_process(&wrong_text));

        let missing = event("minecraft:chat").with_field("message", json!("hello"));
        assert!(!filter.should_process(&missing));
    }

    #[test]
    fn test_content_filter_stringifies_numbers() {
        let filter = ContentFilter::new(Vec::<String>::new(), [("slot", r"\d+$")]).unwrap();
        assert!(filter.should_process(&event("x").with_field("slot", json!(36))));
        assert!(!filter.should_process(&event("x").with_field("slot", json!("a1"))));
        assert!(!filter.should_process(&event("x")));
    }

    #[test]
    fn test_content_filter_rejects_bad_regex() {
        let result = ContentFilter::new(Vec::<String>::new(), [("a", "(")]);
        assert!(matches!(result, Err(FilterError::InvalidPattern { .. })));
    }

    #[test]
    fn test_source_filter() {
        let filter = SourceFilter::new(["bot-1"], ["overworld"]);

        let ok = event("x")
            .with_bot_id("bot-1")
            .with_metadata("dimension", json!("overworld"));
        assert!(filter.should_process(&ok));

        let no_dimension = event("x").with_bot_id("bot-1");
        assert!(filter.should_process(&no_dimension));

        let wrong_dimension = event("x")
            .with_bot_id("bot-1")
            .with_metadata("dimension", json!("nether"));
        assert!(!filter.should_process(&wrong_dimension));

        assert!(!filter.should_process(&event("x")));
        assert!(SourceFilter::default().should_process(&event("x")));
    }

    #[test]
    fn test_time_window_filter() {
        // 2024-01-01T10:30:00Z was a Monday.
        let monday_morning = 1_704_105_000_000;
        let filter = TimeWindowFilter::new(9, 17, [0, 1, 2, 3, 4]);

        assert!(filter.should_process(&event("x").with_timestamp(monday_morning)));
        assert!(!filter.should_process(
            &event("x").with_timestamp(monday_morning + 8 * 3_600_000)
        ));
        // Saturday.
        assert!(!filter.should_process(
            &event("x").with_timestamp(monday_morning + 5 * 86_400_000)
        ));
        assert!(filter.should_process(&event("x")));
        assert!(filter.should_process(&event("x").with_timestamp(-1)));
    }

    #[test]
    fn test_time_window_offset() {
        let monday_morning = 1_704_105_000_000;
        let filter = TimeWindowFilter::new(9, 17, 0..7)
            .with_offset(FixedOffset::east_opt(8 * 3600).unwrap());
        // 18:30 at UTC+8.
        assert!(!filter.should_process(&event("x").with_timestamp(monday_morning)));
    }

    #[test]
    fn test_custom_filter_fails_open() {
        let filter = CustomFilter::fallible("strict", |_| Err::<bool, _>("boom"));
        assert!(filter.should_process(&event("x")));

        let panicking = CustomFilter::new("panics", |_| panic!("predicate bug"));
        assert!(panicking.should_process(&event("x")));

        let rejecting = CustomFilter::new("no_chat", |e| e.short_type() != "chat");
        assert!(!rejecting.should_process(&event("minecraft:chat")));
        assert_eq!(rejecting.filter_name(), "no_chat");
    }
}
