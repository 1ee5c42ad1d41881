//! Priority values and the bounded priority heap used by the event queue.
//!
//! Higher priorities are more urgent. Within one priority level, entries are
//! ordered by their enqueue instant (earliest first), with a monotonically
//! increasing sequence number breaking exact timestamp ties.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::time::Instant;

/// Priority of an event.
///
/// Priorities are plain integers where higher values indicate higher
/// urgency. They have no fixed bound, but registry defaults stay within
/// `0..=100` and synthetic batch events add [`Priority::BATCH_BOOST`].
///
/// # Examples
///
/// ```rust
/// use mcbridge::Priority;
///
/// let spawn = Priority::new(100);
/// let position = Priority::new(5);
///
/// assert!(spawn > position);
/// assert!(spawn.is_higher_than(position));
/// assert_eq!(position.boosted(Priority::BATCH_BOOST).value(), 15);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(i32);

impl Priority {
    /// Lifecycle-critical events such as spawn and bot death.
    pub const CRITICAL: Priority = Priority(100);

    /// Events that should be processed quickly, such as health updates.
    pub const HIGH: Priority = Priority(75);

    /// Regular events such as chat.
    pub const NORMAL: Priority = Priority(50);

    /// High-frequency, low-value events such as movement.
    pub const LOW: Priority = Priority(5);

    /// Priority assigned to unknown event types.
    pub const NONE: Priority = Priority(0);

    /// Boost applied to synthetic batch events over their most urgent member.
    pub const BATCH_BOOST: i32 = 10;

    /// Creates a priority from its numeric value.
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the numeric value of this priority.
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Returns this priority raised by `amount`, saturating at the bounds.
    pub const fn boosted(self, amount: i32) -> Self {
        Self(self.0.saturating_add(amount))
    }

    /// Returns whether this priority is higher than another priority.
    pub const fn is_higher_than(self, other: Priority) -> bool {
        self.0 > other.0
    }

    /// Returns whether this priority is lower than another priority.
    pub const fn is_lower_than(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}

impl From<Priority> for i32 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordering key of a heap entry.
///
/// A key compares as greater when it is more urgent: higher priority first,
/// then earlier enqueue instant, then lower sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapKey {
    priority: Priority,
    enqueued_at: Instant,
    sequence: u64,
}

impl HeapKey {
    /// Returns the priority component of this key.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the enqueue instant component of this key.
    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Result of pushing into a bounded [`PriorityHeap`].
#[derive(Debug)]
pub enum PushOutcome<T> {
    /// The item was admitted without displacing anything.
    Admitted,
    /// The item was admitted and the least urgent entry was evicted.
    Evicted(T),
    /// The heap was full and the item was not more urgent than its minimum.
    Rejected(T),
}

impl<T> PushOutcome<T> {
    /// Returns whether the pushed item ended up in the heap.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, PushOutcome::Rejected(_))
    }
}

/// A capacity-bounded max-priority heap with priority-aware eviction.
///
/// When full, a new item is admitted only if its priority is strictly
/// higher than the least urgent entry, which is then evicted.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{Priority, PriorityHeap, PushOutcome};
/// use tokio::time::Instant;
///
/// let mut heap = PriorityHeap::with_capacity(2);
/// let now = Instant::now();
///
/// heap.push("low", Priority::new(1), now);
/// heap.push("high", Priority::new(9), now);
///
/// // Equal priority to the minimum: rejected.
/// assert!(matches!(heap.push("also low", Priority::new(1), now), PushOutcome::Rejected(_)));
/// // Higher than the minimum: admitted, minimum evicted.
/// assert!(matches!(heap.push("mid", Priority::new(5), now), PushOutcome::Evicted("low")));
///
/// assert_eq!(heap.pop(), Some("high"));
/// assert_eq!(heap.pop(), Some("mid"));
/// assert_eq!(heap.pop(), None);
/// ```
#[derive(Debug)]
pub struct PriorityHeap<T> {
    entries: BTreeMap<HeapKey, T>,
    capacity: usize,
    next_sequence: u64,
}

impl<T> PriorityHeap<T> {
    /// Creates an empty heap holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
            next_sequence: 0,
        }
    }

    /// Pushes an item, applying the capacity policy.
    pub fn push(&mut self, item: T, priority: Priority, enqueued_at: Instant) -> PushOutcome<T> {
        let key = HeapKey {
            priority,
            enqueued_at,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        if self.entries.len() < self.capacity {
            self.entries.insert(key, item);
            return PushOutcome::Admitted;
        }

        match self.entries.first_key_value() {
            Some((lowest, _)) if priority.is_higher_than(lowest.priority) => {
                let evicted = self.entries.pop_first().map(|(_, item)| item);
                self.entries.insert(key, item);
                match evicted {
                    Some(evicted) => PushOutcome::Evicted(evicted),
                    None => PushOutcome::Admitted,
                }
            }
            _ => PushOutcome::Rejected(item),
        }
    }

    /// Removes and returns the most urgent entry.
    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop_last().map(|(_, item)| item)
    }

    /// Returns the key of the most urgent entry without removing it.
    pub fn peek_key(&self) -> Option<&HeapKey> {
        self.entries.last_key_value().map(|(key, _)| key)
    }

    /// Returns the priority of the least urgent entry.
    pub fn lowest_priority(&self) -> Option<Priority> {
        self.entries.first_key_value().map(|(key, _)| key.priority)
    }

    /// Returns the number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes every entry, returning them from most to least urgent.
    pub fn drain(&mut self) -> Vec<T> {
        let entries = std::mem::take(&mut self.entries);
        entries.into_values().rev().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::CRITICAL > Priority::HIGH);
        assert!(Priority::HIGH > Priority::NORMAL);
        assert!(Priority::NORMAL > Priority::LOW);
        assert!(Priority::LOW > Priority::NONE);
        assert!(Priority::new(-5) < Priority::NONE);
    }

    #[test]
    fn test_priority_boost_saturates() {
        assert_eq!(Priority::new(90).boosted(10), Priority::new(100));
        assert_eq!(Priority::new(i32::MAX).boosted(10).value(), i32::MAX);
    }

    #[test]
    fn test_priority_conversions() {
        let priority: Priority = 42.into();
        assert_eq!(priority.value(), 42);

        let value: i32 = Priority::CRITICAL.into();
        assert_eq!(value, 100);
        assert_eq!(format!("{}", Priority::HIGH), "75");
    }

    #[test]
    fn test_priority_serde_is_transparent() {
        let json = serde_json::to_string(&Priority::new(30)).unwrap();
        assert_eq!(json, "30");
        let parsed: Priority = serde_json::from_str("75").unwrap();
        assert_eq!(parsed, Priority::HIGH);
    }

    #[test]
    fn test_heap_orders_by_priority() {
        let mut heap = PriorityHeap::with_capacity(10);
        let now = Instant::now();

        heap.push("p2", Priority::new(50), now);
        heap.push("p3", Priority::new(10), now);
        heap.push("p1", Priority::new(90), now);

        assert_eq!(heap.pop(), Some("p1"));
        assert_eq!(heap.pop(), Some("p2"));
        assert_eq!(heap.pop(), Some("p3"));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_heap_is_fifo_within_priority() {
        let mut heap = PriorityHeap::with_capacity(10);
        let start = Instant::now();

        heap.push("second", Priority::NORMAL, start + Duration::from_millis(5));
        heap.push("first", Priority::NORMAL, start);
        heap.push("third", Priority::NORMAL, start + Duration::from_millis(9));

        assert_eq!(heap.pop(), Some("first"));
        assert_eq!(heap.pop(), Some("second"));
        assert_eq!(heap.pop(), Some("third"));
    }

    #[test]
    fn test_heap_sequence_breaks_timestamp_ties() {
        let mut heap = PriorityHeap::with_capacity(10);
        let now = Instant::now();

        for name in ["a", "b", "c", "d"] {
            heap.push(name, Priority::NORMAL, now);
        }

        assert_eq!(heap.drain(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_heap_evicts_only_for_strictly_higher_priority() {
        let mut heap = PriorityHeap::with_capacity(2);
        let now = Instant::now();

        assert!(heap.push("a", Priority::new(10), now).is_admitted());
        assert!(heap.push("b", Priority::new(20), now).is_admitted());
        assert_eq!(heap.lowest_priority(), Some(Priority::new(10)));

        match heap.push("c", Priority::new(10), now) {
            PushOutcome::Rejected(item) => assert_eq!(item, "c"),
            other => panic!("Expected rejection, got {:?}", other),
        }
        assert_eq!(heap.len(), 2);

        match heap.push("d", Priority::new(15), now) {
            PushOutcome::Evicted(item) => assert_eq!(item, "a"),
            other => panic!("Expected eviction, got {:?}", other),
        }
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.lowest_priority(), Some(Priority::new(15)));
        assert_eq!(heap.peek_key().map(|key| key.priority()), Some(Priority::new(20)));
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut heap = PriorityHeap::with_capacity(0);
        let outcome = heap.push("x", Priority::CRITICAL, Instant::now());
        assert!(!outcome.is_admitted());
        assert_eq!(heap.capacity(), 0);
    }
}
