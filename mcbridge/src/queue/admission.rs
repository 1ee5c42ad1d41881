//! Sampling and rate limiting applied before an event is queued.

use std::collections::{HashMap, VecDeque};
use tokio::time::Instant;

/// Per-second ceiling for `*:position` events.
pub const POSITION_RATE_CEILING: f64 = 10.0;
/// Per-second ceiling for `*:block_update` events.
pub const BLOCK_UPDATE_RATE_CEILING: f64 = 50.0;
/// Per-second ceiling for every other event type.
pub const DEFAULT_RATE_CEILING: f64 = 100.0;

/// Returns the events-per-second ceiling for an event type.
pub fn rate_ceiling(event_type: &str) -> f64 {
    if event_type.ends_with(":position") {
        POSITION_RATE_CEILING
    } else if event_type.ends_with(":block_update") {
        BLOCK_UPDATE_RATE_CEILING
    } else {
        DEFAULT_RATE_CEILING
    }
}

/// Returns the sampling period for a rate: every `n`th call is kept.
pub fn sampling_period(rate: f64) -> u64 {
    if rate >= 1.0 || rate.is_nan() {
        1
    } else if rate <= 0.0 {
        u64::MAX
    } else {
        (1.0 / rate).round().max(1.0) as u64
    }
}

/// Deterministic sampling counters and per-type rate windows.
///
/// Sampling keeps exactly every `round(1 / rate)`th event of a type. Rate
/// limiting keeps the arrival instants of the last `window_slots` events of
/// a type; once the window is full, an event is dropped when the observed
/// rate over the window reaches the type's ceiling.
///
/// # Examples
///
/// ```rust
/// use mcbridge::queue::Admission;
///
/// let mut admission = Admission::new(100);
/// let kept = (0..100)
///     .filter(|_| admission.should_sample("minecraft:position", 0.25))
///     .count();
/// assert_eq!(kept, 25);
/// ```
#[derive(Debug, Default)]
pub struct Admission {
    window_slots: usize,
    sampling_counters: HashMap<String, u64>,
    rate_windows: HashMap<String, VecDeque<Instant>>,
}

impl Admission {
    /// Creates admission state with the given rate window size.
    pub fn new(window_slots: usize) -> Self {
        Self {
            window_slots: window_slots.max(2),
            sampling_counters: HashMap::new(),
            rate_windows: HashMap::new(),
        }
    }

    /// Returns `true` if this call for `event_type` is sampled.
    ///
    /// Types with a rate of 1.0 or more bypass the counter.
    pub fn should_sample(&mut self, event_type: &str, rate: f64) -> bool {
        if rate >= 1.0 {
            return true;
        }
        let counter = self
            .sampling_counters
            .entry(event_type.to_string())
            .or_insert(0);
        *counter += 1;
        *counter % sampling_period(rate) == 0
    }

    /// Records an arrival at `now` and returns `true` if it is within the ceiling.
    pub fn check_rate_limit(&mut self, event_type: &str, now: Instant) -> bool {
        let window = self
            .rate_windows
            .entry(event_type.to_string())
            .or_default();
        if window.len() >= self.window_slots {
            window.pop_front();
        }
        window.push_back(now);

        if window.len() < self.window_slots {
            return true;
        }

        let (Some(first), Some(last)) = (window.front(), window.back()) else {
            return true;
        };
        let span = last.duration_since(*first).as_secs_f64();
        if span <= 0.0 {
            return false;
        }
        (window.len() as f64 / span) < rate_ceiling(event_type)
    }

    /// Returns the number of sampling decisions made for a type.
    pub fn sampling_counter(&self, event_type: &str) -> u64 {
        self.sampling_counters.get(event_type).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sampling_is_deterministic() {
        let mut admission = Admission::new(100);
        let decisions: Vec<bool> = (0..8)
            .map(|_| admission.should_sample("minecraft:time_change", 0.25))
            .collect();
        assert_eq!(
            decisions,
            vec![false, false, false, true, false, false, false, true]
        );
        assert_eq!(admission.sampling_counter("minecraft:time_change"), 8);

        assert!(admission.should_sample("minecraft:spawn", 1.0));
        assert_eq!(admission.sampling_counter("minecraft:spawn"), 0);
    }

    #[test]
    fn test_sampling_period_rounds() {
        assert_eq!(sampling_period(0.1), 10);
        assert_eq!(sampling_period(0.3), 3);
        assert_eq!(sampling_period(0.6), 2);
        assert_eq!(sampling_period(1.0), 1);
    }

    #[test]
    fn test_rate_ceilings() {
        assert_eq!(rate_ceiling("minecraft:position"), 10.0);
        assert_eq!(rate_ceiling("minecraft:block_update"), 50.0);
        assert_eq!(rate_ceiling("minecraft:chat"), 100.0);
    }

    #[test]
    fn test_rate_limit_allows_slow_arrivals() {
        let mut admission = Admission::new(10);
        let start = Instant::now();
        for i in 0..30 {
            let now = start + Duration::from_millis(200 * i);
            assert!(admission.check_rate_limit("minecraft:position", now));
        }
    }

    #[test]
    fn test_rate_limit_drops_bursts() {
        let mut admission = Admission::new(10);
        let start = Instant::now();
        let results: Vec<bool> = (0..12)
            .map(|i| admission.check_rate_limit("minecraft:position", start + Duration::from_millis(i)))
            .collect();
        assert!(results[..9].iter().all(|ok| *ok));
        assert!(!results[9]);
        assert!(!results[11]);

        // Other types have their own window.
        assert!(admission.check_rate_limit("minecraft:chat", start));
    }
}
