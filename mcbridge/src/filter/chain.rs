//! Ordered filter chains.

use crate::event::InboundEvent;
use crate::filter::{FilterReport, ManagedFilter};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Aggregate counters of a [`FilterChain`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    /// Events evaluated by the chain.
    pub total_events: u64,
    /// Events every filter passed.
    pub events_passed: u64,
    /// Events some filter rejected.
    pub events_filtered: u64,
    /// Number of filters in the chain.
    pub filter_count: usize,
    /// Per-filter reports in chain order.
    pub filters: Vec<FilterReport>,
}

/// An ordered list of filters combined with short-circuit AND.
///
/// Filters are evaluated in insertion order and evaluation stops at the first
/// rejection, so later filters do not see (or count) that event.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{EventTypeFilter, FilterChain, InboundEvent, PriorityFilter};
///
/// let chain = FilterChain::new();
/// chain.add_filter(EventTypeFilter::allow(["minecraft:chat"]).unwrap());
/// chain.add_filter(PriorityFilter::at_least(10));
///
/// let event = InboundEvent::new("minecraft:chat", "e1")
///     .with_priority(mcbridge::Priority::new(50));
/// assert!(chain.apply(&event));
/// assert_eq!(chain.stats().events_passed, 1);
/// ```
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: RwLock<Vec<Arc<ManagedFilter>>>,
    total_events: AtomicU64,
    events_passed: AtomicU64,
    events_filtered: AtomicU64,
}

impl FilterChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter to the end of the chain.
    pub fn add_filter<F: Into<ManagedFilter>>(&self, filter: F) {
        self.filters.write().push(Arc::new(filter.into()));
    }

    /// Removes every filter with the given name.
    ///
    /// Returns `true` if at least one filter was removed.
    pub fn remove_filter(&self, name: &str) -> bool {
        let mut filters = self.filters.write();
        let before = filters.len();
        filters.retain(|f| f.name() != name);
        filters.len() != before
    }

    /// Returns the first filter with the given name.
    pub fn get_filter(&self, name: &str) -> Option<Arc<ManagedFilter>> {
        self.filters.read().iter().find(|f| f.name() == name).cloned()
    }

    /// Removes every filter.
    pub fn clear(&self) {
        self.filters.write().clear();
    }

    /// Returns the number of filters.
    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    /// Returns `true` if the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }

    /// Evaluates the event against every filter in order.
    ///
    /// An empty chain passes everything.
    pub fn apply(&self, event: &InboundEvent) -> bool {
        // Clone the list so predicates run without holding the lock.
        let filters: Vec<Arc<ManagedFilter>> = self.filters.read().clone();

        self.total_events.fetch_add(1, Ordering::Relaxed);
        let passed = filters.iter().all(|filter| filter.filter_event(event));

        if passed {
            self.events_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.events_filtered.fetch_add(1, Ordering::Relaxed);
        }
        passed
    }

    /// Returns per-filter reports in chain order.
    pub fn filter_reports(&self) -> Vec<FilterReport> {
        self.filters.read().iter().map(|f| f.report()).collect()
    }

    /// Returns a snapshot of the chain's counters.
    pub fn stats(&self) -> ChainStats {
        let filters = self.filter_reports();
        ChainStats {
            total_events: self.total_events.load(Ordering::Relaxed),
            events_passed: self.events_passed.load(Ordering::Relaxed),
            events_filtered: self.events_filtered.load(Ordering::Relaxed),
            filter_count: filters.len(),
            filters,
        }
    }
}
