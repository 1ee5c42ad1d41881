//! Event filtering system for mcbridge.
//!
//! Filters decide whether an [`InboundEvent`] should continue through the
//! pipeline. Each predicate implements [`EventFilter`]; a [`ManagedFilter`]
//! wraps it with an enable toggle, pass/reject counters and bypass keywords.
//! Filters compose into a [`FilterChain`] (short-circuit AND) and chains are
//! attached to subscriptions by the [`SubscriptionManager`].

use crate::event::InboundEvent;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

pub mod builtin;
pub mod chain;
pub mod manager;
pub mod presets;

pub use builtin::{
    ContentFilter, CustomFilter, EventTypeFilter, FrequencyFilter, PriorityFilter, SourceFilter,
    TimeWindowFilter,
};
pub use chain::{ChainStats, FilterChain};
pub use manager::{
    DistributionOutcome, ManagerStats, Subscription, SubscriptionHandler, SubscriptionManager,
    SubscriptionStats,
};

/// A predicate over inbound events.
///
/// Implementations hold only their own configuration and state; toggling,
/// statistics and bypass handling live in [`ManagedFilter`].
///
/// # Examples
///
/// ```rust
/// use mcbridge::{EventFilter, InboundEvent};
///
/// struct HasBot;
///
/// impl EventFilter for HasBot {
///     fn should_process(&self, event: &InboundEvent) -> bool {
///         event.bot_id.is_some()
///     }
///
///     fn filter_name(&self) -> &str {
///         "has_bot"
///     }
/// }
///
/// let event = InboundEvent::new("minecraft:chat", "e1").with_bot_id("bot-1");
/// assert!(HasBot.should_process(&event));
/// ```
pub trait EventFilter: Send + Sync + 'static {
    /// Returns whether the event should pass.
    fn should_process(&self, event: &InboundEvent) -> bool;

    /// Returns the name of this filter, used for removal and reporting.
    fn filter_name(&self) -> &str;
}

/// Default keywords that let an event bypass a filter.
pub const DEFAULT_BYPASS_KEYWORDS: [&str; 4] = ["critical", "emergency", "spawn", "death"];

/// Per-filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// A disabled filter passes every event.
    pub enabled: bool,

    /// Log rejected events at debug level.
    pub log_filtered: bool,

    /// Allow events whose type contains a bypass keyword to skip the predicate.
    pub allow_bypass: bool,

    /// Case-insensitive substrings of the event type that trigger a bypass.
    pub bypass_keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_filtered: false,
            allow_bypass: false,
            bypass_keywords: DEFAULT_BYPASS_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl FilterConfig {
    /// Returns a default configuration with bypass enabled.
    pub fn with_bypass() -> Self {
        Self {
            allow_bypass: true,
            ..Self::default()
        }
    }
}

/// Snapshot of a filter's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    /// Events evaluated.
    pub total_processed: u64,
    /// Events that passed, including bypassed and disabled passes.
    pub total_passed: u64,
    /// Events rejected.
    pub total_filtered: u64,
}

/// Report entry for one filter in a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    /// Filter name.
    pub name: String,
    /// Whether the filter is enabled.
    pub enabled: bool,
    /// Counter snapshot.
    pub stats: FilterStats,
}

/// An [`EventFilter`] with toggling, statistics and bypass handling.
pub struct ManagedFilter {
    filter: Box<dyn EventFilter>,
    enabled: AtomicBool,
    log_filtered: bool,
    allow_bypass: bool,
    bypass_keywords: Vec<String>,
    processed: AtomicU64,
    passed: AtomicU64,
    filtered: AtomicU64,
}

impl std::fmt::Debug for ManagedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedFilter")
            .field("name", &self.name())
            .field("enabled", &self.is_enabled())
            .field("allow_bypass", &self.allow_bypass)
            .finish()
    }
}

impl ManagedFilter {
    /// Wraps a filter with the default configuration.
    pub fn new<F: EventFilter>(filter: F) -> Self {
        Self::with_config(filter, FilterConfig::default())
    }

    /// Wraps a filter with an explicit configuration.
    pub fn with_config<F: EventFilter>(filter: F, config: FilterConfig) -> Self {
        Self {
            filter: Box::new(filter),
            enabled: AtomicBool::new(config.enabled),
            log_filtered: config.log_filtered,
            allow_bypass: config.allow_bypass,
            bypass_keywords: config
                .bypass_keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
            processed: AtomicU64::new(0),
            passed: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
        }
    }

    /// Returns the wrapped filter's name.
    pub fn name(&self) -> &str {
        self.filter.filter_name()
    }

    /// Returns whether the filter is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enables or disables the filter.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn bypasses(&self, event: &InboundEvent) -> bool {
        if !self.allow_bypass {
            return false;
        }
        let event_type = event.event_type.to_lowercase();
        self.bypass_keywords
            .iter()
            .any(|keyword| event_type.contains(keyword.as_str()))
    }

    fn record(&self, passed: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if passed {
            self.passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.filtered.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Evaluates the event, honoring the toggle and bypass keywords.
    pub fn filter_event(&self, event: &InboundEvent) -> bool {
        if !self.is_enabled() || self.bypasses(event) {
            self.record(true);
            return true;
        }

        let passed = self.filter.should_process(event);
        self.record(passed);

        if !passed && self.log_filtered {
            debug!(
                filter = %self.name(),
                event_type = %event.event_type,
                event_id = %event.event_id,
                "Event filtered"
            );
        }
        passed
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> FilterStats {
        FilterStats {
            total_processed: self.processed.load(Ordering::Relaxed),
            total_passed: self.passed.load(Ordering::Relaxed),
            total_filtered: self.filtered.load(Ordering::Relaxed),
        }
    }

    /// Returns a named report for chain statistics.
    pub fn report(&self) -> FilterReport {
        FilterReport {
            name: self.name().to_string(),
            enabled: self.is_enabled(),
            stats: self.stats(),
        }
    }
}

impl<F: EventFilter> From<F> for ManagedFilter {
    fn from(filter: F) -> Self {
        ManagedFilter::new(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectAll;

    impl EventFilter for RejectAll {
        fn should_process(&self, _event: &InboundEvent) -> bool {
            false
        }

        fn filter_name(&self) -> &str {
            "reject_all"
        }
    }

    #[test]
    fn test_default_config() {
        let config = FilterConfig::default();
        assert!(config.enabled);
        assert!(!config.log_filtered);
        assert!(!config.allow_bypass);
        assert_eq!(config.bypass_keywords, vec!["critical", "emergency", "spawn", "death"]);
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let config: FilterConfig = serde_json::from_str(r#"{"allow_bypass": true}"#).unwrap();
        assert!(config.allow_bypass);
        assert!(config.enabled);
        assert_eq!(config.bypass_keywords.len(), 4);
    }

    #[test]
    fn test_managed_filter_counts() {
        let filter = ManagedFilter::new(RejectAll);
        let event = InboundEvent::new("minecraft:chat", "1");

        assert!(!filter.filter_event(&event));
        assert!(!filter.filter_event(&event));
        assert_eq!(
            filter.stats(),
            FilterStats {
                total_processed: 2,
                total_passed: 0,
                total_filtered: 2
            }
        );
    }

    #[test]
    fn test_disabled_filter_passes_and_counts() {
        let filter = ManagedFilter::new(RejectAll);
        filter.set_enabled(false);

        assert!(filter.filter_event(&InboundEvent::new("minecraft:chat", "1")));
        assert_eq!(filter.stats().total_passed, 1);
        assert_eq!(filter.stats().total_processed, 1);
    }

    #[test]
    fn test_bypass_keyword_skips_predicate() {
        let filter = ManagedFilter::with_config(RejectAll, FilterConfig::with_bypass());

        assert!(filter.filter_event(&InboundEvent::new("minecraft:spawn", "1")));
        assert!(filter.filter_event(&InboundEvent::new("minecraft:BOT_DEATH", "2")));
        assert!(!filter.filter_event(&InboundEvent::new("minecraft:chat", "3")));

        let stats = filter.stats();
        assert_eq!(stats.total_passed, 2);
        assert_eq!(stats.total_filtered, 1);
    }

    #[test]
    fn test_bypass_requires_opt_in() {
        let filter = ManagedFilter::new(RejectAll);
        assert!(!filter.filter_event(&InboundEvent::new("minecraft:spawn", "1")));
    }

    #[test]
    fn test_report() {
        let filter = ManagedFilter::new(RejectAll);
        let report = filter.report();
        assert_eq!(report.name, "reject_all");
        assert!(report.enabled);
        assert_eq!(report.stats, FilterStats::default());
    }
}
