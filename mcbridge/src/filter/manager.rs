//! Subscriptions and the manager that distributes events to them.
//!
//! Every event first passes the manager's global [`FilterChain`]. Events that
//! survive are offered concurrently to each active [`Subscription`], which
//! applies its own chain before invoking its handler. Handler errors and
//! panics are counted and logged per subscription and never reach the caller
//! as a failure of distribution.

use crate::error::{FilterError, FilterResult, HandlerError, HandlerResult};
use crate::event::InboundEvent;
use crate::filter::{ChainStats, FilterChain, ManagedFilter};
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Type-erased asynchronous subscription handler.
pub type SubscriptionHandler =
    Arc<dyn Fn(InboundEvent) -> BoxFuture<'static, HandlerResult<()>> + Send + Sync>;

/// Counters and filter statistics for one subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionStats {
    /// Subscription id.
    pub subscription_id: String,
    /// Whether the subscription currently receives events.
    pub active: bool,
    /// Events offered while active.
    pub events_received: u64,
    /// Events that passed the subscription's chain.
    pub events_processed: u64,
    /// Handler invocations that failed or panicked.
    pub handler_errors: u64,
    /// Statistics of the subscription's own chain.
    pub filter_chain: ChainStats,
}

/// A handler with its own filter chain.
pub struct Subscription {
    id: String,
    chain: FilterChain,
    handler: SubscriptionHandler,
    active: AtomicBool,
    events_received: AtomicU64,
    events_processed: AtomicU64,
    handler_errors: AtomicU64,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("filters", &self.chain.len())
            .finish()
    }
}

impl Subscription {
    /// Creates an active subscription with an empty chain.
    pub fn new<S, F, Fut>(id: S, handler: F) -> Self
    where
        S: Into<String>,
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        let handler: SubscriptionHandler = Arc::new(move |event| handler(event).boxed());
        Self::from_handler(id, handler)
    }

    /// Creates an active subscription from an already type-erased handler.
    pub fn from_handler<S: Into<String>>(id: S, handler: SubscriptionHandler) -> Self {
        Self {
            id: id.into(),
            chain: FilterChain::new(),
            handler,
            active: AtomicBool::new(true),
            events_received: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
        }
    }

    /// Returns the subscription id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns whether the subscription receives events.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Pauses or resumes the subscription.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Appends a filter to the subscription's chain.
    pub fn add_filter<F: Into<ManagedFilter>>(&self, filter: F) {
        self.chain.add_filter(filter);
    }

    /// Returns the subscription's chain.
    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Offers an event to this subscription.
    ///
    /// Returns `Ok(true)` if the handler ran successfully, `Ok(false)` if the
    /// subscription is inactive or its chain rejected the event, and the
    /// handler's error (already counted and logged) otherwise.
    pub async fn process_event(&self, event: InboundEvent) -> HandlerResult<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        self.events_received.fetch_add(1, Ordering::Relaxed);

        if !self.chain.apply(&event) {
            return Ok(false);
        }
        self.events_processed.fetch_add(1, Ordering::Relaxed);

        let handler = Arc::clone(&self.handler);
        let outcome = AssertUnwindSafe(async move { handler(event).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::panic(panic_message(&*panic))));

        match outcome {
            Ok(()) => Ok(true),
            Err(e) => {
                self.handler_errors.fetch_add(1, Ordering::Relaxed);
                error!(subscription_id = %self.id, error = %e, "Subscription handler error");
                Err(e)
            }
        }
    }

    /// Returns a snapshot of the subscription's counters.
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            subscription_id: self.id.clone(),
            active: self.is_active(),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            filter_chain: self.chain.stats(),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result of distributing one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionOutcome {
    /// Whether the global chain passed the event.
    pub passed_global: bool,
    /// Subscriptions whose handler ran successfully.
    pub delivered: usize,
    /// `(subscription_id, error)` for each failed handler.
    pub failures: Vec<(String, String)>,
}

/// Manager-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Subscriptions ever created.
    pub total_subscriptions: u64,
    /// Registered subscriptions currently active.
    pub active_subscriptions: usize,
    /// Events offered to [`SubscriptionManager::distribute`] or
    /// [`SubscriptionManager::deliver`].
    pub events_distributed: u64,
    /// Global chain statistics.
    pub global_filters: ChainStats,
    /// Per-subscription statistics keyed by id.
    pub subscriptions: BTreeMap<String, SubscriptionStats>,
}

/// Owns the global chain and the set of subscriptions.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{EventTypeFilter, InboundEvent, SubscriptionManager};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let manager = SubscriptionManager::new();
/// manager.add_global_filter(EventTypeFilter::block(["minecraft:position"]).unwrap());
///
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
/// manager
///     .create_subscription("ui", move |_event| {
///         let counter = Arc::clone(&counter);
///         async move {
///             counter.fetch_add(1, Ordering::SeqCst);
///             Ok(())
///         }
///     })
///     .unwrap();
///
/// manager.distribute(&InboundEvent::new("minecraft:chat", "1")).await;
/// manager.distribute(&InboundEvent::new("minecraft:position", "2")).await;
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    global: Arc<FilterChain>,
    subscriptions: RwLock<HashMap<String, Arc<Subscription>>>,
    total_subscriptions: AtomicU64,
    events_distributed: AtomicU64,
}

impl SubscriptionManager {
    /// Creates a manager with no filters or subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager whose global chain is shared with other components.
    pub fn with_global_chain(global: Arc<FilterChain>) -> Self {
        Self {
            global,
            ..Self::default()
        }
    }

    /// Appends a filter to the global chain.
    pub fn add_global_filter<F: Into<ManagedFilter>>(&self, filter: F) {
        self.global.add_filter(filter);
    }

    /// Returns the global chain.
    pub fn global_filters(&self) -> &FilterChain {
        &self.global
    }

    /// Returns a shared handle to the global chain.
    pub fn shared_global_filters(&self) -> Arc<FilterChain> {
        Arc::clone(&self.global)
    }

    /// Registers a new subscription.
    ///
    /// Fails if a subscription with the same id already exists.
    pub fn create_subscription<S, F, Fut>(&self, id: S, handler: F) -> FilterResult<Arc<Subscription>>
    where
        S: Into<String>,
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        self.insert(Subscription::new(id, handler))
    }

    /// Registers an already constructed subscription.
    pub fn insert(&self, subscription: Subscription) -> FilterResult<Arc<Subscription>> {
        let mut subscriptions = self.subscriptions.write();
        if subscriptions.contains_key(subscription.id()) {
            return Err(FilterError::duplicate_subscription(subscription.id()));
        }

        let subscription = Arc::new(subscription);
        subscriptions.insert(subscription.id().to_string(), Arc::clone(&subscription));
        self.total_subscriptions.fetch_add(1, Ordering::Relaxed);

        info!(
            subscription_id = %subscription.id(),
            total_subscriptions = subscriptions.len(),
            "Created event subscription"
        );
        Ok(subscription)
    }

    /// Removes a subscription.
    pub fn remove_subscription(&self, id: &str) -> FilterResult<()> {
        if self.subscriptions.write().remove(id).is_none() {
            return Err(FilterError::subscription_not_found(id));
        }
        info!(subscription_id = %id, "Removed event subscription");
        Ok(())
    }

    /// Looks up a subscription by id.
    pub fn subscription(&self, id: &str) -> Option<Arc<Subscription>> {
        self.subscriptions.read().get(id).cloned()
    }

    /// Returns the number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Applies the global chain and, on pass, offers the event to every active
    /// subscription concurrently.
    pub async fn distribute(&self, event: &InboundEvent) -> DistributionOutcome {
        self.events_distributed.fetch_add(1, Ordering::Relaxed);

        if !self.global.apply(event) {
            debug!(event_id = %event.event_id, "Event filtered globally");
            return DistributionOutcome::default();
        }
        self.fan_out(event).await
    }

    /// Offers an event that already passed the global chain to every active
    /// subscription concurrently.
    pub async fn deliver(&self, event: &InboundEvent) -> DistributionOutcome {
        self.events_distributed.fetch_add(1, Ordering::Relaxed);
        self.fan_out(event).await
    }

    async fn fan_out(&self, event: &InboundEvent) -> DistributionOutcome {
        let targets: Vec<Arc<Subscription>> = self
            .subscriptions
            .read()
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect();

        let results = join_all(targets.iter().map(|subscription| {
            let event = event.clone();
            async move { (subscription.id(), subscription.process_event(event).await) }
        }))
        .await;

        let mut outcome = DistributionOutcome {
            passed_global: true,
            ..DistributionOutcome::default()
        };
        for (id, result) in results {
            match result {
                Ok(true) => outcome.delivered += 1,
                Ok(false) => {}
                Err(e) => outcome.failures.push((id.to_string(), e.to_string())),
            }
        }
        outcome
    }

    /// Returns a snapshot of manager, global chain and subscription statistics.
    pub fn stats(&self) -> ManagerStats {
        let subscriptions = self.subscriptions.read();
        ManagerStats {
            total_subscriptions: self.total_subscriptions.load(Ordering::Relaxed),
            active_subscriptions: subscriptions.values().filter(|s| s.is_active()).count(),
            events_distributed: self.events_distributed.load(Ordering::Relaxed),
            global_filters: self.global.stats(),
            subscriptions: subscriptions
                .iter()
                .map(|(id, s)| (id.clone(), s.stats()))
                .collect(),
        }
    }
}
