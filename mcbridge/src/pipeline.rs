//! Composition root wiring every component together.
//!
//! A [`Pipeline`] owns the registry, payload validator, subscription
//! manager, queue, lifecycle logger and state synchronizer. The manager's
//! global chain is shared with the queue so that global filters run exactly
//! once per event, at admission.

use crate::codec::Codec;
use crate::error::{FilterResult, HandlerResult, PipelineError, PipelineResult};
use crate::event::{batch_type_for, domain_of, InboundEvent};
use crate::filter::{
    DistributionOutcome, ManagedFilter, ManagerStats, Subscription,
    SubscriptionManager,
};
use crate::handler::{ChatHandler, HandlerId, QueueHandler, SpawnHandler, StateMappingHandler};
use crate::lifecycle::{LifecycleConfig, LifecycleLogger, PerformanceSummary};
use crate::queue::{EventQueue, QueueConfig, QueueStats};
use crate::registry::EventRegistry;
use crate::sync::{SessionBackend, StateSynchronizer, StateValidator, SyncConfig, SyncStats};
use crate::validator::PayloadValidator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Type receiving the spawn handler.
pub const SPAWN_EVENT: &str = "minecraft:spawn";

/// Type receiving the chat handler.
pub const CHAT_EVENT: &str = "minecraft:chat";

/// Configuration for every pipeline component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Queue settings.
    pub queue: QueueConfig,
    /// Lifecycle logger settings.
    pub lifecycle: LifecycleConfig,
    /// State synchronizer settings.
    pub sync: SyncConfig,
    /// Skip installing the built-in state handlers.
    pub skip_default_handlers: bool,
}

impl PipelineConfig {
    fn check(&self) -> PipelineResult<()> {
        if self.queue.max_size == 0 {
            return Err(PipelineError::configuration("queue max_size must be positive"));
        }
        if self.queue.worker_count == 0 {
            return Err(PipelineError::configuration(
                "queue worker_count must be positive",
            ));
        }
        if let Some((event_type, _)) = self
            .queue
            .batch_configs
            .iter()
            .find(|(_, batch)| batch.enabled && batch.max_size == 0)
        {
            return Err(PipelineError::configuration(format!(
                "batch max_size for '{}' must be positive",
                event_type
            )));
        }
        if self.lifecycle.max_history == 0 {
            return Err(PipelineError::configuration(
                "lifecycle max_history must be positive",
            ));
        }
        Ok(())
    }
}

/// What happened to one ingested event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Admitted to the queue and offered to subscriptions.
    Queued(DistributionOutcome),
    /// Rejected by global filters, sampling, rate limiting or capacity.
    Dropped,
    /// The payload failed validation.
    Invalid {
        /// Validation errors.
        errors: Vec<String>,
    },
    /// The event type is not registered.
    UnknownType,
    /// The record lacks an event type or id.
    Malformed,
}

impl IngestOutcome {
    /// Returns `true` if the event reached the queue.
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// Aggregated statistics of all components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    /// Queue counters.
    pub queue: QueueStats,
    /// Lifecycle figures.
    pub lifecycle: PerformanceSummary,
    /// Synchronizer figures.
    pub sync: SyncStats,
    /// Subscription figures.
    pub subscriptions: ManagerStats,
}

/// The assembled event pipeline.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{unix_millis, InboundEvent, Pipeline};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::builder().build().unwrap();
///
/// let spawn = InboundEvent::new("minecraft:spawn", "e1")
///     .with_field("spawned", json!(true))
///     .with_field("time", json!(unix_millis()));
/// assert!(pipeline.ingest(spawn).await.is_queued());
///
/// while pipeline.process_next().await {}
/// assert_eq!(
///     pipeline.synchronizer().get("minecraft.spawned").await,
///     Some(json!(true))
/// );
/// # });
/// ```
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<EventRegistry>,
    validator: PayloadValidator,
    subscriptions: Arc<SubscriptionManager>,
    queue: EventQueue,
    lifecycle: Arc<LifecycleLogger>,
    synchronizer: Arc<StateSynchronizer>,
    running: AtomicBool,
    stopping: AtomicBool,
}

impl Pipeline {
    /// Returns a builder with default settings.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the event registry.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Returns the payload validator.
    pub fn validator(&self) -> &PayloadValidator {
        &self.validator
    }

    /// Returns the subscription manager.
    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Returns the queue.
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Returns the lifecycle logger.
    pub fn lifecycle(&self) -> &Arc<LifecycleLogger> {
        &self.lifecycle
    }

    /// Returns the state synchronizer.
    pub fn synchronizer(&self) -> &Arc<StateSynchronizer> {
        &self.synchronizer
    }

    /// Validates, normalizes and admits one event.
    ///
    /// Events admitted to the queue are then offered to every active
    /// subscription.
    pub async fn ingest(&self, mut event: InboundEvent) -> IngestOutcome {
        if event.event_type.is_empty() || event.event_id.is_empty() {
            warn!(
                event_type = %event.event_type,
                event_id = %event.event_id,
                "Dropping malformed event"
            );
            return IngestOutcome::Malformed;
        }

        self.lifecycle
            .emitted(&event.event_id, &event.event_type, &event.data);

        if !self.registry.contains(&event.event_type) {
            warn!(event_type = %event.event_type, event_id = %event.event_id, "Unknown event type");
            self.lifecycle.failed(
                &event.event_id,
                &format!("Unknown event type: {}", event.event_type),
            );
            return IngestOutcome::UnknownType;
        }

        let report = self.validator.validate_event(&event);
        for warning in &report.warnings {
            warn!(event_type = %event.event_type, event_id = %event.event_id, warning = %warning, "Payload warning");
        }
        let Some(normalized) = report.normalized.filter(|_| report.valid) else {
            warn!(
                event_type = %event.event_type,
                event_id = %event.event_id,
                errors = ?report.errors,
                "Dropping invalid event"
            );
            self.lifecycle.failed(
                &event.event_id,
                &format!("Validation failed: {}", report.errors.join("; ")),
            );
            return IngestOutcome::Invalid {
                errors: report.errors,
            };
        };

        if event.priority.is_none() {
            event.priority = Some(self.registry.priority(&event.event_type));
        }
        event.data = normalized;

        if !self.queue.enqueue(event.clone()) {
            debug!(event_type = %event.event_type, event_id = %event.event_id, "Event not admitted");
            return IngestOutcome::Dropped;
        }
        IngestOutcome::Queued(self.subscriptions.deliver(&event).await)
    }

    /// Parses a JSON record and ingests it.
    pub async fn ingest_json(&self, record: &str) -> PipelineResult<IngestOutcome> {
        let event: InboundEvent = serde_json::from_str(record)?;
        Ok(self.ingest(event).await)
    }

    /// Registers an application handler with the queue.
    pub fn register_handler<S, H>(&self, event_type: S, handler: H) -> HandlerId
    where
        S: Into<String>,
        H: QueueHandler,
    {
        self.queue.register_handler(event_type, handler)
    }

    /// Creates a subscription receiving every admitted event its chain passes.
    pub fn subscribe<S, F, Fut>(&self, id: S, handler: F) -> FilterResult<Arc<Subscription>>
    where
        S: Into<String>,
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        self.subscriptions.create_subscription(id, handler)
    }

    /// Removes a subscription by id.
    pub fn unsubscribe(&self, id: &str) -> FilterResult<()> {
        self.subscriptions.remove_subscription(id)
    }

    /// Adds a filter to the global chain shared by the queue and subscriptions.
    pub fn add_global_filter<F: Into<ManagedFilter>>(&self, filter: F) {
        self.subscriptions.add_global_filter(filter);
    }

    /// Processes one queued event inline, returning `false` when the queue is empty.
    pub async fn process_next(&self) -> bool {
        self.queue.process_next().await
    }

    /// Starts the workers, batch sweep, lifecycle sweeps and periodic snapshots.
    pub async fn start(&self) -> PipelineResult<()> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(PipelineError::ShuttingDown);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.lifecycle.start();
        self.synchronizer.start().await;
        self.queue.start();
        info!(
            event_types = self.registry.len(),
            worker_count = self.config.queue.worker_count,
            "Pipeline started"
        );
        Ok(())
    }

    /// Stops every background task and persists state when enabled.
    pub async fn stop(&self) -> PipelineResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(PipelineError::NotRunning);
        }
        if self.stopping.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::ShuttingDown);
        }
        self.queue.stop().await;
        self.lifecycle.stop().await;
        self.synchronizer.stop().await;
        self.running.store(false, Ordering::SeqCst);
        self.stopping.store(false, Ordering::SeqCst);
        info!("Pipeline stopped");
        Ok(())
    }

    /// Returns `true` between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns statistics from every component.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            queue: self.queue.stats(),
            lifecycle: self.lifecycle.performance_summary(),
            sync: self.synchronizer.stats(),
            subscriptions: self.subscriptions.stats(),
        }
    }
}

fn install_default_handlers(queue: &EventQueue, registry: &Arc<EventRegistry>) {
    let mut batch_types = BTreeSet::new();
    for event_type in registry.event_types() {
        queue.register_handler(event_type, StateMappingHandler::new(Arc::clone(registry)));
        if registry.is_batch_enabled(event_type) {
            batch_types.insert(batch_type_for(domain_of(event_type)));
        }
    }
    for batch_type in batch_types {
        queue.register_handler(batch_type, StateMappingHandler::new(Arc::clone(registry)));
    }
    if registry.contains(SPAWN_EVENT) {
        queue.register_handler(SPAWN_EVENT, SpawnHandler);
    }
    if registry.contains(CHAT_EVENT) {
        queue.register_handler(CHAT_EVENT, ChatHandler);
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    registry: Option<EventRegistry>,
    state_validator: Option<StateValidator>,
    backend: Option<Arc<dyn SessionBackend>>,
    codec: Option<Arc<dyn Codec>>,
    subscriptions: Option<SubscriptionManager>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("has_registry", &self.registry.is_some())
            .field("has_backend", &self.backend.is_some())
            .field("has_codec", &self.codec.is_some())
            .finish()
    }
}

impl PipelineBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the queue configuration.
    pub fn with_queue_config(mut self, config: QueueConfig) -> Self {
        self.config.queue = config;
        self
    }

    /// Sets the lifecycle configuration.
    pub fn with_lifecycle_config(mut self, config: LifecycleConfig) -> Self {
        self.config.lifecycle = config;
        self
    }

    /// Sets the synchronizer configuration.
    pub fn with_sync_config(mut self, config: SyncConfig) -> Self {
        self.config.sync = config;
        self
    }

    /// Uses a custom registry instead of the built-in catalogue.
    pub fn with_registry(mut self, registry: EventRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses a custom state validator.
    pub fn with_state_validator(mut self, validator: StateValidator) -> Self {
        self.state_validator = Some(validator);
        self
    }

    /// Forwards committed deltas to a session backend.
    pub fn with_session_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the codec used for persisted state.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Starts from a manager with filters already configured.
    pub fn with_subscription_manager(mut self, manager: SubscriptionManager) -> Self {
        self.subscriptions = Some(manager);
        self
    }

    /// Skips installing the built-in state handlers.
    pub fn without_default_handlers(mut self) -> Self {
        self.config.skip_default_handlers = true;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for zero-sized capacities or
    /// an empty worker pool.
    pub fn build(self) -> PipelineResult<Pipeline> {
        self.config.check()?;

        let registry = Arc::new(self.registry.unwrap_or_else(EventRegistry::with_defaults));
        let validator = PayloadValidator::new(Arc::clone(&registry));
        let subscriptions = Arc::new(self.subscriptions.unwrap_or_default());
        let lifecycle = Arc::new(LifecycleLogger::new(self.config.lifecycle.clone()));

        let mut sync = StateSynchronizer::builder().with_config(self.config.sync.clone());
        if let Some(validator) = self.state_validator {
            sync = sync.with_validator(validator);
        }
        if let Some(backend) = self.backend {
            sync = sync.with_backend(backend);
        }
        if let Some(codec) = self.codec {
            sync = sync.with_codec(codec);
        }
        let synchronizer = Arc::new(sync.build());

        let queue = EventQueue::builder()
            .with_config(self.config.queue.clone())
            .with_registry(Arc::clone(&registry))
            .with_global_filters(subscriptions.shared_global_filters())
            .with_lifecycle(Arc::clone(&lifecycle))
            .with_state_sink(Arc::clone(&synchronizer))
            .build();

        if !self.config.skip_default_handlers {
            install_default_handlers(&queue, &registry);
        }

        Ok(Pipeline {
            config: self.config,
            registry,
            validator,
            subscriptions,
            queue,
            lifecycle,
            synchronizer,
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        })
    }
}
