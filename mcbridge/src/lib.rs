//! # mcbridge - Prioritized Game-World Event Pipeline
//!
//! mcbridge ingests a high-rate stream of typed game events (spawns, chat,
//! positions, block updates, entity activity), validates and normalizes their
//! payloads, filters and samples them, and schedules them through a bounded
//! priority queue with batching and retries. Handlers turn events into state
//! deltas that are committed atomically to a validated, snapshotted world
//! state.
//!
//! ## Features
//!
//! - **Event Registry**: Per-type priority, batching, sampling and state mapping
//! - **Payload Validation**: Structured reports with normalized positions and items
//! - **Filtering**: Composable filter chains, global and per subscription
//! - **Priority Queue**: Capacity eviction, deterministic sampling, rate limiting
//! - **Batching**: Size, window and max-wait flushes into one synthetic event
//! - **Lifecycle Tracking**: Per-event stage history and rolling statistics
//! - **State Synchronization**: Atomic deltas, history, snapshots and persistence
//!
//! ## Quick Start
//!
//! ```rust
//! use mcbridge::testing::EventBuilder;
//! use mcbridge::Pipeline;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::builder().build().unwrap();
//!
//! pipeline.ingest(EventBuilder::spawn().build()).await;
//! pipeline.ingest(EventBuilder::chat("alex", "hello").build()).await;
//! while pipeline.process_next().await {}
//!
//! let synchronizer = pipeline.synchronizer();
//! assert_eq!(synchronizer.get("minecraft.chat.last_speaker").await, Some(json!("alex")));
//! # });
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

// Core modules
pub mod codec;
pub mod error;
pub mod event;
pub mod handler;
pub mod payload;
pub mod priority;
pub mod registry;
pub mod validator;

// Pipeline stages
pub mod filter;
pub mod lifecycle;
pub mod pipeline;
pub mod queue;
pub mod sync;
pub mod testing;

// Feature-gated modules
#[cfg(feature = "metrics")]
pub mod metrics;

// Re-exports for convenience
pub use codec::{Codec, IdentityCodec};
pub use error::*;
pub use event::{
    batch_type_for, domain_of, short_type_of, unix_millis, BatchBody, EventBody, FlushReason,
    InboundEvent, QueuedEvent,
};
pub use filter::{
    ChainStats, ContentFilter, CustomFilter, DistributionOutcome, EventFilter, EventTypeFilter,
    FilterChain, FilterConfig, FrequencyFilter, ManagedFilter, ManagerStats, PriorityFilter,
    SourceFilter, Subscription, SubscriptionManager, TimeWindowFilter,
};
pub use handler::{
    ChatHandler, HandlerId, QueueHandler, SpawnHandler, StateDelta, StateMappingHandler,
};
pub use lifecycle::{
    EventLogEntry, EventStage, LifecycleConfig, LifecycleLogger, LifecycleStats,
    PerformanceSummary,
};
pub use payload::{EventPayload, PayloadSchema};
pub use pipeline::{IngestOutcome, Pipeline, PipelineBuilder, PipelineConfig, PipelineStats};
pub use priority::{Priority, PriorityHeap, PushOutcome};
pub use queue::{BatchConfig, EventQueue, QueueBuilder, QueueConfig, QueueStats};
pub use registry::{EventMetadata, EventRegistry, MappingSource};
pub use sync::{
    ConflictResolution, InMemorySession, SessionBackend, StateChange, StateSnapshot,
    StateSynchronizer, StateValidator, SyncBuilder, SyncConfig, SyncStats, ValueKind,
};
pub use validator::{PayloadValidator, ValidationReport};

#[cfg(feature = "metrics")]
pub use metrics::PipelineMetrics;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{HandlerError, PipelineError, StateError};
    pub use crate::{
        EventFilter, EventQueue, EventRegistry, EventTypeFilter, HandlerResult, InboundEvent,
        IngestOutcome, Pipeline, PipelineBuilder, PipelineConfig, Priority, QueueHandler,
        QueuedEvent, StateDelta, StateSynchronizer, SubscriptionManager,
    };

    #[cfg(feature = "metrics")]
    pub use crate::PipelineMetrics;
}

/// Version information for the mcbridge library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod test_batching;

#[cfg(test)]
mod test_global_filters;

#[cfg(test)]
mod test_retry;
