//! Error types for mcbridge.
//!
//! This module defines the error types that can surface from configuration,
//! handler execution, filter registration, state synchronization and codecs.
//! Hot-path operations (`enqueue`, `validate`, `apply_delta`) report outcomes
//! as plain values instead; these types cover everything else.

use thiserror::Error;

/// Top-level errors returned by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Handler execution failed.
    #[error("Handler execution failed: {0}")]
    Handler(#[from] HandlerError),

    /// Filter or subscription management failed.
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// State synchronization failed.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// A codec failed to transform bytes.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Registry lookup or payload decoding failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The pipeline is shutting down and cannot accept new work.
    #[error("Pipeline is shutting down")]
    ShuttingDown,

    /// The operation requires the pipeline to be running.
    #[error("Pipeline is not running")]
    NotRunning,

    /// Configuration error occurred.
    #[error("Configuration error: {message}")]
    Configuration {
        /// The configuration error message.
        message: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A Prometheus collector could not be created or registered.
    #[cfg(feature = "metrics")]
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Errors produced by queue handlers and subscription handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler reported a failure.
    #[error("{message}")]
    Failed {
        /// The failure message.
        message: String,
    },

    /// A handler panicked during execution.
    #[error("Handler panicked: {message}")]
    Panic {
        /// The panic message.
        message: String,
    },

    /// Handler failed with a custom error.
    #[error("{0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by explicit registry validation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The event type has not been registered.
    #[error("Unknown event type: {event_type}")]
    UnknownEventType {
        /// The unregistered type.
        event_type: String,
    },

    /// The payload does not match the registered schema.
    #[error("Invalid payload for {event_type}: {reason}")]
    InvalidPayload {
        /// The event type being decoded.
        event_type: String,
        /// The decoding error.
        reason: String,
    },
}

/// Errors that can occur while building filters or managing subscriptions.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A glob or regular expression could not be compiled.
    #[error("Invalid filter pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern that failed to compile.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },

    /// A subscription with this id already exists.
    #[error("Subscription {id} already exists")]
    DuplicateSubscription {
        /// The duplicated subscription id.
        id: String,
    },

    /// No subscription with this id exists.
    #[error("Subscription not found: {id}")]
    SubscriptionNotFound {
        /// The missing subscription id.
        id: String,
    },
}

/// Errors raised by the state synchronizer outside of `apply_delta`.
#[derive(Debug, Error)]
pub enum StateError {
    /// The candidate state failed validation.
    #[error("State validation failed: {}", errors.join("; "))]
    ValidationFailed {
        /// Every validation error that was found.
        errors: Vec<String>,
    },

    /// Reading or writing the persistence file failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// State could not be serialized or parsed.
    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session backend reported a failure.
    #[error("Session backend error: {message}")]
    Backend {
        /// The backend error message.
        message: String,
    },

    /// The persisted bytes could not be decoded.
    #[error("State codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors raised by compression codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Compressing the input failed.
    #[error("Compression failed: {message}")]
    Compress {
        /// The error message.
        message: String,
    },

    /// Decompressing the input failed.
    #[error("Decompression failed: {message}")]
    Decompress {
        /// The error message.
        message: String,
    },
}

/// Convenience type alias for pipeline operation results.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Convenience type alias for handler operation results.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Convenience type alias for registry results.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Convenience type alias for filter results.
pub type FilterResult<T> = Result<T, FilterError>;

/// Convenience type alias for state results.
pub type StateResult<T> = Result<T, StateError>;

impl PipelineError {
    /// Creates a new configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl HandlerError {
    /// Creates a new failure with the given message.
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates a new panic error.
    pub fn panic<S: Into<String>>(message: S) -> Self {
        Self::Panic {
            message: message.into(),
        }
    }

    /// Creates a new custom error from any error type.
    pub fn custom<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Custom(Box::new(error))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        Self::custom(error)
    }
}

impl RegistryError {
    /// Creates a new unknown event type error.
    pub fn unknown_event_type<S: Into<String>>(event_type: S) -> Self {
        Self::UnknownEventType {
            event_type: event_type.into(),
        }
    }

    /// Creates a new invalid payload error.
    pub fn invalid_payload<S: Into<String>, R: Into<String>>(event_type: S, reason: R) -> Self {
        Self::InvalidPayload {
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }
}

impl FilterError {
    /// Creates a new invalid pattern error.
    pub fn invalid_pattern<P: Into<String>, R: ToString>(pattern: P, reason: R) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a new duplicate subscription error.
    pub fn duplicate_subscription<S: Into<String>>(id: S) -> Self {
        Self::DuplicateSubscription { id: id.into() }
    }

    /// Creates a new subscription not found error.
    pub fn subscription_not_found<S: Into<String>>(id: S) -> Self {
        Self::SubscriptionNotFound { id: id.into() }
    }
}

impl StateError {
    /// Creates a new validation error from a list of messages.
    pub fn validation_failed(errors: Vec<String>) -> Self {
        Self::ValidationFailed { errors }
    }

    /// Creates a new backend error.
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl CodecError {
    /// Creates a new compression error.
    pub fn compress<S: Into<String>>(message: S) -> Self {
        Self::Compress {
            message: message.into(),
        }
    }

    /// Creates a new decompression error.
    pub fn decompress<S: Into<String>>(message: S) -> Self {
        Self::Decompress {
            message: message.into(),
        }
    }
}
