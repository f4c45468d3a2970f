//! Domain error types.

use std::time::Duration;

use common::AggregateId;
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::order::OrderError;

/// Failure to rebuild an aggregate from its stream.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot decode {event_type} at version {version}: {source}")]
    Decode {
        event_type: String,
        version: Version,
        #[source]
        source: serde_json::Error,
    },

    /// The aggregate's own stream holds a tag it does not know.
    #[error("unknown event type {event_type} at version {version}")]
    UnknownEventType { event_type: String, version: Version },

    #[error("version gap in stream: expected {expected}, found {found}")]
    VersionGap { expected: Version, found: Version },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Every attempt lost the expected-version race.
    #[error("Concurrency conflict on {aggregate_id} after {attempts} attempts")]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        attempts: u32,
    },

    /// The command was rejected by the aggregate. Never retried.
    #[error("Business rule violation: {0}")]
    BusinessRule(#[from] OrderError),

    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    NotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    /// Transient store failures persisted through every attempt.
    #[error("Event store unavailable after {attempts} attempts: {source}")]
    StoreUnavailable {
        attempts: u32,
        #[source]
        source: EventStoreError,
    },

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Command on {aggregate_id} timed out after {timeout:?}")]
    Timeout {
        aggregate_id: AggregateId,
        timeout: Duration,
    },
}

impl DomainError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::ConcurrencyConflict { .. } => "conflict",
            DomainError::BusinessRule(_) => "business_rule",
            DomainError::NotFound { .. } => "not_found",
            DomainError::Serialization(_) | DomainError::Replay(_) => "serialization",
            DomainError::StoreUnavailable { .. } => "unavailable",
            DomainError::EventStore(_) => "event_store",
            DomainError::Timeout { .. } => "timeout",
        }
    }
}
