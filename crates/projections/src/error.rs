//! Projection error types.

use common::{AggregateId, OrderId};
use event_store::{EventStoreError, Version, error::is_transient_sqlx};
use thiserror::Error;

/// Errors raised on the read side.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// No projection document exists for the queried order.
    #[error("Order projection not found: {0}")]
    NotFound(OrderId),

    /// An update targeted an order that has no document yet.
    #[error("No projection document for order {0}")]
    MissingDocument(OrderId),

    #[error("Projection document already exists for order {0}")]
    DocumentExists(OrderId),

    /// The projection store could not be reached; the operation may succeed later.
    #[error("Projection store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Failed to decode {event_type} payload: {source}")]
    Decode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Projection document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("A handler is already registered for {0}")]
    DuplicateHandler(String),

    #[error("No handler registered for event types: {}", .0.join(", "))]
    MissingHandlers(Vec<String>),

    /// Applying a committed event to the read model failed.
    #[error("Failed to apply {event_type} v{version} of {aggregate_id}: {source}")]
    Apply {
        event_type: String,
        aggregate_id: AggregateId,
        version: Version,
        #[source]
        source: Box<ProjectionError>,
    },
}

impl ProjectionError {
    /// Returns true when retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProjectionError::StoreUnavailable(_) => true,
            ProjectionError::Database(err) => is_transient_sqlx(err),
            ProjectionError::EventStore(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
