//! Append-only event streams with optimistic concurrency.
//!
//! Every aggregate owns one stream. Appends are compare-and-append on the
//! stream version, so two writers that read the same version can never both
//! commit.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{
    EventStore, EventStoreExt, EventStream, validate_events_for_append, validate_timestamp_order,
};
