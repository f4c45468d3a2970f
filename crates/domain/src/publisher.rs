//! Hand-off of committed events to the read side.

use async_trait::async_trait;
use event_store::EventEnvelope;

/// Receives events after they are durably appended.
///
/// Publishing happens after the write has committed, so an implementation
/// must not report failure back to the writer: read-side problems are
/// recovered by redelivery or catch-up, never by failing the command.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, events: &[EventEnvelope]);
}

/// Publisher that drops every event. Used when no read side is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _events: &[EventEnvelope]) {}
}
