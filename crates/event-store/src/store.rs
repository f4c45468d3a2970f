use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// A stream of events in global commit order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Append-only storage of per-aggregate event streams.
///
/// Implementations must be thread-safe (Send + Sync) and cheap to clone
/// behind an `Arc` or by handle.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends `events` to the stream of `aggregate_id`.
    ///
    /// The batch is written atomically and only if the stream is currently
    /// at `expected_version`; otherwise nothing is written and
    /// `ConcurrencyConflict` is returned. Returns the stream's new version.
    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version>;

    /// Loads every event of a stream in version order.
    ///
    /// An unknown stream yields an empty list.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Loads the events of a stream whose version is `>= from`.
    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Current version of a stream, or None if it has no events.
    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Streams every stored event in global commit order.
    async fn stream_all(&self) -> Result<EventStream>;
}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        (**self).append(aggregate_id, expected_version, events).await
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        (**self).load(aggregate_id).await
    }

    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from: Version,
    ) -> Result<Vec<EventEnvelope>> {
        (**self).load_from(aggregate_id, from).await
    }

    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        (**self).current_version(aggregate_id).await
    }

    async fn stream_all(&self) -> Result<EventStream> {
        (**self).stream_all().await
    }
}

/// Convenience methods available on every event store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if a stream has any events.
    async fn stream_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.current_version(aggregate_id).await?.is_some())
    }

    /// Collects `stream_all` into memory.
    async fn load_all(&self) -> Result<Vec<EventEnvelope>> {
        use futures_util::TryStreamExt;

        self.stream_all().await?.try_collect().await
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch can be appended to `aggregate_id` at `expected`.
///
/// The batch must be non-empty, target a single stream, and carry
/// contiguous versions starting at `expected + 1` with timestamps that
/// never decrease.
pub fn validate_events_for_append(
    aggregate_id: AggregateId,
    expected: Version,
    events: &[EventEnvelope],
) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(invalid("cannot append an empty batch"));
    };

    let mut next = expected.next();
    for event in events {
        if event.aggregate_id != aggregate_id {
            return Err(invalid(format!(
                "event {} belongs to stream {}, not {}",
                event.event_id, event.aggregate_id, aggregate_id
            )));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(invalid("all events must have the same aggregate type"));
        }
        if event.version != next {
            return Err(invalid(format!(
                "versions must be contiguous: expected {next}, got {}",
                event.version
            )));
        }
        next = next.next();
    }

    validate_timestamp_order(None, events)
}

/// Checks that timestamps never decrease across the batch, starting from
/// `after`, the timestamp of the stream's last stored event.
pub fn validate_timestamp_order(
    after: Option<DateTime<Utc>>,
    events: &[EventEnvelope],
) -> Result<()> {
    let mut previous = after;
    for event in events {
        if let Some(previous) = previous
            && event.timestamp < previous
        {
            return Err(invalid(format!(
                "timestamp of version {} ({}) is earlier than the previous event ({previous})",
                event.version, event.timestamp
            )));
        }
        previous = Some(event.timestamp);
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> EventStoreError {
    EventStoreError::InvalidAppend(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Order")
            .event_type("OrderPaid")
            .version(Version::new(version))
            .build()
            .unwrap()
    }

    #[test]
    fn accepts_contiguous_batch_after_expected() {
        let id = AggregateId::new();
        let events = vec![event(id, 3), event(id, 4)];
        assert!(validate_events_for_append(id, Version::new(2), &events).is_ok());
    }

    #[test]
    fn rejects_empty_batch() {
        let err = validate_events_for_append(AggregateId::new(), Version::initial(), &[])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
    }

    #[test]
    fn rejects_foreign_stream() {
        let id = AggregateId::new();
        let events = vec![event(id, 1), event(AggregateId::new(), 2)];
        assert!(validate_events_for_append(id, Version::initial(), &events).is_err());
    }

    #[test]
    fn rejects_decreasing_timestamps() {
        let id = AggregateId::new();
        let mut events = vec![event(id, 1), event(id, 2)];
        events[1].timestamp = events[0].timestamp - chrono::Duration::seconds(1);

        let err = validate_events_for_append(id, Version::initial(), &events).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
    }

    #[test]
    fn timestamps_must_not_precede_the_stored_stream() {
        let id = AggregateId::new();
        let batch = vec![event(id, 2)];
        let stamp = batch[0].timestamp;

        assert!(validate_timestamp_order(Some(stamp), &batch).is_ok());
        assert!(validate_timestamp_order(Some(stamp - chrono::Duration::seconds(1)), &batch).is_ok());
        assert!(
            validate_timestamp_order(Some(stamp + chrono::Duration::seconds(1)), &batch).is_err()
        );
    }

    #[test]
    fn rejects_gaps_and_wrong_start() {
        let id = AggregateId::new();
        assert!(validate_events_for_append(id, Version::initial(), &[event(id, 2)]).is_err());
        let gapped = vec![event(id, 1), event(id, 3)];
        assert!(validate_events_for_append(id, Version::initial(), &gapped).is_err());
    }
}
