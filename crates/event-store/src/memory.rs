use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Version,
    store::{EventStore, EventStream, validate_events_for_append, validate_timestamp_order},
};

#[derive(Default)]
struct Inner {
    streams: HashMap<AggregateId, Vec<EventEnvelope>>,
    /// Every event in commit order, for `stream_all`.
    log: Vec<EventEnvelope>,
}

/// In-memory event store.
///
/// Used by tests and by the binary when no database is configured. The
/// write lock makes the version check and the append a single step, which
/// gives the same guarantee as the unique constraint in PostgreSQL.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<Inner>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.log.len()
    }

    /// Simulates an outage: while set, every call fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.streams.clear();
        inner.log.clear();
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable(
                "in-memory store is marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn stream_version(events: &[EventEnvelope]) -> Version {
    events
        .last()
        .map(|e| e.version)
        .unwrap_or_else(Version::initial)
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        self.check_available()?;
        validate_events_for_append(aggregate_id, expected_version, &events)?;

        let mut inner = self.inner.write().await;
        let actual = inner
            .streams
            .get(&aggregate_id)
            .map(|stream| stream_version(stream))
            .unwrap_or_else(Version::initial);

        if actual != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        let last_timestamp = inner
            .streams
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map(|event| event.timestamp);
        validate_timestamp_order(last_timestamp, &events)?;

        let new_version = stream_version(&events);
        inner.log.extend(events.iter().cloned());
        inner
            .streams
            .entry(aggregate_id)
            .or_default()
            .extend(events);

        Ok(new_version)
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from: Version,
    ) -> Result<Vec<EventEnvelope>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .get(&aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.version >= from)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.streams.get(&aggregate_id).map(|s| stream_version(s)))
    }

    async fn stream_all(&self) -> Result<EventStream> {
        use futures_util::stream;

        self.check_available()?;
        let events = self.inner.read().await.log.clone();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}
