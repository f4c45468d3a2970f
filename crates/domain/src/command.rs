//! Command handling infrastructure.
//!
//! Every command follows the same protocol: load the aggregate by replay,
//! run the mutator, append the raised events with the version observed at
//! load time as the expected version, and retry the whole sequence from a
//! fresh load when another writer got there first.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::{EventEnvelope, EventStore, EventStoreError, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::config::CommandConfig;
use crate::error::DomainError;
use crate::publisher::{EventPublisher, NoopPublisher};

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after the command, with no uncommitted events.
    pub aggregate: A,

    /// The envelopes that were committed; empty if the command was a no-op.
    pub events: Vec<EventEnvelope>,

    /// Stream version after the command.
    pub new_version: Version,

    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// An intention to change one aggregate. May be rejected by the aggregate.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;
}

/// How a command treats a stream that has no events yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    /// Start from an empty aggregate at version 0.
    Create,
    /// Fail with `NotFound`.
    Existing,
}

/// Handler for executing commands against aggregates of type `A`.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    config: CommandConfig,
    publisher: Arc<dyn EventPublisher>,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
    DomainError: From<A::Error>,
{
    /// Creates a handler with default configuration and no publisher.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: CommandConfig::default(),
            publisher: Arc::new(NoopPublisher),
            _phantom: PhantomData,
        }
    }

    pub fn with_config(mut self, config: CommandConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets where committed events are handed after a successful append.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Loads an aggregate by replaying its stream.
    ///
    /// Returns None if the stream has no events.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let events = self.store.load(aggregate_id).await?;
        if events.is_empty() {
            return Ok(None);
        }
        Ok(Some(A::from_history(&events)?))
    }

    /// Loads an aggregate, failing with `NotFound` if it has no events.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        self.load(aggregate_id)
            .await?
            .ok_or_else(|| not_found::<A>(aggregate_id))
    }

    /// Executes a creation command.
    ///
    /// An unknown stream starts as an empty aggregate; a known stream is
    /// replayed, so the mutator sees the existing state and can reject it.
    pub async fn execute_new<F>(
        &self,
        aggregate_id: AggregateId,
        command: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&mut A) -> Result<(), A::Error> + Send + Sync,
    {
        self.run(aggregate_id, LoadMode::Create, command).await
    }

    /// Executes a command against an existing aggregate.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&mut A) -> Result<(), A::Error> + Send + Sync,
    {
        self.run(aggregate_id, LoadMode::Existing, command).await
    }

    async fn run<F>(
        &self,
        aggregate_id: AggregateId,
        mode: LoadMode,
        command: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&mut A) -> Result<(), A::Error> + Send + Sync,
    {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.timeout;

        let result = match tokio::time::timeout_at(
            deadline,
            self.run_with_retry(aggregate_id, mode, &command),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DomainError::Timeout {
                aggregate_id,
                timeout: self.config.timeout,
            }),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        metrics::counter!(
            "commands_executed_total",
            "aggregate_type" => A::aggregate_type(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("command_duration_seconds", "aggregate_type" => A::aggregate_type())
            .record(started.elapsed().as_secs_f64());

        // Publish outside the deadline: the append has already committed.
        if let Ok(committed) = &result
            && !committed.events.is_empty()
        {
            self.publisher.publish(&committed.events).await;
        }

        result
    }

    async fn run_with_retry<F>(
        &self,
        aggregate_id: AggregateId,
        mode: LoadMode,
        command: &F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&mut A) -> Result<(), A::Error> + Send + Sync,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match self.attempt(aggregate_id, mode, command).await {
                Ok(mut result) => {
                    result.attempts = attempt;
                    return Ok(result);
                }
                Err(err) => err,
            };

            let store_err = match err {
                DomainError::EventStore(store_err)
                    if store_err.is_conflict() || store_err.is_transient() =>
                {
                    store_err
                }
                other => return Err(other),
            };

            if attempt >= max_attempts {
                return Err(exhausted(aggregate_id, attempt, store_err));
            }

            let backoff = self.config.backoff_for(attempt);
            if store_err.is_conflict() {
                metrics::counter!("command_conflicts_total", "aggregate_type" => A::aggregate_type())
                    .increment(1);
                tracing::warn!(
                    %aggregate_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "version conflict, retrying command"
                );
            } else {
                tracing::warn!(
                    %aggregate_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %store_err,
                    "event store unavailable, retrying command"
                );
            }

            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// One load, mutate, append cycle.
    async fn attempt<F>(
        &self,
        aggregate_id: AggregateId,
        mode: LoadMode,
        command: &F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&mut A) -> Result<(), A::Error> + Send + Sync,
    {
        let history = self.store.load(aggregate_id).await?;
        let last_timestamp = history.last().map(|event| event.timestamp);
        let mut aggregate = match (history.is_empty(), mode) {
            (false, _) => A::from_history(&history)?,
            (true, LoadMode::Create) => A::default(),
            (true, LoadMode::Existing) => return Err(not_found::<A>(aggregate_id)),
        };
        let expected_version = aggregate.version();

        command(&mut aggregate)?;

        let raised = aggregate.take_uncommitted_events();
        if raised.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                new_version: expected_version,
                attempts: 0,
            });
        }

        let envelopes =
            build_envelopes::<A>(aggregate_id, expected_version, last_timestamp, &raised)?;
        let new_version = self
            .store
            .append(aggregate_id, expected_version, envelopes.clone())
            .await?;

        tracing::debug!(
            %aggregate_id,
            count = envelopes.len(),
            %new_version,
            "events appended"
        );

        Ok(CommandResult {
            aggregate,
            events: envelopes,
            new_version,
            attempts: 0,
        })
    }
}

/// Wraps raised events in envelopes numbered after `expected_version`.
///
/// Timestamps never go below `not_before`, the stream's last stored event,
/// even if the wall clock stepped back since it was written.
fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    expected_version: Version,
    not_before: Option<DateTime<Utc>>,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = expected_version;
    let now = Utc::now();
    let timestamp = not_before.map_or(now, |last| now.max(last));

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .timestamp(timestamp)
            .data_raw(event.to_data()?)
            .build()?;
        envelopes.push(envelope);
    }

    Ok(envelopes)
}

fn not_found<A: Aggregate>(aggregate_id: AggregateId) -> DomainError {
    DomainError::NotFound {
        aggregate_type: A::aggregate_type(),
        aggregate_id,
    }
}

fn exhausted(aggregate_id: AggregateId, attempts: u32, err: EventStoreError) -> DomainError {
    if err.is_conflict() {
        DomainError::ConcurrencyConflict {
            aggregate_id,
            attempts,
        }
    } else {
        DomainError::StoreUnavailable {
            attempts,
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Order, OrderError, ShopItem};
    use event_store::InMemoryEventStore;

    fn items() -> Vec<ShopItem> {
        vec![ShopItem::new("SKU-1", "Widget", 2, crate::Money::from_dollars(10))]
    }

    fn create(order: &mut Order, id: AggregateId) -> Result<(), OrderError> {
        order.create(id.into(), items(), "buyer@example.com", "1 Main St")
    }

    #[tokio::test]
    async fn execute_new_starts_from_empty_stream() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Order> = CommandHandler::new(store.clone());
        let id = AggregateId::new();

        let result = handler
            .execute_new(id, |order| create(order, id))
            .await
            .unwrap();

        assert_eq!(result.new_version, Version::first());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].event_type, "OrderCreated");
        assert!(result.aggregate.uncommitted_events().is_empty());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn execute_requires_existing_stream() {
        let handler: CommandHandler<_, Order> = CommandHandler::new(InMemoryEventStore::new());

        let err = handler
            .execute(AggregateId::new(), |order| order.submit())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound { aggregate_type: "Order", .. }));
    }

    #[tokio::test]
    async fn business_rule_violation_commits_nothing() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Order> = CommandHandler::new(store.clone());
        let id = AggregateId::new();
        handler.execute_new(id, |order| create(order, id)).await.unwrap();

        let err = handler.execute(id, |order| order.submit()).await.unwrap_err();

        assert!(matches!(err, DomainError::BusinessRule(OrderError::NotPaid)));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn command_without_events_keeps_version() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Order> = CommandHandler::new(store.clone());
        let id = AggregateId::new();
        handler.execute_new(id, |order| create(order, id)).await.unwrap();

        let result = handler.execute(id, |_| Ok(())).await.unwrap();

        assert!(result.events.is_empty());
        assert_eq!(result.new_version, Version::first());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn creating_twice_is_rejected() {
        let handler: CommandHandler<_, Order> = CommandHandler::new(InMemoryEventStore::new());
        let id = AggregateId::new();
        handler.execute_new(id, |order| create(order, id)).await.unwrap();

        let err = handler
            .execute_new(id, |order| create(order, id))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::BusinessRule(OrderError::AlreadyCreated)));
    }

    #[tokio::test]
    async fn timestamps_never_go_backwards_within_a_stream() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        let ahead = Utc::now() + chrono::Duration::hours(1);

        // Written by a node whose clock ran an hour ahead.
        let mut created = Order::default();
        create(&mut created, id).unwrap();
        let raised = created.take_uncommitted_events();
        let event = &raised[0];
        let envelope = EventEnvelope::builder()
            .aggregate_id(id)
            .aggregate_type("Order")
            .event_type(event.event_type())
            .version(Version::first())
            .timestamp(ahead)
            .data_raw(event.to_data().unwrap())
            .build()
            .unwrap();
        store.append(id, Version::initial(), vec![envelope]).await.unwrap();

        let handler: CommandHandler<_, Order> = CommandHandler::new(store.clone());
        let result = handler
            .execute(id, |order| order.change_delivery_address("2 Side St"))
            .await
            .unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert!(result.events[0].timestamp >= ahead);
    }

    #[tokio::test]
    async fn load_existing_replays_stream() {
        let handler: CommandHandler<_, Order> = CommandHandler::new(InMemoryEventStore::new());
        let id = AggregateId::new();
        handler.execute_new(id, |order| create(order, id)).await.unwrap();

        let order = handler.load_existing(id).await.unwrap();
        assert_eq!(order.version(), Version::first());
        assert_eq!(order.id(), Some(id));

        assert!(handler.load(AggregateId::new()).await.unwrap().is_none());
    }
}
