//! Integration tests for order commands.
//!
//! These tests drive `OrderService` against the in-memory store and a few
//! wrapping stores that inject races, outages and latency.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{AggregateId, OrderId};
use domain::{
    Aggregate, CancelOrder, ChangeDeliveryAddress, CommandConfig, CreateOrder, DomainError,
    DomainEvent, EventPublisher, Money, OrderError, OrderEvent, OrderService, OrderStatus,
    PayOrder, Payment, ShopItem, SubmitOrder, UpdateShopItems,
    order::DeliveryAddressUpdatedData,
};
use event_store::{
    EventEnvelope, EventStore, EventStoreError, EventStream, InMemoryEventStore, Version,
};

fn fast_config() -> CommandConfig {
    CommandConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        timeout: Duration::from_secs(5),
    }
}

fn create_cmd() -> CreateOrder {
    CreateOrder::new(
        vec![
            ShopItem::new("SKU-1", "Mug", 2, Money::from_dollars(10)),
            ShopItem::new("SKU-2", "Plate", 1, Money::from_dollars(5)),
        ],
        "buyer@example.com",
        "1 Main St",
    )
}

fn payment() -> Payment {
    Payment::new("pay-1", Utc::now())
}

/// Store that lets another writer commit `intruder` right before the next
/// append, so that append runs against a stale expected version.
struct InterferingStore {
    inner: InMemoryEventStore,
    intruder: Mutex<Option<EventEnvelope>>,
    appends: AtomicU32,
}

impl InterferingStore {
    fn new(inner: InMemoryEventStore) -> Self {
        Self {
            inner,
            intruder: Mutex::new(None),
            appends: AtomicU32::new(0),
        }
    }

    fn interfere_with(&self, event: EventEnvelope) {
        *self.intruder.lock().unwrap() = Some(event);
    }
}

#[async_trait]
impl EventStore for InterferingStore {
    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> event_store::Result<Version> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        let intruder = self.intruder.lock().unwrap().take();
        if let Some(event) = intruder {
            let before = Version::new(event.version.as_i64() - 1);
            self.inner.append(aggregate_id, before, vec![event]).await?;
        }
        self.inner.append(aggregate_id, expected_version, events).await
    }

    async fn load(&self, aggregate_id: AggregateId) -> event_store::Result<Vec<EventEnvelope>> {
        self.inner.load(aggregate_id).await
    }

    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from: Version,
    ) -> event_store::Result<Vec<EventEnvelope>> {
        self.inner.load_from(aggregate_id, from).await
    }

    async fn current_version(
        &self,
        aggregate_id: AggregateId,
    ) -> event_store::Result<Option<Version>> {
        self.inner.current_version(aggregate_id).await
    }

    async fn stream_all(&self) -> event_store::Result<EventStream> {
        self.inner.stream_all().await
    }
}

/// Store whose appends always lose the race.
struct AlwaysConflictingStore(InMemoryEventStore);

#[async_trait]
impl EventStore for AlwaysConflictingStore {
    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        _events: Vec<EventEnvelope>,
    ) -> event_store::Result<Version> {
        Err(EventStoreError::ConcurrencyConflict {
            aggregate_id,
            expected: expected_version,
            actual: expected_version.next(),
        })
    }

    async fn load(&self, aggregate_id: AggregateId) -> event_store::Result<Vec<EventEnvelope>> {
        self.0.load(aggregate_id).await
    }

    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from: Version,
    ) -> event_store::Result<Vec<EventEnvelope>> {
        self.0.load_from(aggregate_id, from).await
    }

    async fn current_version(
        &self,
        aggregate_id: AggregateId,
    ) -> event_store::Result<Option<Version>> {
        self.0.current_version(aggregate_id).await
    }

    async fn stream_all(&self) -> event_store::Result<EventStream> {
        self.0.stream_all().await
    }
}

/// Store that fails the first `failures` loads as unavailable.
struct FlakyStore {
    inner: InMemoryEventStore,
    failures: AtomicU32,
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> event_store::Result<Version> {
        self.inner.append(aggregate_id, expected_version, events).await
    }

    async fn load(&self, aggregate_id: AggregateId) -> event_store::Result<Vec<EventEnvelope>> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EventStoreError::Unavailable("connection reset".into()));
        }
        self.inner.load(aggregate_id).await
    }

    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from: Version,
    ) -> event_store::Result<Vec<EventEnvelope>> {
        self.inner.load_from(aggregate_id, from).await
    }

    async fn current_version(
        &self,
        aggregate_id: AggregateId,
    ) -> event_store::Result<Option<Version>> {
        self.inner.current_version(aggregate_id).await
    }

    async fn stream_all(&self) -> event_store::Result<EventStream> {
        self.inner.stream_all().await
    }
}

/// Store whose loads take longer than any sensible command deadline.
struct SlowStore(InMemoryEventStore);

#[async_trait]
impl EventStore for SlowStore {
    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> event_store::Result<Version> {
        self.0.append(aggregate_id, expected_version, events).await
    }

    async fn load(&self, aggregate_id: AggregateId) -> event_store::Result<Vec<EventEnvelope>> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.0.load(aggregate_id).await
    }

    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from: Version,
    ) -> event_store::Result<Vec<EventEnvelope>> {
        self.0.load_from(aggregate_id, from).await
    }

    async fn current_version(
        &self,
        aggregate_id: AggregateId,
    ) -> event_store::Result<Option<Version>> {
        self.0.current_version(aggregate_id).await
    }

    async fn stream_all(&self) -> event_store::Result<EventStream> {
        self.0.stream_all().await
    }
}

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<EventEnvelope>>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, events: &[EventEnvelope]) {
        self.published.lock().unwrap().extend_from_slice(events);
    }
}

fn address_change(order_id: OrderId, version: i64, address: &str) -> EventEnvelope {
    let event = OrderEvent::OrderDeliveryAddressUpdated(DeliveryAddressUpdatedData {
        delivery_address: address.to_string(),
    });
    EventEnvelope::builder()
        .aggregate_id(order_id.aggregate_id())
        .aggregate_type("Order")
        .event_type(event.event_type())
        .version(Version::new(version))
        .data_raw(event.to_data().unwrap())
        .build()
        .unwrap()
}

mod order_lifecycle {
    use super::*;

    #[tokio::test]
    async fn create_records_one_event_at_version_one() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());
        let cmd = create_cmd();
        let order_id = cmd.order_id;

        let result = service.create_order(cmd).await.unwrap();

        assert_eq!(result.new_version, Version::first());
        assert_eq!(result.aggregate.status(), OrderStatus::Created);
        assert_eq!(result.aggregate.total_price(), Money::from_dollars(25));

        let stored = store.load(order_id.aggregate_id()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, "OrderCreated");
        assert_eq!(stored[0].aggregate_type, "Order");
        assert_eq!(stored[0].data["account_email"], "buyer@example.com");
    }

    #[tokio::test]
    async fn replay_reproduces_command_state() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());
        let cmd = create_cmd();
        let order_id = cmd.order_id;

        service.create_order(cmd).await.unwrap();
        service
            .update_shop_items(UpdateShopItems::new(
                order_id,
                vec![ShopItem::new("SKU-3", "Bowl", 1, Money::from_dollars(20))],
            ))
            .await
            .unwrap();
        let last = service
            .pay_order(PayOrder::new(order_id, payment()))
            .await
            .unwrap();

        let first = service.load_order(order_id).await.unwrap();
        let second = service.load_order(order_id).await.unwrap();

        for replayed in [&first, &second] {
            assert_eq!(replayed.version(), last.new_version);
            assert_eq!(replayed.status(), last.aggregate.status());
            assert_eq!(replayed.shop_items(), last.aggregate.shop_items());
            assert_eq!(replayed.payment(), last.aggregate.payment());
        }
    }

    #[tokio::test]
    async fn rejected_command_leaves_stream_untouched() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());
        let cmd = create_cmd();
        let order_id = cmd.order_id;
        service.create_order(cmd).await.unwrap();
        service
            .cancel_order(CancelOrder::new(order_id, "duplicate"))
            .await
            .unwrap();

        let err = service
            .pay_order(PayOrder::new(order_id, payment()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::BusinessRule(OrderError::InvalidStateTransition { .. })
        ));
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn commands_on_unknown_order_are_not_found() {
        let service = OrderService::new(InMemoryEventStore::new());

        let err = service
            .submit_order(SubmitOrder::new(OrderId::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn stale_append_is_retried_from_fresh_state() {
        let inner = InMemoryEventStore::new();
        let store = Arc::new(InterferingStore::new(inner.clone()));
        let service = OrderService::new(store.clone()).with_config(fast_config());
        let cmd = create_cmd();
        let order_id = cmd.order_id;
        service.create_order(cmd).await.unwrap();

        // Another writer commits version 2 between our load and append.
        store.interfere_with(address_change(order_id, 2, "9 Other Ave"));
        let result = service
            .pay_order(PayOrder::new(order_id, payment()))
            .await
            .unwrap();

        assert_eq!(result.attempts, 2);
        assert_eq!(result.new_version, Version::new(3));
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].version, Version::new(3));

        let order = service.load_order(order_id).await.unwrap();
        assert_eq!(order.delivery_address(), "9 Other Ave");
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(inner.event_count().await, 3);
        assert_eq!(store.appends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_conflict() {
        let inner = InMemoryEventStore::new();
        let seed = OrderService::new(inner.clone());
        let cmd = create_cmd();
        let order_id = cmd.order_id;
        seed.create_order(cmd).await.unwrap();

        let service =
            OrderService::new(AlwaysConflictingStore(inner.clone())).with_config(fast_config());
        let err = service
            .submit_order(SubmitOrder::new(order_id))
            .await
            .unwrap_err();

        // Not paid yet: the business rule wins before any append happens.
        assert!(matches!(err, DomainError::BusinessRule(OrderError::NotPaid)));

        let err = service
            .pay_order(PayOrder::new(order_id, payment()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::ConcurrencyConflict { attempts: 3, .. }
        ));
        assert_eq!(inner.event_count().await, 1);
    }

    #[tokio::test]
    async fn racing_writers_with_one_attempt_have_one_winner() {
        let store = InMemoryEventStore::new();
        let config = CommandConfig {
            max_attempts: 1,
            ..fast_config()
        };
        let service = Arc::new(OrderService::new(store.clone()).with_config(config));
        let cmd = create_cmd();
        let order_id = cmd.order_id;
        service.create_order(cmd).await.unwrap();

        let barrier = Arc::new(tokio::sync::Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let service = service.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    service
                        .change_delivery_address(ChangeDeliveryAddress::new(
                            order_id,
                            format!("{i} Race St"),
                        ))
                        .await
                })
            })
            .collect();

        let mut committed = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(result) => committed.push(result.new_version.as_i64()),
                Err(err) => assert!(
                    matches!(err, DomainError::ConcurrencyConflict { attempts: 1, .. }),
                    "unexpected error: {err}"
                ),
            }
        }

        // Exactly one writer wins version 2; a writer that loaded after a
        // commit may win a later version, but no version is shared.
        committed.sort();
        let winners = committed.len();
        assert_eq!(committed.first(), Some(&2));
        committed.dedup();
        assert_eq!(committed.len(), winners);

        let versions: Vec<_> = store
            .load(order_id.aggregate_id())
            .await
            .unwrap()
            .iter()
            .map(|e| e.version.as_i64())
            .collect();
        assert_eq!(versions, (1..=(1 + winners as i64)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn concurrent_commands_with_retries_all_commit_in_order() {
        let store = InMemoryEventStore::new();
        let config = CommandConfig {
            max_attempts: 20,
            ..fast_config()
        };
        let service = Arc::new(OrderService::new(store.clone()).with_config(config));
        let cmd = create_cmd();
        let order_id = cmd.order_id;
        service.create_order(cmd).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .change_delivery_address(ChangeDeliveryAddress::new(
                            order_id,
                            format!("{i} Queue St"),
                        ))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let events = store.load(order_id.aggregate_id()).await.unwrap();
        let versions: Vec<_> = events.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, (1..=9).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn sequential_commands_produce_sequential_versions() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());
        let cmd = create_cmd();
        let order_id = cmd.order_id;
        service.create_order(cmd).await.unwrap();

        for n in 2..=10 {
            let result = service
                .change_delivery_address(ChangeDeliveryAddress::new(order_id, format!("{n} Loop Rd")))
                .await
                .unwrap();
            assert_eq!(result.new_version, Version::new(n));
        }

        assert_eq!(
            store.current_version(order_id.aggregate_id()).await.unwrap(),
            Some(Version::new(10))
        );
    }
}

mod infrastructure_failures {
    use super::*;

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let inner = InMemoryEventStore::new();
        let store = FlakyStore {
            inner: inner.clone(),
            failures: AtomicU32::new(2),
        };
        let service = OrderService::new(store).with_config(fast_config());

        let result = service.create_order(create_cmd()).await.unwrap();

        assert_eq!(result.attempts, 3);
        assert_eq!(inner.event_count().await, 1);
    }

    #[tokio::test]
    async fn persistent_outage_surfaces_store_unavailable() {
        let store = InMemoryEventStore::new();
        store.set_unavailable(true);
        let service = OrderService::new(store).with_config(fast_config());

        let err = service.create_order(create_cmd()).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::StoreUnavailable { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn deadline_aborts_slow_commands() {
        let config = CommandConfig {
            timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let service = OrderService::new(SlowStore(InMemoryEventStore::new())).with_config(config);

        let err = service.create_order(create_cmd()).await.unwrap_err();

        assert!(matches!(err, DomainError::Timeout { .. }));
    }
}

mod publishing {
    use super::*;

    #[tokio::test]
    async fn committed_events_are_published_once() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service =
            OrderService::new(InMemoryEventStore::new()).with_publisher(publisher.clone());
        let cmd = create_cmd();
        let order_id = cmd.order_id;

        service.create_order(cmd).await.unwrap();
        service
            .pay_order(PayOrder::new(order_id, payment()))
            .await
            .unwrap();
        let _ = service.submit_order(SubmitOrder::new(OrderId::new())).await;

        let published = publisher.published.lock().unwrap();
        let tags: Vec<_> = published.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(tags, vec!["OrderCreated", "OrderPaid"]);
        assert_eq!(published[1].version, Version::new(2));
    }

    #[tokio::test]
    async fn rejected_commands_publish_nothing() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service =
            OrderService::new(InMemoryEventStore::new()).with_publisher(publisher.clone());
        let cmd = create_cmd();
        let order_id = cmd.order_id;
        service.create_order(cmd).await.unwrap();

        let _ = service.submit_order(SubmitOrder::new(order_id)).await;

        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }
}
