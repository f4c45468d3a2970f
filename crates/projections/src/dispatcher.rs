//! Routes committed events to projection handlers by event type.

use std::collections::HashMap;

use domain::order::events::{
    ORDER_CANCELED, ORDER_CREATED, ORDER_DELIVERED, ORDER_DELIVERY_ADDRESS_UPDATED, ORDER_PAID,
    ORDER_SUBMITTED, ORDER_UPDATED,
};
use event_store::EventEnvelope;

use crate::handlers::{self, HandlerFn, IgnoreReason, ProjectionChange, order_id_of};
use crate::store::ProjectionStore;
use crate::{ProjectionError, Result};

const ORDER_HANDLERS: &[(&str, HandlerFn)] = &[
    (ORDER_CREATED, handlers::on_order_created),
    (ORDER_PAID, handlers::on_order_paid),
    (ORDER_SUBMITTED, handlers::on_order_submitted),
    (ORDER_UPDATED, handlers::on_order_updated),
    (ORDER_DELIVERY_ADDRESS_UPDATED, handlers::on_delivery_address_updated),
    (ORDER_CANCELED, handlers::on_order_canceled),
    (ORDER_DELIVERED, handlers::on_order_delivered),
];

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Inserted,
    Updated,
    Ignored(IgnoreReason),
    /// No handler for this event type; nothing was done.
    Unhandled,
}

/// Explicit event-type → handler table over a projection store.
pub struct EventDispatcher<P: ProjectionStore> {
    store: P,
    handlers: HashMap<&'static str, HandlerFn>,
}

impl<P: ProjectionStore> EventDispatcher<P> {
    /// Creates a dispatcher with no handlers.
    pub fn new(store: P) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Creates a dispatcher with a handler for every order event type.
    pub fn for_orders(store: P) -> Self {
        Self {
            store,
            handlers: ORDER_HANDLERS.iter().copied().collect(),
        }
    }

    /// Registers `handler` for `event_type`. Each type gets exactly one handler.
    pub fn register(&mut self, event_type: &'static str, handler: HandlerFn) -> Result<()> {
        if self.handlers.contains_key(event_type) {
            return Err(ProjectionError::DuplicateHandler(event_type.to_string()));
        }
        self.handlers.insert(event_type, handler);
        Ok(())
    }

    /// Fails if any of `known_types` has no handler.
    pub fn validate(&self, known_types: &[&str]) -> Result<()> {
        let mut missing: Vec<String> = known_types
            .iter()
            .filter(|t| !self.handlers.contains_key(**t))
            .map(|t| t.to_string())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ProjectionError::MissingHandlers(missing))
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    /// Applies one event to the read model.
    #[tracing::instrument(
        skip(self, event),
        fields(event_type = %event.event_type, aggregate_id = %event.aggregate_id, version = %event.version)
    )]
    pub async fn dispatch(&self, event: &EventEnvelope) -> Result<DispatchOutcome> {
        let Some(handler) = self.handlers.get(event.event_type.as_str()) else {
            tracing::debug!("no projection handler, skipping");
            return Ok(DispatchOutcome::Unhandled);
        };

        let order_id = order_id_of(event);
        let current = self.store.find_by_id(order_id).await?;

        match handler(event, current.as_ref())? {
            ProjectionChange::Insert(document) => {
                self.store.insert(document).await?;
                Ok(DispatchOutcome::Inserted)
            }
            ProjectionChange::Update(patch) => {
                self.store.update(order_id, &patch).await?;
                Ok(DispatchOutcome::Updated)
            }
            ProjectionChange::Ignore(reason) => {
                match reason {
                    IgnoreReason::Canceled => {
                        tracing::warn!(%order_id, "order is canceled, event not projected")
                    }
                    IgnoreReason::AlreadyCreated => {
                        tracing::debug!(%order_id, "projection already exists")
                    }
                }
                metrics::counter!(
                    "projection_events_ignored_total",
                    "event_type" => event.event_type.clone(),
                    "reason" => reason.as_str()
                )
                .increment(1);
                Ok(DispatchOutcome::Ignored(reason))
            }
        }
    }
}
