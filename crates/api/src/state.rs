//! Composition of stores, services and the read-side pipeline.

use std::sync::Arc;

use domain::{DomainEvent, EventPublisher, OrderEvent, OrderService};
use event_store::EventStore;
use projections::{
    EventDispatcher, OrderQueries, ProjectionProcessor, ProjectionStore, ProjectionWorker,
};
use tokio::task::JoinHandle;

use crate::config::{Config, ProjectionDelivery};

pub type SharedEventStore = Arc<dyn EventStore>;
pub type SharedProjectionStore = Arc<dyn ProjectionStore>;
pub type Processor = ProjectionProcessor<SharedEventStore, SharedProjectionStore>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orders: OrderService<SharedEventStore>,
    pub queries: OrderQueries<SharedProjectionStore>,
    /// Name of the storage backend, reported by `/health`.
    pub storage: &'static str,
}

/// Everything the binary needs to run: handler state, the projection
/// processor for catch-up, and the worker task when one was spawned.
pub struct Application {
    pub state: Arc<AppState>,
    pub processor: Arc<Processor>,
    pub worker: Option<JoinHandle<()>>,
}

/// Wires the write side to the read side.
///
/// Fails if the dispatcher has no handler for one of the order event types.
/// With [`ProjectionDelivery::Worker`] this must run inside a Tokio runtime.
pub fn build_application(
    events: SharedEventStore,
    documents: SharedProjectionStore,
    storage: &'static str,
    config: &Config,
) -> projections::Result<Application> {
    let dispatcher = EventDispatcher::for_orders(documents.clone());
    dispatcher.validate(OrderEvent::event_types())?;

    let processor = Arc::new(
        ProjectionProcessor::new(events.clone(), dispatcher).with_config(config.projection.clone()),
    );

    let (publisher, worker) = match config.projection_delivery {
        ProjectionDelivery::Inline => (processor.clone() as Arc<dyn EventPublisher>, None),
        ProjectionDelivery::Worker => {
            let (publisher, handle) = ProjectionWorker::spawn(processor.clone());
            (Arc::new(publisher) as Arc<dyn EventPublisher>, Some(handle))
        }
    };

    let orders = OrderService::new(events)
        .with_config(config.command.clone())
        .with_publisher(publisher);

    let state = Arc::new(AppState {
        orders,
        queries: OrderQueries::new(documents),
        storage,
    });

    Ok(Application {
        state,
        processor,
        worker,
    })
}
