//! Query handlers over the order read model.

use common::OrderId;

use crate::document::OrderProjection;
use crate::store::ProjectionStore;
use crate::{ProjectionError, Result};

/// Read-only access to order projections.
///
/// Queries never touch the event store; they see the read model as of the
/// last applied event.
#[derive(Clone)]
pub struct OrderQueries<P: ProjectionStore> {
    store: P,
}

impl<P: ProjectionStore> OrderQueries<P> {
    pub fn new(store: P) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, order_id: OrderId) -> Result<OrderProjection> {
        self.store
            .find_by_id(order_id)
            .await?
            .ok_or(ProjectionError::NotFound(order_id))
    }
}
