use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;

use crate::Result;
use crate::document::{OrderProjection, OrderProjectionPatch};

/// Document storage for the order read model.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Stores a new document. Fails with `DocumentExists` if the key is taken.
    async fn insert(&self, document: OrderProjection) -> Result<()>;

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<OrderProjection>>;

    /// Merges `patch` into the stored document.
    ///
    /// Fails with `MissingDocument` when no document exists for `order_id`.
    async fn update(&self, order_id: OrderId, patch: &OrderProjectionPatch) -> Result<()>;

    /// Removes every document. Used before a rebuild.
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
impl<T: ProjectionStore + ?Sized> ProjectionStore for Arc<T> {
    async fn insert(&self, document: OrderProjection) -> Result<()> {
        (**self).insert(document).await
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<OrderProjection>> {
        (**self).find_by_id(order_id).await
    }

    async fn update(&self, order_id: OrderId, patch: &OrderProjectionPatch) -> Result<()> {
        (**self).update(order_id, patch).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
}
