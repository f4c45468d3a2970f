//! In-memory projection store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::document::{OrderProjection, OrderProjectionPatch};
use crate::store::ProjectionStore;
use crate::{ProjectionError, Result};

/// Projection store backed by a `HashMap`.
///
/// Clones share the same documents. Storage failures can be simulated with
/// [`set_unavailable`](Self::set_unavailable) and
/// [`fail_next_writes`](Self::fail_next_writes).
#[derive(Clone, Default)]
pub struct InMemoryProjectionStore {
    documents: Arc<RwLock<HashMap<OrderId, OrderProjection>>>,
    unavailable: Arc<AtomicBool>,
    failing_writes: Arc<AtomicUsize>,
}

impl InMemoryProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Makes every operation fail with `StoreUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next `count` writes fail with `StoreUnavailable`.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProjectionError::StoreUnavailable(
                "in-memory projection store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        self.check_available()?;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(ProjectionError::StoreUnavailable(
                "injected write failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectionStore for InMemoryProjectionStore {
    async fn insert(&self, document: OrderProjection) -> Result<()> {
        self.check_write()?;
        let mut documents = self.documents.write().await;
        if documents.contains_key(&document.order_id) {
            return Err(ProjectionError::DocumentExists(document.order_id));
        }
        documents.insert(document.order_id, document);
        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<OrderProjection>> {
        self.check_available()?;
        Ok(self.documents.read().await.get(&order_id).cloned())
    }

    async fn update(&self, order_id: OrderId, patch: &OrderProjectionPatch) -> Result<()> {
        self.check_write()?;
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&order_id)
            .ok_or(ProjectionError::MissingDocument(order_id))?;
        document.apply_patch(patch);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check_write()?;
        self.documents.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, ShopItem};

    fn document(order_id: OrderId) -> OrderProjection {
        OrderProjection::created(
            order_id,
            vec![ShopItem::new("SKU-1", "Mug", 1, Money::from_dollars(10))],
            "buyer@example.com",
            "1 Main St",
        )
    }

    #[tokio::test]
    async fn insert_then_find() {
        let store = InMemoryProjectionStore::new();
        let order_id = OrderId::new();
        store.insert(document(order_id)).await.unwrap();

        let found = store.find_by_id(order_id).await.unwrap().unwrap();
        assert_eq!(found.order_id, order_id);
        assert!(store.find_by_id(OrderId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryProjectionStore::new();
        let order_id = OrderId::new();
        store.insert(document(order_id)).await.unwrap();

        let err = store.insert(document(order_id)).await.unwrap_err();
        assert!(matches!(err, ProjectionError::DocumentExists(id) if id == order_id));
    }

    #[tokio::test]
    async fn update_of_missing_document_is_distinguishable() {
        let store = InMemoryProjectionStore::new();
        let order_id = OrderId::new();
        let patch = OrderProjectionPatch {
            paid: Some(true),
            ..Default::default()
        };

        let err = store.update(order_id, &patch).await.unwrap_err();
        assert!(matches!(err, ProjectionError::MissingDocument(id) if id == order_id));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = InMemoryProjectionStore::new();
        let order_id = OrderId::new();
        store.insert(document(order_id)).await.unwrap();

        let patch = OrderProjectionPatch {
            submitted: Some(true),
            ..Default::default()
        };
        store.update(order_id, &patch).await.unwrap();

        let doc = store.find_by_id(order_id).await.unwrap().unwrap();
        assert!(doc.submitted);
        assert!(doc.created);
        assert_eq!(doc.delivery_address, "1 Main St");
    }

    #[tokio::test]
    async fn unavailable_store_fails_transiently() {
        let store = InMemoryProjectionStore::new();
        store.set_unavailable(true);

        let err = store.find_by_id(OrderId::new()).await.unwrap_err();
        assert!(err.is_transient());

        store.set_unavailable(false);
        assert!(store.find_by_id(OrderId::new()).await.is_ok());
    }

    #[tokio::test]
    async fn injected_write_failures_are_consumed() {
        let store = InMemoryProjectionStore::new();
        store.fail_next_writes(1);

        assert!(store.insert(document(OrderId::new())).await.unwrap_err().is_transient());
        store.insert(document(OrderId::new())).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = InMemoryProjectionStore::new();
        store.insert(document(OrderId::new())).await.unwrap();
        store.insert(document(OrderId::new())).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.is_empty().await);
    }
}
