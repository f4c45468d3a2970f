//! Order service: one method per business command.

use std::sync::Arc;

use common::OrderId;
use event_store::EventStore;

use crate::command::{Command, CommandHandler, CommandResult};
use crate::config::CommandConfig;
use crate::error::DomainError;
use crate::publisher::EventPublisher;

use super::{
    CancelOrder, ChangeDeliveryAddress, CompleteDelivery, CreateOrder, Order, PayOrder,
    SubmitOrder, UpdateShopItems,
};

/// Service for managing orders.
///
/// Wraps a [`CommandHandler`] for the order aggregate. Command data is
/// cloned into the mutator on every attempt, so a retried command always
/// starts from the freshly loaded state.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    /// Creates a service with default command configuration and no publisher.
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_config(self, config: CommandConfig) -> Self {
        Self {
            handler: self.handler.with_config(config),
        }
    }

    pub fn with_publisher(self, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            handler: self.handler.with_publisher(publisher),
        }
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn create_order(
        &self,
        cmd: CreateOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        let stream = cmd.aggregate_id();
        let CreateOrder {
            order_id,
            shop_items,
            account_email,
            delivery_address,
        } = cmd;

        self.handler
            .execute_new(stream, |order| {
                order.create(
                    order_id,
                    shop_items.clone(),
                    account_email.as_str(),
                    delivery_address.as_str(),
                )
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn pay_order(&self, cmd: PayOrder) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.aggregate_id(), |order| {
                order.pay(cmd.payment.clone())
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn submit_order(
        &self,
        cmd: SubmitOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.aggregate_id(), |order| order.submit())
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn update_shop_items(
        &self,
        cmd: UpdateShopItems,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.aggregate_id(), |order| {
                order.update_shop_items(cmd.shop_items.clone())
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn change_delivery_address(
        &self,
        cmd: ChangeDeliveryAddress,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.aggregate_id(), |order| {
                order.change_delivery_address(cmd.delivery_address.as_str())
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn cancel_order(
        &self,
        cmd: CancelOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.aggregate_id(), |order| {
                order.cancel(cmd.cancel_reason.as_str())
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn complete_delivery(
        &self,
        cmd: CompleteDelivery,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler
            .execute(cmd.aggregate_id(), |order| {
                order.complete_delivery(cmd.delivered_at)
            })
            .await
    }

    /// Rebuilds an order from its stream (write-side view).
    #[tracing::instrument(skip(self))]
    pub async fn load_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.handler.load_existing(order_id.aggregate_id()).await
    }
}
