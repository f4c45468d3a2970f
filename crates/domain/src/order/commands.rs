//! Order commands.

use chrono::{DateTime, Utc};
use common::{AggregateId, OrderId};

use crate::command::Command;

use super::{Order, Payment, ShopItem};

/// Command to create a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub shop_items: Vec<ShopItem>,
    pub account_email: String,
    pub delivery_address: String,
}

impl CreateOrder {
    /// Creates a CreateOrder command with a generated order ID.
    pub fn new(
        shop_items: Vec<ShopItem>,
        account_email: impl Into<String>,
        delivery_address: impl Into<String>,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            shop_items,
            account_email: account_email.into(),
            delivery_address: delivery_address.into(),
        }
    }

    pub fn with_id(mut self, order_id: OrderId) -> Self {
        self.order_id = order_id;
        self
    }
}

/// Command to record the payment of an order.
#[derive(Debug, Clone)]
pub struct PayOrder {
    pub order_id: OrderId,
    pub payment: Payment,
}

impl PayOrder {
    pub fn new(order_id: OrderId, payment: Payment) -> Self {
        Self { order_id, payment }
    }
}

/// Command to submit a paid order for delivery.
#[derive(Debug, Clone)]
pub struct SubmitOrder {
    pub order_id: OrderId,
}

impl SubmitOrder {
    pub fn new(order_id: OrderId) -> Self {
        Self { order_id }
    }
}

/// Command to replace the shop items of an order.
#[derive(Debug, Clone)]
pub struct UpdateShopItems {
    pub order_id: OrderId,
    pub shop_items: Vec<ShopItem>,
}

impl UpdateShopItems {
    pub fn new(order_id: OrderId, shop_items: Vec<ShopItem>) -> Self {
        Self {
            order_id,
            shop_items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeDeliveryAddress {
    pub order_id: OrderId,
    pub delivery_address: String,
}

impl ChangeDeliveryAddress {
    pub fn new(order_id: OrderId, delivery_address: impl Into<String>) -> Self {
        Self {
            order_id,
            delivery_address: delivery_address.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub cancel_reason: String,
}

impl CancelOrder {
    pub fn new(order_id: OrderId, cancel_reason: impl Into<String>) -> Self {
        Self {
            order_id,
            cancel_reason: cancel_reason.into(),
        }
    }
}

/// Command to mark a submitted order as delivered.
#[derive(Debug, Clone)]
pub struct CompleteDelivery {
    pub order_id: OrderId,
    pub delivered_at: DateTime<Utc>,
}

impl CompleteDelivery {
    pub fn new(order_id: OrderId, delivered_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            delivered_at,
        }
    }

    /// Delivery completed now.
    pub fn now(order_id: OrderId) -> Self {
        Self::new(order_id, Utc::now())
    }
}

macro_rules! impl_order_command {
    ($($command:ty),* $(,)?) => {
        $(
            impl Command for $command {
                type Aggregate = Order;

                fn aggregate_id(&self) -> AggregateId {
                    self.order_id.aggregate_id()
                }
            }
        )*
    };
}

impl_order_command!(
    CreateOrder,
    PayOrder,
    SubmitOrder,
    UpdateShopItems,
    ChangeDeliveryAddress,
    CancelOrder,
    CompleteDelivery,
);
