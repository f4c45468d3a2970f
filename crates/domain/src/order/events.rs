//! Order domain events.
//!
//! Stored payloads are the `*Data` structs below; the envelope's
//! `event_type` carries the tag.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{Payment, ShopItem};

pub const ORDER_CREATED: &str = "OrderCreated";
pub const ORDER_PAID: &str = "OrderPaid";
pub const ORDER_SUBMITTED: &str = "OrderSubmitted";
pub const ORDER_UPDATED: &str = "OrderUpdated";
pub const ORDER_DELIVERY_ADDRESS_UPDATED: &str = "OrderDeliveryAddressUpdated";
pub const ORDER_CANCELED: &str = "OrderCanceled";
pub const ORDER_DELIVERED: &str = "OrderDelivered";

/// Every tag an order stream can contain.
pub const ORDER_EVENT_TYPES: &[&str] = &[
    ORDER_CREATED,
    ORDER_PAID,
    ORDER_SUBMITTED,
    ORDER_UPDATED,
    ORDER_DELIVERY_ADDRESS_UPDATED,
    ORDER_CANCELED,
    ORDER_DELIVERED,
];

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderCreated(OrderCreatedData),
    OrderPaid(OrderPaidData),
    OrderSubmitted(OrderSubmittedData),
    /// Shop items were replaced.
    OrderUpdated(OrderUpdatedData),
    OrderDeliveryAddressUpdated(DeliveryAddressUpdatedData),
    OrderCanceled(OrderCanceledData),
    OrderDelivered(OrderDeliveredData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => ORDER_CREATED,
            OrderEvent::OrderPaid(_) => ORDER_PAID,
            OrderEvent::OrderSubmitted(_) => ORDER_SUBMITTED,
            OrderEvent::OrderUpdated(_) => ORDER_UPDATED,
            OrderEvent::OrderDeliveryAddressUpdated(_) => ORDER_DELIVERY_ADDRESS_UPDATED,
            OrderEvent::OrderCanceled(_) => ORDER_CANCELED,
            OrderEvent::OrderDelivered(_) => ORDER_DELIVERED,
        }
    }

    fn event_types() -> &'static [&'static str] {
        ORDER_EVENT_TYPES
    }

    fn to_data(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            OrderEvent::OrderCreated(data) => serde_json::to_value(data),
            OrderEvent::OrderPaid(data) => serde_json::to_value(data),
            OrderEvent::OrderSubmitted(data) => serde_json::to_value(data),
            OrderEvent::OrderUpdated(data) => serde_json::to_value(data),
            OrderEvent::OrderDeliveryAddressUpdated(data) => serde_json::to_value(data),
            OrderEvent::OrderCanceled(data) => serde_json::to_value(data),
            OrderEvent::OrderDelivered(data) => serde_json::to_value(data),
        }
    }

    fn decode(
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        let event = match event_type {
            ORDER_CREATED => OrderEvent::OrderCreated(serde_json::from_value(data)?),
            ORDER_PAID => OrderEvent::OrderPaid(serde_json::from_value(data)?),
            ORDER_SUBMITTED => OrderEvent::OrderSubmitted(serde_json::from_value(data)?),
            ORDER_UPDATED => OrderEvent::OrderUpdated(serde_json::from_value(data)?),
            ORDER_DELIVERY_ADDRESS_UPDATED => {
                OrderEvent::OrderDeliveryAddressUpdated(serde_json::from_value(data)?)
            }
            ORDER_CANCELED => OrderEvent::OrderCanceled(serde_json::from_value(data)?),
            ORDER_DELIVERED => OrderEvent::OrderDelivered(serde_json::from_value(data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    pub shop_items: Vec<ShopItem>,
    pub account_email: String,
    pub delivery_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidData {
    pub payment: Payment,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderSubmittedData {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdatedData {
    pub shop_items: Vec<ShopItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddressUpdatedData {
    pub delivery_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCanceledData {
    pub cancel_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDeliveredData {
    pub delivery_timestamp: DateTime<Utc>,
}
