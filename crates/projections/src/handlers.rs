//! Projection handlers: one pure function per order event type.
//!
//! A handler looks at an event and the current document and decides what
//! should happen to the read model. It never touches storage.

use common::OrderId;
use domain::order::{
    DeliveryAddressUpdatedData, OrderCanceledData, OrderCreatedData, OrderDeliveredData,
    OrderPaidData, OrderUpdatedData, total_price,
};
use event_store::EventEnvelope;
use serde::de::DeserializeOwned;

use crate::document::{OrderProjection, OrderProjectionPatch};
use crate::{ProjectionError, Result};

/// Signature shared by every projection handler.
pub type HandlerFn = fn(&EventEnvelope, Option<&OrderProjection>) -> Result<ProjectionChange>;

/// What a handler wants done to the read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionChange {
    Insert(OrderProjection),
    Update(OrderProjectionPatch),
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `OrderCreated` redelivered for an order that already has a document.
    AlreadyCreated,
    /// The order is canceled; later progress is not projected.
    Canceled,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::AlreadyCreated => "already_created",
            IgnoreReason::Canceled => "canceled",
        }
    }
}

/// Key of the document an event belongs to.
pub fn order_id_of(event: &EventEnvelope) -> OrderId {
    OrderId::from(event.aggregate_id)
}

fn decode<T: DeserializeOwned>(event: &EventEnvelope) -> Result<T> {
    serde_json::from_value(event.data.clone()).map_err(|source| ProjectionError::Decode {
        event_type: event.event_type.clone(),
        source,
    })
}

fn is_canceled(current: Option<&OrderProjection>) -> bool {
    current.is_some_and(|doc| doc.canceled)
}

fn update_unless_canceled(
    current: Option<&OrderProjection>,
    patch: OrderProjectionPatch,
) -> ProjectionChange {
    if is_canceled(current) {
        ProjectionChange::Ignore(IgnoreReason::Canceled)
    } else {
        ProjectionChange::Update(patch)
    }
}

pub fn on_order_created(
    event: &EventEnvelope,
    current: Option<&OrderProjection>,
) -> Result<ProjectionChange> {
    let data: OrderCreatedData = decode(event)?;
    if current.is_some() {
        return Ok(ProjectionChange::Ignore(IgnoreReason::AlreadyCreated));
    }

    let order_id = order_id_of(event);
    if data.order_id != order_id {
        tracing::warn!(
            %order_id,
            payload_order_id = %data.order_id,
            "OrderCreated payload id differs from its stream, keying by stream"
        );
    }

    Ok(ProjectionChange::Insert(OrderProjection::created(
        order_id,
        data.shop_items,
        data.account_email,
        data.delivery_address,
    )))
}

pub fn on_order_paid(
    event: &EventEnvelope,
    current: Option<&OrderProjection>,
) -> Result<ProjectionChange> {
    let data: OrderPaidData = decode(event)?;
    Ok(update_unless_canceled(
        current,
        OrderProjectionPatch {
            paid: Some(true),
            payment: Some(data.payment),
            ..Default::default()
        },
    ))
}

pub fn on_order_submitted(
    _event: &EventEnvelope,
    current: Option<&OrderProjection>,
) -> Result<ProjectionChange> {
    Ok(update_unless_canceled(
        current,
        OrderProjectionPatch {
            submitted: Some(true),
            ..Default::default()
        },
    ))
}

pub fn on_order_updated(
    event: &EventEnvelope,
    current: Option<&OrderProjection>,
) -> Result<ProjectionChange> {
    let data: OrderUpdatedData = decode(event)?;
    let total = total_price(&data.shop_items);
    Ok(update_unless_canceled(
        current,
        OrderProjectionPatch {
            shop_items: Some(data.shop_items),
            total_price: Some(total),
            ..Default::default()
        },
    ))
}

pub fn on_delivery_address_updated(
    event: &EventEnvelope,
    current: Option<&OrderProjection>,
) -> Result<ProjectionChange> {
    let data: DeliveryAddressUpdatedData = decode(event)?;
    Ok(update_unless_canceled(
        current,
        OrderProjectionPatch {
            delivery_address: Some(data.delivery_address),
            ..Default::default()
        },
    ))
}

pub fn on_order_canceled(
    event: &EventEnvelope,
    _current: Option<&OrderProjection>,
) -> Result<ProjectionChange> {
    let data: OrderCanceledData = decode(event)?;
    Ok(ProjectionChange::Update(OrderProjectionPatch {
        canceled: Some(true),
        cancel_reason: Some(data.cancel_reason),
        ..Default::default()
    }))
}

pub fn on_order_delivered(
    event: &EventEnvelope,
    current: Option<&OrderProjection>,
) -> Result<ProjectionChange> {
    let data: OrderDeliveredData = decode(event)?;
    Ok(update_unless_canceled(
        current,
        OrderProjectionPatch {
            delivered: Some(true),
            delivered_at: Some(data.delivery_timestamp),
            ..Default::default()
        },
    ))
}
