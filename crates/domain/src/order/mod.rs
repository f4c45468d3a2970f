//! Order aggregate and related types.

mod aggregate;
mod commands;
pub mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::*;
pub use events::{
    DeliveryAddressUpdatedData, ORDER_EVENT_TYPES, OrderCanceledData, OrderCreatedData,
    OrderDeliveredData, OrderEvent, OrderPaidData, OrderSubmittedData, OrderUpdatedData,
};
pub use service::OrderService;
pub use state::OrderStatus;
pub use value_objects::{Money, Payment, ShopItem, Sku, checked_total_price, total_price};

use thiserror::Error;

/// Business-rule violations raised by order mutators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order already created")]
    AlreadyCreated,

    #[error("Order must contain at least one shop item")]
    NoShopItems,

    #[error("Invalid quantity for {sku}: must be greater than 0")]
    InvalidQuantity { sku: String },

    #[error("Invalid price for {sku}: must not be negative")]
    InvalidPrice { sku: String },

    #[error("Order total is too large")]
    TotalOverflow,

    #[error("Account email is required")]
    AccountEmailRequired,

    #[error("Delivery address is required")]
    DeliveryAddressRequired,

    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Order is not paid")]
    NotPaid,

    #[error("Order is already submitted")]
    AlreadySubmitted,

    #[error("Order is not submitted")]
    NotSubmitted,

    #[error("Order is already canceled")]
    AlreadyCanceled,

    #[error("Order is already delivered")]
    AlreadyDelivered,
}

impl OrderError {
    /// True for malformed input, as opposed to a request the current
    /// lifecycle state forbids.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrderError::NoShopItems
                | OrderError::InvalidQuantity { .. }
                | OrderError::InvalidPrice { .. }
                | OrderError::TotalOverflow
                | OrderError::AccountEmailRequired
                | OrderError::DeliveryAddressRequired
        )
    }
}
