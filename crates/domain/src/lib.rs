//! Domain layer for the order service.
//!
//! This crate provides:
//! - `Aggregate` and `DomainEvent` traits with replay
//! - `CommandHandler` with optimistic-concurrency retry and a deadline
//! - the `Order` aggregate, its events and commands, and `OrderService`

pub mod aggregate;
pub mod command;
pub mod config;
pub mod error;
pub mod order;
pub mod publisher;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{Command, CommandHandler, CommandResult};
pub use config::CommandConfig;
pub use error::{DomainError, ReplayError};
pub use order::{
    CancelOrder, ChangeDeliveryAddress, CompleteDelivery, CreateOrder, Money, Order, OrderError,
    OrderEvent, OrderService, OrderStatus, PayOrder, Payment, ShopItem, Sku, SubmitOrder,
    UpdateShopItems,
};
pub use publisher::{EventPublisher, NoopPublisher};
