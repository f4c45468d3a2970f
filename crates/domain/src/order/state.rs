//! Order lifecycle.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// ```text
/// Created ──► Paid ──► Submitted ──► Delivered
///    │         │           │
///    └─────────┴───────────┴──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// No `OrderCreated` applied yet.
    #[default]
    New,
    Created,
    Paid,
    Submitted,
    /// Terminal.
    Delivered,
    /// Terminal.
    Canceled,
}

impl OrderStatus {
    pub fn is_created(&self) -> bool {
        !matches!(self, OrderStatus::New)
    }

    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Submitted | OrderStatus::Delivered
        )
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, OrderStatus::Submitted | OrderStatus::Delivered)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, OrderStatus::Canceled)
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "New",
            OrderStatus::Created => "Created",
            OrderStatus::Paid => "Paid",
            OrderStatus::Submitted => "Submitted",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Canceled => "Canceled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
