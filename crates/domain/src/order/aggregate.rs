//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, OrderId};
use event_store::Version;

use crate::aggregate::Aggregate;

use super::{
    Money, OrderError, OrderEvent, OrderStatus, Payment, ShopItem,
    events::{
        DeliveryAddressUpdatedData, OrderCanceledData, OrderCreatedData, OrderDeliveredData,
        OrderPaidData, OrderSubmittedData, OrderUpdatedData,
    },
    checked_total_price, total_price,
};

/// Order aggregate root.
///
/// State is the fold of the order's events. Mutators check the business
/// rules against that state and raise at most one event each.
#[derive(Debug, Clone, Default)]
pub struct Order {
    id: Option<OrderId>,
    version: Version,
    status: OrderStatus,
    shop_items: Vec<ShopItem>,
    account_email: String,
    delivery_address: String,
    payment: Option<Payment>,
    cancel_reason: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    uncommitted: Vec<OrderEvent>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id.map(|id| id.aggregate_id())
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::OrderCreated(data) => {
                self.id = Some(data.order_id);
                self.status = OrderStatus::Created;
                self.shop_items = data.shop_items.clone();
                self.account_email = data.account_email.clone();
                self.delivery_address = data.delivery_address.clone();
            }
            OrderEvent::OrderPaid(data) => {
                self.status = OrderStatus::Paid;
                self.payment = Some(data.payment.clone());
            }
            OrderEvent::OrderSubmitted(_) => self.status = OrderStatus::Submitted,
            OrderEvent::OrderUpdated(data) => self.shop_items = data.shop_items.clone(),
            OrderEvent::OrderDeliveryAddressUpdated(data) => {
                self.delivery_address = data.delivery_address.clone();
            }
            OrderEvent::OrderCanceled(data) => {
                self.status = OrderStatus::Canceled;
                self.cancel_reason = Some(data.cancel_reason.clone());
            }
            OrderEvent::OrderDelivered(data) => {
                self.status = OrderStatus::Delivered;
                self.delivered_at = Some(data.delivery_timestamp);
            }
        }
    }

    fn uncommitted_events(&self) -> &[OrderEvent] {
        &self.uncommitted
    }

    fn uncommitted_events_mut(&mut self) -> &mut Vec<OrderEvent> {
        &mut self.uncommitted
    }
}

// Query methods
impl Order {
    pub fn order_id(&self) -> Option<OrderId> {
        self.id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn shop_items(&self) -> &[ShopItem] {
        &self.shop_items
    }

    pub fn account_email(&self) -> &str {
        &self.account_email
    }

    pub fn delivery_address(&self) -> &str {
        &self.delivery_address
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// Sum of `price * quantity` over the current shop items.
    pub fn total_price(&self) -> Money {
        total_price(&self.shop_items)
    }
}

// Mutators
impl Order {
    /// Creates the order.
    pub fn create(
        &mut self,
        order_id: OrderId,
        shop_items: Vec<ShopItem>,
        account_email: impl Into<String>,
        delivery_address: impl Into<String>,
    ) -> Result<(), OrderError> {
        if self.status.is_created() {
            return Err(OrderError::AlreadyCreated);
        }
        validate_items(&shop_items)?;

        let account_email = account_email.into();
        if account_email.trim().is_empty() {
            return Err(OrderError::AccountEmailRequired);
        }

        self.raise_event(OrderEvent::OrderCreated(OrderCreatedData {
            order_id,
            shop_items,
            account_email,
            delivery_address: delivery_address.into(),
        }));
        Ok(())
    }

    pub fn pay(&mut self, payment: Payment) -> Result<(), OrderError> {
        self.ensure_not_canceled("pay")?;
        if self.status.is_submitted() {
            return Err(OrderError::AlreadySubmitted);
        }
        if self.status.is_paid() {
            return Err(OrderError::AlreadyPaid);
        }

        self.raise_event(OrderEvent::OrderPaid(OrderPaidData { payment }));
        Ok(())
    }

    pub fn submit(&mut self) -> Result<(), OrderError> {
        self.ensure_not_canceled("submit")?;
        if self.status.is_submitted() {
            return Err(OrderError::AlreadySubmitted);
        }
        if !self.status.is_paid() {
            return Err(OrderError::NotPaid);
        }

        self.raise_event(OrderEvent::OrderSubmitted(OrderSubmittedData {}));
        Ok(())
    }

    /// Replaces the shop items; only allowed before submission.
    pub fn update_shop_items(&mut self, shop_items: Vec<ShopItem>) -> Result<(), OrderError> {
        self.ensure_not_canceled("update shop items")?;
        if self.status.is_submitted() {
            return Err(OrderError::AlreadySubmitted);
        }
        validate_items(&shop_items)?;

        self.raise_event(OrderEvent::OrderUpdated(OrderUpdatedData { shop_items }));
        Ok(())
    }

    pub fn change_delivery_address(
        &mut self,
        delivery_address: impl Into<String>,
    ) -> Result<(), OrderError> {
        self.ensure_not_canceled("change delivery address")?;
        if self.status.is_delivered() {
            return Err(OrderError::AlreadyDelivered);
        }
        let delivery_address = delivery_address.into();
        if delivery_address.trim().is_empty() {
            return Err(OrderError::DeliveryAddressRequired);
        }

        self.raise_event(OrderEvent::OrderDeliveryAddressUpdated(
            DeliveryAddressUpdatedData { delivery_address },
        ));
        Ok(())
    }

    pub fn cancel(&mut self, cancel_reason: impl Into<String>) -> Result<(), OrderError> {
        if self.status.is_canceled() {
            return Err(OrderError::AlreadyCanceled);
        }
        if self.status.is_delivered() {
            return Err(OrderError::AlreadyDelivered);
        }

        self.raise_event(OrderEvent::OrderCanceled(OrderCanceledData {
            cancel_reason: cancel_reason.into(),
        }));
        Ok(())
    }

    pub fn complete_delivery(&mut self, delivered_at: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure_not_canceled("complete delivery")?;
        if self.status.is_delivered() {
            return Err(OrderError::AlreadyDelivered);
        }
        if !self.status.is_submitted() {
            return Err(OrderError::NotSubmitted);
        }

        self.raise_event(OrderEvent::OrderDelivered(OrderDeliveredData {
            delivery_timestamp: delivered_at,
        }));
        Ok(())
    }

    fn ensure_not_canceled(&self, action: &'static str) -> Result<(), OrderError> {
        if self.status.is_canceled() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.status,
                action,
            });
        }
        Ok(())
    }
}

fn validate_items(shop_items: &[ShopItem]) -> Result<(), OrderError> {
    if shop_items.is_empty() {
        return Err(OrderError::NoShopItems);
    }
    if let Some(item) = shop_items.iter().find(|item| item.quantity == 0) {
        return Err(OrderError::InvalidQuantity {
            sku: item.sku.to_string(),
        });
    }
    if let Some(item) = shop_items.iter().find(|item| item.price.is_negative()) {
        return Err(OrderError::InvalidPrice {
            sku: item.sku.to_string(),
        });
    }
    if checked_total_price(shop_items).is_none() {
        return Err(OrderError::TotalOverflow);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<ShopItem> {
        vec![
            ShopItem::new("SKU-1", "Mug", 2, Money::from_dollars(10)),
            ShopItem::new("SKU-2", "Plate", 1, Money::from_dollars(5)),
        ]
    }

    fn created() -> Order {
        let mut order = Order::default();
        order
            .create(OrderId::new(), items(), "buyer@example.com", "1 Main St")
            .unwrap();
        order.take_uncommitted_events();
        order
    }

    fn payment() -> Payment {
        Payment::new("pay-1", Utc::now())
    }

    #[test]
    fn create_raises_order_created() {
        let mut order = Order::default();
        let order_id = OrderId::new();

        order
            .create(order_id, items(), "buyer@example.com", "1 Main St")
            .unwrap();

        assert_eq!(order.order_id(), Some(order_id));
        assert_eq!(order.id(), Some(order_id.aggregate_id()));
        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.total_price(), Money::from_dollars(25));
        assert_eq!(order.version(), Version::first());
        assert!(matches!(
            order.uncommitted_events(),
            [OrderEvent::OrderCreated(_)]
        ));
    }

    #[test]
    fn create_validates_input() {
        let mut order = Order::default();
        let id = OrderId::new();

        assert!(matches!(
            order.create(id, vec![], "a@b.c", "x"),
            Err(OrderError::NoShopItems)
        ));
        assert!(matches!(
            order.create(
                id,
                vec![ShopItem::new("SKU-9", "Empty", 0, Money::from_cents(1))],
                "a@b.c",
                "x"
            ),
            Err(OrderError::InvalidQuantity { sku }) if sku == "SKU-9"
        ));
        assert!(matches!(
            order.create(id, items(), "   ", "x"),
            Err(OrderError::AccountEmailRequired)
        ));
        assert!(order.uncommitted_events().is_empty());
        assert_eq!(order.version(), Version::initial());
    }

    #[test]
    fn overflowing_total_is_rejected_without_an_event() {
        let mut order = Order::default();
        let huge = vec![ShopItem::new("SKU-1", "Mug", 2, Money::from_cents(i64::MAX))];
        assert!(matches!(
            order.create(OrderId::new(), huge.clone(), "a@b.c", "x"),
            Err(OrderError::TotalOverflow)
        ));
        assert!(order.uncommitted_events().is_empty());

        let mut order = created();
        assert!(matches!(
            order.update_shop_items(huge),
            Err(OrderError::TotalOverflow)
        ));
        assert!(order.uncommitted_events().is_empty());
        assert!(OrderError::TotalOverflow.is_validation());
    }

    #[test]
    fn create_twice_is_rejected() {
        let mut order = created();
        assert!(matches!(
            order.create(OrderId::new(), items(), "a@b.c", "x"),
            Err(OrderError::AlreadyCreated)
        ));
    }

    #[test]
    fn happy_path_lifecycle() {
        let mut order = created();

        order.pay(payment()).unwrap();
        order.submit().unwrap();
        order.change_delivery_address("2 Side St").unwrap();
        order.complete_delivery(Utc::now()).unwrap();

        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.delivery_address(), "2 Side St");
        assert!(order.payment().is_some());
        assert!(order.delivered_at().is_some());
        assert_eq!(order.uncommitted_events().len(), 4);
        assert_eq!(order.version(), Version::new(5));
    }

    #[test]
    fn pay_rules() {
        let mut order = created();
        order.pay(payment()).unwrap();
        assert!(matches!(order.pay(payment()), Err(OrderError::AlreadyPaid)));

        order.submit().unwrap();
        assert!(matches!(order.pay(payment()), Err(OrderError::AlreadySubmitted)));
    }

    #[test]
    fn submit_requires_payment() {
        let mut order = created();
        assert!(matches!(order.submit(), Err(OrderError::NotPaid)));

        order.pay(payment()).unwrap();
        order.submit().unwrap();
        assert!(matches!(order.submit(), Err(OrderError::AlreadySubmitted)));
    }

    #[test]
    fn update_shop_items_before_submission_only() {
        let mut order = created();
        let replacement = vec![ShopItem::new("SKU-3", "Bowl", 1, Money::from_dollars(20))];

        order.update_shop_items(replacement.clone()).unwrap();
        assert_eq!(order.total_price(), Money::from_dollars(20));
        assert!(matches!(
            order.update_shop_items(vec![]),
            Err(OrderError::NoShopItems)
        ));

        order.pay(payment()).unwrap();
        order.submit().unwrap();
        assert!(matches!(
            order.update_shop_items(replacement),
            Err(OrderError::AlreadySubmitted)
        ));
    }

    #[test]
    fn change_delivery_address_rules() {
        let mut order = created();
        assert!(matches!(
            order.change_delivery_address(" "),
            Err(OrderError::DeliveryAddressRequired)
        ));

        order.pay(payment()).unwrap();
        order.submit().unwrap();
        order.complete_delivery(Utc::now()).unwrap();
        assert!(matches!(
            order.change_delivery_address("3 Far Rd"),
            Err(OrderError::AlreadyDelivered)
        ));
    }

    #[test]
    fn canceled_order_rejects_everything() {
        let mut order = created();
        order.cancel("customer request").unwrap();
        assert_eq!(order.cancel_reason(), Some("customer request"));

        assert!(matches!(
            order.pay(payment()),
            Err(OrderError::InvalidStateTransition { current_state: OrderStatus::Canceled, .. })
        ));
        assert!(order.submit().is_err());
        assert!(order.update_shop_items(items()).is_err());
        assert!(order.change_delivery_address("x").is_err());
        assert!(order.complete_delivery(Utc::now()).is_err());
        assert!(matches!(order.cancel("again"), Err(OrderError::AlreadyCanceled)));
        assert_eq!(order.uncommitted_events().len(), 1);
    }

    #[test]
    fn delivered_order_cannot_be_canceled() {
        let mut order = created();
        order.pay(payment()).unwrap();
        order.submit().unwrap();
        order.complete_delivery(Utc::now()).unwrap();

        assert!(matches!(order.cancel("late"), Err(OrderError::AlreadyDelivered)));
    }

    #[test]
    fn delivery_requires_submission() {
        let mut order = created();
        order.pay(payment()).unwrap();
        assert!(matches!(
            order.complete_delivery(Utc::now()),
            Err(OrderError::NotSubmitted)
        ));
    }
}
