//! The order read model document and its partial updates.

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Money, Payment, ShopItem};
use serde::{Deserialize, Serialize};

/// Denormalized view of one order, keyed by its business id.
///
/// Status flags only ever go from `false` to `true`. `delivering` is kept in
/// the schema for consumers that read it; no event sets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProjection {
    pub order_id: OrderId,
    pub shop_items: Vec<ShopItem>,
    pub account_email: String,
    pub delivery_address: String,
    pub total_price: Money,
    pub created: bool,
    pub paid: bool,
    pub submitted: bool,
    pub delivering: bool,
    pub delivered: bool,
    pub canceled: bool,
    pub payment: Option<Payment>,
    pub cancel_reason: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OrderProjection {
    /// A freshly created order: only `created` is set.
    pub fn created(
        order_id: OrderId,
        shop_items: Vec<ShopItem>,
        account_email: impl Into<String>,
        delivery_address: impl Into<String>,
    ) -> Self {
        let total_price = domain::order::total_price(&shop_items);
        Self {
            order_id,
            shop_items,
            account_email: account_email.into(),
            delivery_address: delivery_address.into(),
            total_price,
            created: true,
            paid: false,
            submitted: false,
            delivering: false,
            delivered: false,
            canceled: false,
            payment: None,
            cancel_reason: None,
            delivered_at: None,
        }
    }

    /// Merges `patch` into this document field by field.
    pub fn apply_patch(&mut self, patch: &OrderProjectionPatch) {
        if let Some(items) = &patch.shop_items {
            self.shop_items = items.clone();
        }
        if let Some(total) = patch.total_price {
            self.total_price = total;
        }
        if let Some(address) = &patch.delivery_address {
            self.delivery_address = address.clone();
        }
        if let Some(paid) = patch.paid {
            self.paid = paid;
        }
        if let Some(payment) = &patch.payment {
            self.payment = Some(payment.clone());
        }
        if let Some(submitted) = patch.submitted {
            self.submitted = submitted;
        }
        if let Some(canceled) = patch.canceled {
            self.canceled = canceled;
        }
        if let Some(reason) = &patch.cancel_reason {
            self.cancel_reason = Some(reason.clone());
        }
        if let Some(delivered) = patch.delivered {
            self.delivered = delivered;
        }
        if let Some(at) = patch.delivered_at {
            self.delivered_at = Some(at);
        }
    }
}

/// A partial update of an [`OrderProjection`].
///
/// Every field carries an absolute value, so applying the same patch twice
/// leaves the document unchanged. Unset fields are omitted when serialized,
/// which lets a JSON store merge the patch into the stored document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProjectionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_items: Option<Vec<ShopItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}
