//! Placed orders and the persisted order history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use toy_store_core::{IdempotencyKey, OrderId, OrderStatus, ShippingAddress, UserId};

use super::cart::CartLineItem;
use crate::storage::{PersistedSlice, keys};

/// A placed order.
///
/// `items` is a by-value copy of the cart at submission time. Only `status`
/// and `updated_at` change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<CartLineItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    /// Gateway reference for the charge. Absent on orders saved before
    /// references were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    /// Key the order was placed under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}

/// What the caller supplies to place an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<CartLineItem>,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
}

/// An order before its owner is known.
///
/// The owner is filled in from the signed-in user when the order is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub items: Vec<CartLineItem>,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
}

impl OrderDraft {
    /// Attach the owning user.
    #[must_use]
    pub fn for_user(self, user_id: UserId) -> NewOrder {
        NewOrder {
            user_id,
            items: self.items,
            total: self.total,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
        }
    }
}

/// Persisted order history: `{ orders }`, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdersSlice {
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl PersistedSlice for OrdersSlice {
    const KEY: &'static str = keys::ORDERS;
}
