//! Cart line items and the persisted cart document.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use toy_store_core::{CartId, LineItemId, Product, ProductId};

use crate::storage::{PersistedSlice, keys};

/// One row in the cart: a product snapshot and how many of it.
///
/// Name, price and image are copied from the product when the line is
/// created; later catalog changes do not reach existing lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub id: LineItemId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub image: String,
    pub quantity: u32,
    /// Always `price × quantity`.
    pub total: Decimal,
}

impl CartLineItem {
    /// Snapshot `product` into a new line.
    #[must_use]
    pub fn from_product(product: &Product, quantity: u32, added_at: DateTime<Utc>) -> Self {
        Self {
            id: LineItemId::for_product(&product.id, added_at),
            product_id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            image: product.image.clone(),
            quantity,
            total: product.price * Decimal::from(quantity),
        }
    }

    /// Set the quantity and recompute the line total.
    pub fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
        self.total = self.price * Decimal::from(quantity);
    }
}

/// Persisted cart document: `{ items, cartId }`.
///
/// The open/closed drawer flag is session-only and not part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSlice {
    #[serde(default)]
    pub items: Vec<CartLineItem>,
    #[serde(default)]
    pub cart_id: Option<CartId>,
}

impl PersistedSlice for CartSlice {
    const KEY: &'static str = keys::CART;
}
