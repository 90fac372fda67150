//! Cart store.
//!
//! Holds the shopper's line items, the drawer visibility flag and the cart
//! identifier analytics groups events by. Every mutation completes under a
//! single write lock and then persists the cart best-effort.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;

use toy_store_core::{CartId, Product, ProductId};

use crate::models::{CartLineItem, CartSlice};
use crate::services::analytics::{self, AnalyticsSink, TrackedProduct};
use crate::storage::{PersistenceHealth, Persister, StorageError};

#[derive(Debug)]
struct CartState {
    items: Vec<CartLineItem>,
    cart_id: CartId,
    is_open: bool,
}

impl CartState {
    fn slice(&self) -> CartSlice {
        CartSlice {
            items: self.items.clone(),
            cart_id: Some(self.cart_id.clone()),
        }
    }

    fn total(&self) -> Decimal {
        self.items.iter().map(|i| i.total).sum()
    }
}

/// The shopper's cart.
#[derive(Debug)]
pub struct CartService {
    state: RwLock<CartState>,
    persister: Persister,
    analytics: Arc<dyn AnalyticsSink>,
}

impl CartService {
    /// Restore the cart from `persister`, minting a cart id if none was saved.
    #[must_use]
    pub fn load(persister: Persister, analytics: Arc<dyn AnalyticsSink>) -> Self {
        let saved: CartSlice = persister.load_or_default();
        let state = CartState {
            items: saved.items,
            cart_id: saved.cart_id.unwrap_or_else(CartId::generate),
            is_open: false,
        };

        Self {
            state: RwLock::new(state),
            persister,
            analytics,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CartState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CartState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add `quantity` of `product`.
    ///
    /// An existing line for the same product has its quantity increased; the
    /// snapshot taken when the line was created is kept. Otherwise a new line
    /// is appended. A quantity of zero changes nothing.
    pub fn add_item(&self, product: &Product, quantity: u32) {
        if quantity == 0 {
            return;
        }

        let cart_id = {
            let mut state = self.write();
            if let Some(line) = state
                .items
                .iter_mut()
                .find(|i| i.product_id == product.id)
            {
                line.set_quantity(line.quantity.saturating_add(quantity));
            } else {
                state
                    .items
                    .push(CartLineItem::from_product(product, quantity, Utc::now()));
            }
            self.persister.persist(&state.slice());
            state.cart_id.clone()
        };

        debug!(product_id = %product.id, quantity, "Added to cart");
        self.analytics.track(analytics::added_to_cart(
            &TrackedProduct::from_product(product, quantity),
            &cart_id,
        ));
    }

    /// Drop the line for `product_id`, if any.
    pub fn remove_item(&self, product_id: &ProductId) {
        let (removed, cart_id) = {
            let mut state = self.write();
            let Some(pos) = state.items.iter().position(|i| &i.product_id == product_id) else {
                return;
            };
            let line = state.items.remove(pos);
            self.persister.persist(&state.slice());
            (TrackedProduct::from(&line), state.cart_id.clone())
        };

        debug!(product_id = %product_id, "Removed from cart");
        self.analytics
            .track(analytics::removed_cart_product(&removed, &cart_id));
    }

    /// Set the quantity of the line for `product_id`.
    ///
    /// Zero or negative quantities remove the line. Unknown products are
    /// ignored.
    pub fn update_quantity(&self, product_id: &ProductId, quantity: i64) {
        if quantity <= 0 {
            self.remove_item(product_id);
            return;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);

        let mut state = self.write();
        let Some(line) = state
            .items
            .iter_mut()
            .find(|i| &i.product_id == product_id)
        else {
            return;
        };
        line.set_quantity(quantity);
        self.persister.persist(&state.slice());
        debug!(product_id = %product_id, quantity, "Updated cart quantity");
    }

    /// Empty the cart and start a new cart id.
    pub fn clear(&self) {
        let mut state = self.write();
        state.items.clear();
        state.cart_id = CartId::generate();
        self.persister.persist(&state.slice());
        debug!(cart_id = %state.cart_id, "Cart cleared");
    }

    /// Flip the drawer visibility flag.
    pub fn toggle_open(&self) {
        let mut state = self.write();
        state.is_open = !state.is_open;
    }

    /// Set the drawer visibility flag.
    pub fn set_open(&self, open: bool) {
        self.write().is_open = open;
    }

    /// Record that the shopper looked at the cart.
    pub fn view(&self) {
        let (products, cart_id, total) = {
            let state = self.read();
            let products: Vec<TrackedProduct> =
                state.items.iter().map(TrackedProduct::from).collect();
            (products, state.cart_id.clone(), state.total())
        };
        self.analytics
            .track(analytics::viewed_cart(&products, &cart_id, total));
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Sum of line totals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.read().total()
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.read()
            .items
            .iter()
            .map(|i| u64::from(i.quantity))
            .sum()
    }

    /// Snapshot of the lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<CartLineItem> {
        self.read().items.clone()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }

    #[must_use]
    pub fn cart_id(&self) -> CartId {
        self.read().cart_id.clone()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.read().is_open
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the cart now and report the outcome.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write fails.
    pub fn save(&self) -> Result<(), StorageError> {
        let slice = self.read().slice();
        self.persister.save(&slice)
    }

    /// Failure bookkeeping for background writes.
    #[must_use]
    pub const fn persistence(&self) -> &PersistenceHealth {
        self.persister.health()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::analytics::RecordingSink;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{PersistedSlice, StateStorage};

    fn product(id: &str, price: Decimal) -> Product {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("Product {id}"),
            "price": price.to_string(),
            "image": format!("/{id}.png"),
            "category": "figures",
        }))
        .unwrap()
    }

    fn cart() -> (CartService, Arc<MemoryStorage>, Arc<RecordingSink>) {
        let storage = Arc::new(MemoryStorage::new());
        let sink = Arc::new(RecordingSink::new());
        let cart = CartService::load(Persister::new(storage.clone()), sink.clone());
        (cart, storage, sink)
    }

    #[test]
    fn test_repeated_add_merges_lines() {
        let (cart, _, _) = cart();
        let p1 = product("p1", Decimal::from(10));

        cart.add_item(&p1, 2);
        assert_eq!(cart.total(), Decimal::from(20));

        cart.add_item(&p1, 1);
        let items = cart.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].total, Decimal::from(30));

        cart.update_quantity(&p1.id, 0);
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Decimal::ZERO);
    }

    #[test]
    fn test_merge_keeps_original_snapshot() {
        let (cart, _, _) = cart();
        cart.add_item(&product("p1", Decimal::from(10)), 1);
        cart.add_item(&product("p1", Decimal::from(99)), 1);

        let items = cart.items();
        assert_eq!(items[0].price, Decimal::from(10));
        assert_eq!(items[0].total, Decimal::from(20));
    }

    #[test]
    fn test_add_zero_quantity_is_noop() {
        let (cart, _, sink) = cart();
        cart.add_item(&product("p1", Decimal::ONE), 0);
        assert!(cart.is_empty());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_negative_quantity_removes() {
        let (cart, _, _) = cart();
        let p1 = product("p1", Decimal::ONE);
        let p2 = product("p2", Decimal::TWO);
        cart.add_item(&p1, 1);
        cart.add_item(&p2, 1);

        cart.update_quantity(&p1.id, -3);
        let ids: Vec<_> = cart.items().into_iter().map(|i| i.product_id).collect();
        assert_eq!(ids, vec![p2.id]);
    }

    #[test]
    fn test_update_unknown_product_is_ignored() {
        let (cart, _, _) = cart();
        cart.update_quantity(&ProductId::new("ghost"), 4);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_totals_and_counts() {
        let (cart, _, _) = cart();
        cart.add_item(&product("a", Decimal::new(1999, 2)), 2);
        cart.add_item(&product("b", Decimal::new(500, 2)), 3);
        assert_eq!(cart.total(), Decimal::new(5498, 2));
        assert_eq!(cart.item_count(), 5);
    }

    #[test]
    fn test_clear_rotates_cart_id() {
        let (cart, _, _) = cart();
        let before = cart.cart_id();
        cart.add_item(&product("p1", Decimal::ONE), 1);
        assert_eq!(cart.cart_id(), before);

        cart.clear();
        cart.add_item(&product("p1", Decimal::ONE), 1);
        assert_ne!(cart.cart_id(), before);
    }

    #[test]
    fn test_open_flag_not_persisted() {
        let (cart, storage, _) = cart();
        cart.toggle_open();
        assert!(cart.is_open());
        cart.set_open(false);
        assert!(!cart.is_open());
        cart.set_open(true);
        cart.add_item(&product("p1", Decimal::ONE), 1);

        let raw = storage.load(CartSlice::KEY).unwrap().unwrap();
        assert!(!raw.contains("isOpen"));

        let reloaded = CartService::load(Persister::new(storage), Arc::new(RecordingSink::new()));
        assert!(!reloaded.is_open());
    }

    #[test]
    fn test_reload_restores_items_and_id() {
        let (cart, storage, _) = cart();
        cart.add_item(&product("p1", Decimal::from(3)), 2);
        cart.add_item(&product("p2", Decimal::from(4)), 1);

        let reloaded = CartService::load(Persister::new(storage), Arc::new(RecordingSink::new()));
        assert_eq!(reloaded.items(), cart.items());
        assert_eq!(reloaded.cart_id(), cart.cart_id());
    }

    #[test]
    fn test_analytics_events() {
        let (cart, _, sink) = cart();
        let p1 = product("p1", Decimal::from(10));
        cart.add_item(&p1, 2);
        cart.view();
        cart.remove_item(&p1.id);
        cart.remove_item(&p1.id);

        assert_eq!(
            sink.names(),
            vec!["Added to Cart", "Viewed Cart", "Removed Cart Product"]
        );
        let added = &sink.events()[0];
        assert_eq!(
            added.property("cart id").unwrap(),
            cart.cart_id().as_str()
        );
        assert_eq!(added.property("products").unwrap()[0]["category"], "figures");
    }

    #[test]
    fn test_quota_failure_keeps_memory_state() {
        let storage = Arc::new(MemoryStorage::with_quota(16));
        let cart = CartService::load(
            Persister::new(storage),
            Arc::new(RecordingSink::new()),
        );
        cart.add_item(&product("p1", Decimal::ONE), 1);

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.persistence().failures(), 1);
        assert!(matches!(
            cart.persistence().last_error(),
            Some(StorageError::QuotaExceeded { .. })
        ));
        assert!(cart.save().is_err());
    }
}
