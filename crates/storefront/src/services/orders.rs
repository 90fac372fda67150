//! Orders store.
//!
//! Placing an order charges the shopper through the configured
//! [`PaymentGateway`] and, once the charge succeeds, appends a new order in
//! `processing` status to the history. The charge is the only await; the
//! history itself is only touched synchronously under its lock.
//!
//! Callers may pass an [`IdempotencyKey`]. Keys are scoped to the ordering
//! user. Calls sharing a key within the configured window are coalesced: the
//! gateway is charged once and every caller receives the same order. The key
//! is stored on the order, so a later session replays it instead of charging
//! again. Reusing a key for different items or a different total is a
//! conflict. Failures are not remembered, so retrying with the same key after
//! an error charges again.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::{TimeDelta, Utc};
use moka::future::Cache;
use thiserror::Error;
use tracing::{info, instrument, warn};

use rust_decimal::Decimal;

use toy_store_core::{
    IdempotencyKey, OrderId, OrderStatus, OrderStatusPolicy, Price, ProductId, UserId,
};

use crate::config::OrdersConfig;
use crate::models::{CartLineItem, NewOrder, Order, OrderDraft, OrdersSlice};
use crate::services::auth::AuthStore;
use crate::services::payment::{ChargeRequest, PaymentError, PaymentGateway};
use crate::storage::{PersistenceHealth, Persister, StorageError};

/// Upper bound on remembered idempotency keys.
const MAX_REMEMBERED_KEYS: u64 = 10_000;

/// Errors from order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// No signed-in user to own the order.
    #[error("user must be authenticated to create an order")]
    NotAuthenticated,

    /// No order with this id.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// The status policy forbids this change.
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The key already placed an order with different contents.
    #[error("idempotency key {0} was already used for a different order")]
    IdempotencyConflict(IdempotencyKey),

    /// The charge failed.
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// What a keyed order must match to be replayed: lines and total.
#[derive(Debug, PartialEq, Eq)]
struct Fingerprint {
    lines: Vec<(ProductId, u32, Decimal)>,
    total: Decimal,
}

impl Fingerprint {
    fn of<'a>(lines: impl Iterator<Item = &'a CartLineItem>, total: Decimal) -> Self {
        Self {
            lines: lines
                .map(|l| (l.product_id.clone(), l.quantity, l.price))
                .collect(),
            total,
        }
    }
}

/// Order history and order placement.
pub struct OrderService {
    orders: RwLock<Vec<Order>>,
    persister: Persister,
    gateway: Arc<dyn PaymentGateway>,
    config: OrdersConfig,
    placed: Cache<(UserId, IdempotencyKey), Order>,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("orders", &self.read().len())
            .field("gateway", &self.gateway)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrderService {
    /// Restore the history from `persister`.
    #[must_use]
    pub fn load(
        persister: Persister,
        gateway: Arc<dyn PaymentGateway>,
        config: OrdersConfig,
    ) -> Self {
        let saved: OrdersSlice = persister.load_or_default();
        let placed = Cache::builder()
            .max_capacity(MAX_REMEMBERED_KEYS)
            .time_to_live(config.idempotency_ttl)
            .build();

        Self {
            orders: RwLock::new(saved.orders),
            persister,
            gateway,
            config,
            placed,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Order>> {
        self.orders.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// The transition policy in force.
    #[must_use]
    pub const fn status_policy(&self) -> OrderStatusPolicy {
        self.config.status_policy
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Charge for and record an order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Payment`] if the charge fails or times out. The
    /// history is unchanged in that case. Returns
    /// [`OrderError::IdempotencyConflict`] if the user already placed a
    /// different order under the same key.
    pub async fn add_order(
        &self,
        new_order: NewOrder,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Order, OrderError> {
        let Some(key) = idempotency_key else {
            return self.place(new_order, None).await;
        };

        let expected = Fingerprint::of(new_order.items.iter(), new_order.total);
        let order = self
            .placed
            .try_get_with(
                (new_order.user_id.clone(), key.clone()),
                self.place_keyed(new_order, key.clone()),
            )
            .await
            .map_err(|e| (*e).clone())?;

        if Fingerprint::of(order.items.iter(), order.total) != expected {
            warn!(order_id = %order.id, idempotency_key = %key, "Idempotency key reused for a different order");
            return Err(OrderError::IdempotencyConflict(key));
        }
        Ok(order)
    }

    /// The order `user_id` placed under `key` within the replay window.
    #[must_use]
    pub fn find_by_key(&self, user_id: &UserId, key: &IdempotencyKey) -> Option<Order> {
        let window = TimeDelta::from_std(self.config.idempotency_ttl).ok();
        let now = Utc::now();
        self.read()
            .iter()
            .find(|o| {
                &o.user_id == user_id
                    && o.idempotency_key.as_ref() == Some(key)
                    && window.is_none_or(|w| now.signed_duration_since(o.created_at) <= w)
            })
            .cloned()
    }

    /// Place an order for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotAuthenticated`] without charging anything if
    /// nobody is signed in, otherwise as [`OrderService::add_order`].
    pub async fn create_order(
        &self,
        auth: &AuthStore,
        draft: OrderDraft,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Order, OrderError> {
        let user = auth.user().ok_or(OrderError::NotAuthenticated)?;
        self.add_order(draft.for_user(user.uid), idempotency_key)
            .await
    }

    async fn place_keyed(&self, new_order: NewOrder, key: IdempotencyKey) -> Result<Order, OrderError> {
        if let Some(existing) = self.find_by_key(&new_order.user_id, &key) {
            info!(order_id = %existing.id, idempotency_key = %key, "Replaying recorded order");
            return Ok(existing);
        }
        self.place(new_order, Some(key)).await
    }

    #[instrument(
        skip(self, new_order),
        fields(user_id = %new_order.user_id, total = %new_order.total, idempotency_key = tracing::field::Empty)
    )]
    async fn place(
        &self,
        new_order: NewOrder,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Order, OrderError> {
        if let Some(key) = &idempotency_key {
            tracing::Span::current().record("idempotency_key", key.as_str());
        }

        let request = ChargeRequest {
            amount: Price::usd(new_order.total),
            method: new_order.payment_method.clone(),
            idempotency_key: idempotency_key.clone(),
        };
        let timeout = self.config.payment_timeout;
        let receipt = tokio::time::timeout(timeout, self.gateway.charge(request))
            .await
            .map_err(|_| PaymentError::Timeout(timeout))??;

        let now = Utc::now();
        let order = Order {
            id: OrderId::generate(),
            user_id: new_order.user_id,
            items: new_order.items,
            total: new_order.total,
            status: OrderStatus::Processing,
            shipping_address: new_order.shipping_address,
            payment_method: new_order.payment_method,
            payment_reference: Some(receipt.reference),
            idempotency_key,
            created_at: now,
            updated_at: now,
        };

        {
            let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
            orders.push(order.clone());
            self.persister.persist(&OrdersSlice {
                orders: orders.clone(),
            });
        }

        info!(order_id = %order.id, items = order.items.len(), "Order placed");
        Ok(order)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[must_use]
    pub fn get_order_by_id(&self, id: &OrderId) -> Option<Order> {
        self.read().iter().find(|o| &o.id == id).cloned()
    }

    /// Orders owned by `user_id`, oldest first.
    #[must_use]
    pub fn get_user_orders(&self, user_id: &UserId) -> Vec<Order> {
        self.read()
            .iter()
            .filter(|o| &o.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Every order, oldest first.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.read().clone()
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Move an order to `status` and bump its `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`] for unknown ids and
    /// [`OrderError::InvalidTransition`] when the policy forbids the change.
    pub fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let order = orders
            .iter_mut()
            .find(|o| &o.id == id)
            .ok_or_else(|| OrderError::NotFound(id.clone()))?;

        let from = order.status;
        if !self.config.status_policy.allows(from, status) {
            return Err(OrderError::InvalidTransition { from, to: status });
        }

        order.status = status;
        order.updated_at = Utc::now();
        let updated = order.clone();

        self.persister.persist(&OrdersSlice {
            orders: orders.clone(),
        });
        drop(orders);

        info!(order_id = %id, %from, to = %status, "Order status updated");
        Ok(updated)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the history now and report the outcome.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write fails.
    pub fn save(&self) -> Result<(), StorageError> {
        self.persister.save(&OrdersSlice {
            orders: self.orders(),
        })
    }

    #[must_use]
    pub const fn persistence(&self) -> &PersistenceHealth {
        self.persister.health()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use toy_store_core::{AuthenticatedUser, Product, ShippingAddress};

    use super::*;
    use crate::models::CartLineItem;
    use crate::services::payment::SimulatedGateway;
    use crate::storage::memory::MemoryStorage;

    fn config() -> OrdersConfig {
        OrdersConfig {
            processing_delay: Duration::ZERO,
            ..OrdersConfig::default()
        }
    }

    fn service(gateway: Arc<SimulatedGateway>, config: OrdersConfig) -> (OrderService, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let service = OrderService::load(Persister::new(storage.clone()), gateway, config);
        (service, storage)
    }

    fn line(id: &str, price: i64, quantity: u32) -> CartLineItem {
        let product: Product = serde_json::from_value(serde_json::json!({
            "id": id, "name": id, "price": price.to_string(), "image": "",
        }))
        .unwrap();
        CartLineItem::from_product(&product, quantity, Utc::now())
    }

    fn new_order(user: &str) -> NewOrder {
        NewOrder {
            user_id: UserId::new(user),
            items: vec![line("p1", 45, 1)],
            total: Decimal::from(45),
            shipping_address: ShippingAddress::default(),
            payment_method: "Credit Card".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_add_order_starts_processing() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let (orders, _) = service(gateway.clone(), config());

        let order = orders.add_order(new_order("u1"), None).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.total, Decimal::from(45));
        assert_eq!(order.created_at, order.updated_at);
        assert!(order.id.as_str().starts_with("order-"));
        assert!(order.payment_reference.is_some());
        assert_eq!(orders.orders(), vec![order]);
        assert_eq!(gateway.attempts(), 1);
    }

    #[tokio::test]
    async fn test_create_order_requires_user() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let (orders, _) = service(gateway.clone(), config());
        let auth = AuthStore::default();

        let draft = OrderDraft {
            items: vec![line("p1", 45, 1)],
            total: Decimal::from(45),
            shipping_address: ShippingAddress::default(),
            payment_method: "PayPal".to_owned(),
        };
        let err = orders.create_order(&auth, draft.clone(), None).await.unwrap_err();
        assert_eq!(err, OrderError::NotAuthenticated);
        assert!(orders.orders().is_empty());
        assert_eq!(gateway.attempts(), 0);

        auth.set_user(Some(AuthenticatedUser::new("u7")));
        let order = orders.create_order(&auth, draft, None).await.unwrap();
        assert_eq!(order.user_id, UserId::new("u7"));
    }

    #[tokio::test]
    async fn test_user_orders_preserve_order() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let (orders, _) = service(gateway, config());

        let a1 = orders.add_order(new_order("a"), None).await.unwrap();
        orders.add_order(new_order("b"), None).await.unwrap();
        let a2 = orders.add_order(new_order("a"), None).await.unwrap();

        assert_eq!(orders.get_user_orders(&UserId::new("a")), vec![a1.clone(), a2]);
        assert_eq!(orders.get_order_by_id(&a1.id), Some(a1));
        assert!(orders.get_order_by_id(&OrderId::new("nope")).is_none());
    }

    #[tokio::test]
    async fn test_same_key_charges_once() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::from_millis(20)));
        let (orders, _) = service(gateway.clone(), config());
        let key = IdempotencyKey::new("checkout-1");

        let (first, second) = tokio::join!(
            orders.add_order(new_order("u1"), Some(key.clone())),
            orders.add_order(new_order("u1"), Some(key.clone())),
        );
        let third = orders.add_order(new_order("u1"), Some(key)).await.unwrap();

        assert_eq!(first.unwrap().id, third.id);
        assert_eq!(second.unwrap().id, third.id);
        assert_eq!(orders.orders().len(), 1);
        assert_eq!(gateway.attempts(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_scoped_per_user() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let (orders, _) = service(gateway.clone(), config());
        let key = IdempotencyKey::new("k");

        let mine = orders.add_order(new_order("u1"), Some(key.clone())).await.unwrap();
        let mut theirs = new_order("u2");
        theirs.items = vec![line("p2", 5, 3)];
        theirs.total = Decimal::from(15);
        let theirs = orders.add_order(theirs, Some(key)).await.unwrap();

        assert_ne!(mine.id, theirs.id);
        assert_eq!(theirs.user_id, UserId::new("u2"));
        assert_eq!(theirs.items.len(), 1);
        assert_eq!(theirs.items[0].product_id.as_str(), "p2");
        assert_eq!(orders.get_user_orders(&UserId::new("u2")), vec![theirs]);
        assert_eq!(gateway.attempts(), 2);
    }

    #[tokio::test]
    async fn test_key_reused_for_different_contents_conflicts() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let (orders, _) = service(gateway.clone(), config());
        let key = IdempotencyKey::new("k");
        orders.add_order(new_order("u1"), Some(key.clone())).await.unwrap();

        let mut changed = new_order("u1");
        changed.items = vec![line("p1", 45, 2)];
        changed.total = Decimal::from(90);
        let err = orders.add_order(changed, Some(key.clone())).await.unwrap_err();

        assert_eq!(err, OrderError::IdempotencyConflict(key));
        assert_eq!(orders.orders().len(), 1);
        assert_eq!(gateway.attempts(), 1);
    }

    #[tokio::test]
    async fn test_recorded_key_replays_after_reload() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let (orders, storage) = service(gateway.clone(), config());
        let key = IdempotencyKey::new("k");
        let first = orders.add_order(new_order("u1"), Some(key.clone())).await.unwrap();
        assert_eq!(first.idempotency_key, Some(key.clone()));

        let reloaded = OrderService::load(Persister::new(storage), gateway.clone(), config());
        let again = reloaded.add_order(new_order("u1"), Some(key.clone())).await.unwrap();

        assert_eq!(again, first);
        assert_eq!(reloaded.orders().len(), 1);
        assert_eq!(gateway.attempts(), 1);
        assert_eq!(reloaded.find_by_key(&UserId::new("u2"), &key), None);
    }

    #[tokio::test]
    async fn test_recorded_key_expires_with_window() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let config = OrdersConfig {
            idempotency_ttl: Duration::ZERO,
            ..config()
        };
        let (orders, storage) = service(gateway.clone(), config.clone());
        let key = IdempotencyKey::new("k");
        orders.add_order(new_order("u1"), Some(key.clone())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let reloaded = OrderService::load(Persister::new(storage), gateway.clone(), config);
        reloaded.add_order(new_order("u1"), Some(key)).await.unwrap();
        assert_eq!(reloaded.orders().len(), 2);
        assert_eq!(gateway.attempts(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_remembered() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO).failing_first(1));
        let (orders, _) = service(gateway.clone(), config());
        let key = IdempotencyKey::new("checkout-2");

        let err = orders
            .add_order(new_order("u1"), Some(key.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Payment(PaymentError::Network(_))));
        assert!(orders.orders().is_empty());

        orders.add_order(new_order("u1"), Some(key)).await.unwrap();
        assert_eq!(orders.orders().len(), 1);
        assert_eq!(gateway.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_charge_timeout() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::from_secs(30)));
        let config = OrdersConfig {
            payment_timeout: Duration::from_secs(10),
            ..config()
        };
        let (orders, _) = service(gateway, config);

        let err = orders.add_order(new_order("u1"), None).await.unwrap_err();
        assert_eq!(
            err,
            OrderError::Payment(PaymentError::Timeout(Duration::from_secs(10)))
        );
        assert!(orders.orders().is_empty());
    }

    #[tokio::test]
    async fn test_strict_policy() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let (orders, _) = service(gateway, config());
        let order = orders.add_order(new_order("u1"), None).await.unwrap();

        let shipped = orders
            .update_order_status(&order.id, OrderStatus::Shipped)
            .unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert!(shipped.updated_at >= order.updated_at);
        assert_eq!(shipped.created_at, order.created_at);

        orders
            .update_order_status(&order.id, OrderStatus::Delivered)
            .unwrap();
        let err = orders
            .update_order_status(&order.id, OrderStatus::Pending)
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending
            }
        );
        assert_eq!(
            orders.get_order_by_id(&order.id).unwrap().status,
            OrderStatus::Delivered
        );
    }

    #[tokio::test]
    async fn test_unrestricted_policy() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let config = OrdersConfig {
            status_policy: OrderStatusPolicy::Unrestricted,
            ..config()
        };
        let (orders, _) = service(gateway, config);
        let order = orders.add_order(new_order("u1"), None).await.unwrap();

        orders
            .update_order_status(&order.id, OrderStatus::Delivered)
            .unwrap();
        let back = orders
            .update_order_status(&order.id, OrderStatus::Pending)
            .unwrap();
        assert_eq!(back.status, OrderStatus::Pending);
    }

    #[test]
    fn test_unknown_order_status_update() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let (orders, _) = service(gateway, config());
        let err = orders
            .update_order_status(&OrderId::new("missing"), OrderStatus::Shipped)
            .unwrap_err();
        assert_eq!(err, OrderError::NotFound(OrderId::new("missing")));
    }

    #[tokio::test]
    async fn test_history_survives_reload() {
        let gateway = Arc::new(SimulatedGateway::new(Duration::ZERO));
        let (orders, storage) = service(gateway.clone(), config());
        let order = orders.add_order(new_order("u1"), None).await.unwrap();

        let reloaded = OrderService::load(Persister::new(storage), gateway, config());
        assert_eq!(reloaded.orders(), vec![order]);
    }
}
