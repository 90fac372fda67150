//! Integration tests for order placement and order history.
//!
//! These run against an instant simulated gateway unless a test needs the
//! payment delay, in which case Tokio's clock is paused.

use std::time::Duration;

use toy_store_core::{IdempotencyKey, OrderStatus, OrderStatusPolicy, UserId};
use toy_store_integration_tests::{TestContext, address, dec, product};
use toy_store_storefront::config::{OrdersConfig, StorefrontConfig};
use toy_store_storefront::models::{NewOrder, OrderDraft};
use toy_store_storefront::services::orders::OrderError;
use toy_store_storefront::services::payment::{PaymentError, SimulatedGateway};

fn draft(ctx: &TestContext) -> OrderDraft {
    OrderDraft {
        items: ctx.state.cart().items(),
        total: ctx.state.cart().total(),
        shipping_address: address(),
        payment_method: "Credit Card".to_string(),
    }
}

fn new_order(user: &str, total: &str) -> NewOrder {
    NewOrder {
        user_id: UserId::new(user),
        items: Vec::new(),
        total: dec(total),
        shipping_address: address(),
        payment_method: "PayPal".to_string(),
    }
}

// =============================================================================
// Placement
// =============================================================================

#[tokio::test]
async fn test_create_order_requires_user() {
    let ctx = TestContext::new();
    ctx.state.cart().add_item(&product("p1", "10.00"), 1);

    let err = ctx
        .state
        .orders()
        .create_order(ctx.state.auth(), draft(&ctx), None)
        .await
        .unwrap_err();

    assert_eq!(err, OrderError::NotAuthenticated);
    assert!(ctx.state.orders().orders().is_empty());
    assert_eq!(ctx.gateway.attempts(), 0);
}

#[tokio::test]
async fn test_authenticated_order_scenario() {
    let ctx = TestContext::new();
    let user = ctx.sign_up("marge@springfield.net").await;
    let cart = ctx.state.cart();
    cart.add_item(&product("blocks", "20.00"), 1);
    cart.add_item(&product("crayons", "5.00"), 1);
    cart.add_item(&product("paint", "10.00"), 2);
    assert_eq!(cart.total(), dec("45.00"));
    let lines = cart.items().len();

    let order = ctx
        .state
        .orders()
        .create_order(ctx.state.auth(), draft(&ctx), None)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.total, dec("45.00"));
    assert_eq!(order.items.len(), lines);
    assert_eq!(order.user_id, user.uid);
    assert_eq!(order.created_at, order.updated_at);
    assert!(order.payment_reference.unwrap().starts_with("pay_"));
}

#[tokio::test]
async fn test_order_items_are_a_snapshot() {
    let ctx = TestContext::new();
    ctx.sign_up("lisa@springfield.net").await;
    let sax = product("sax", "40.00");
    ctx.state.cart().add_item(&sax, 1);

    let order = ctx
        .state
        .orders()
        .create_order(ctx.state.auth(), draft(&ctx), None)
        .await
        .unwrap();

    ctx.state.cart().update_quantity(&sax.id, 9);
    ctx.state.cart().add_item(&product("reed", "2.00"), 3);
    ctx.state.cart().clear();

    let stored = ctx.state.orders().get_order_by_id(&order.id).unwrap();
    assert_eq!(stored.items, order.items);
    assert_eq!(stored.items[0].quantity, 1);
    assert_eq!(stored.total, dec("40.00"));
}

#[tokio::test(start_paused = true)]
async fn test_order_waits_for_payment_delay() {
    let ctx = TestContext::with_gateway(SimulatedGateway::new(Duration::from_millis(3000)));
    let started = tokio::time::Instant::now();

    ctx.state
        .orders()
        .add_order(new_order("u1", "12.00"), None)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(3000));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_payment_timeout_appends_nothing() {
    let config = StorefrontConfig {
        orders: OrdersConfig {
            payment_timeout: Duration::from_millis(500),
            ..OrdersConfig::default()
        },
        ..StorefrontConfig::default()
    };
    let ctx = TestContext::build(
        config,
        std::sync::Arc::new(toy_store_storefront::storage::memory::MemoryStorage::new()),
        SimulatedGateway::new(Duration::from_secs(5)),
    );

    let err = ctx
        .state
        .orders()
        .add_order(new_order("u1", "12.00"), None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        OrderError::Payment(PaymentError::Timeout(Duration::from_millis(500)))
    );
    assert!(ctx.state.orders().orders().is_empty());
}

#[tokio::test]
async fn test_declined_payment_appends_nothing() {
    let ctx = TestContext::with_gateway(
        SimulatedGateway::new(Duration::ZERO).declining("insufficient funds"),
    );

    let err = ctx
        .state
        .orders()
        .add_order(new_order("u1", "12.00"), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::Payment(PaymentError::Declined { ref reason }) if reason == "insufficient funds"
    ));
    assert!(ctx.state.orders().orders().is_empty());
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn test_duplicate_key_yields_one_order() {
    let ctx = TestContext::new();
    let key = IdempotencyKey::new("checkout-42");
    let orders = ctx.state.orders();

    let (first, second) = tokio::join!(
        orders.add_order(new_order("u1", "30.00"), Some(key.clone())),
        orders.add_order(new_order("u1", "30.00"), Some(key.clone())),
    );
    let third = orders
        .add_order(new_order("u1", "30.00"), Some(key))
        .await
        .unwrap();

    let first = first.unwrap();
    assert_eq!(first, second.unwrap());
    assert_eq!(first, third);
    assert_eq!(orders.orders().len(), 1);
    assert_eq!(ctx.gateway.attempts(), 1);
}

#[tokio::test]
async fn test_failed_attempt_can_be_retried_with_same_key() {
    let ctx = TestContext::with_gateway(SimulatedGateway::new(Duration::ZERO).failing_first(1));
    let key = IdempotencyKey::new("retry-me");
    let orders = ctx.state.orders();

    let err = orders
        .add_order(new_order("u1", "8.00"), Some(key.clone()))
        .await
        .unwrap_err();
    assert!(matches!(&err, OrderError::Payment(e) if e.is_retryable()));

    orders
        .add_order(new_order("u1", "8.00"), Some(key))
        .await
        .unwrap();
    assert_eq!(orders.orders().len(), 1);
    assert_eq!(ctx.gateway.attempts(), 2);
}

#[tokio::test]
async fn test_orders_without_key_are_distinct() {
    let ctx = TestContext::new();
    let orders = ctx.state.orders();

    let a = orders.add_order(new_order("u1", "1.00"), None).await.unwrap();
    let b = orders.add_order(new_order("u1", "1.00"), None).await.unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(orders.orders().len(), 2);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_user_orders_filter_preserves_order() {
    let ctx = TestContext::new();
    let orders = ctx.state.orders();
    let mut placed = Vec::new();
    for (user, total) in [("u1", "1.00"), ("u2", "2.00"), ("u1", "3.00"), ("u3", "4.00"), ("u1", "5.00")] {
        placed.push(orders.add_order(new_order(user, total), None).await.unwrap());
    }

    let expected: Vec<_> = placed
        .iter()
        .filter(|o| o.user_id.as_str() == "u1")
        .cloned()
        .collect();
    assert_eq!(orders.get_user_orders(&UserId::new("u1")), expected);
    assert!(orders.get_user_orders(&UserId::new("nobody")).is_empty());
    assert_eq!(orders.orders(), placed);
}

// =============================================================================
// Status policy
// =============================================================================

#[tokio::test]
async fn test_strict_policy_rejects_going_backwards() {
    let ctx = TestContext::new();
    let orders = ctx.state.orders();
    assert_eq!(orders.status_policy(), OrderStatusPolicy::Strict);
    let order = orders.add_order(new_order("u1", "9.00"), None).await.unwrap();

    orders
        .update_order_status(&order.id, OrderStatus::Shipped)
        .unwrap();
    let delivered = orders
        .update_order_status(&order.id, OrderStatus::Delivered)
        .unwrap();
    assert!(delivered.updated_at >= order.updated_at);

    let err = orders
        .update_order_status(&order.id, OrderStatus::Pending)
        .unwrap_err();
    assert_eq!(
        err,
        OrderError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Pending,
        }
    );
    assert_eq!(
        orders.get_order_by_id(&order.id).unwrap().status,
        OrderStatus::Delivered
    );
}

#[tokio::test]
async fn test_unrestricted_policy_accepts_any_change() {
    let ctx = TestContext::with_config(StorefrontConfig {
        orders: OrdersConfig {
            status_policy: OrderStatusPolicy::Unrestricted,
            ..OrdersConfig::default()
        },
        ..StorefrontConfig::default()
    });
    let orders = ctx.state.orders();
    let order = orders.add_order(new_order("u1", "9.00"), None).await.unwrap();

    orders
        .update_order_status(&order.id, OrderStatus::Delivered)
        .unwrap();
    let reverted = orders
        .update_order_status(&order.id, OrderStatus::Pending)
        .unwrap();

    assert_eq!(reverted.status, OrderStatus::Pending);
    assert_eq!(reverted.items, order.items);
    assert_eq!(reverted.total, order.total);
}
