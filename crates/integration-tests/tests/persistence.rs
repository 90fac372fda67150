//! Integration tests for persisted session state.
//!
//! In-memory storage stands in for the browser store; the on-disk tests use
//! a temporary directory per test.

use std::sync::Arc;
use std::time::Duration;

use toy_store_core::{OrderStatus, ProductId};
use toy_store_integration_tests::{TestContext, address, dec, product};
use toy_store_storefront::config::{OrdersConfig, StorefrontConfig};
use toy_store_storefront::services::checkout::{CheckoutForm, PaymentDetails};
use toy_store_storefront::state::AppState;
use toy_store_storefront::storage::memory::MemoryStorage;
use toy_store_storefront::storage::{StateStorage, StorageError, keys};

// =============================================================================
// Reload
// =============================================================================

#[tokio::test]
async fn test_reload_restores_every_store() {
    let ctx = TestContext::new();
    let user = ctx.sign_up("patty@springfield.net").await;
    let cart = ctx.state.cart();
    cart.add_item(&product("ashtray", "3.50"), 2);
    cart.add_item(&product("macgyver-dvd", "19.99"), 1);
    ctx.state.favorites().toggle(&ProductId::new("macgyver-dvd"));
    let order = ctx
        .state
        .orders()
        .add_order(
            toy_store_storefront::models::NewOrder {
                user_id: user.uid.clone(),
                items: cart.items(),
                total: cart.total(),
                shipping_address: address(),
                payment_method: "PayPal".to_string(),
            },
            None,
        )
        .await
        .unwrap();

    let reloaded = ctx.reload();

    assert_eq!(reloaded.state.cart().items(), cart.items());
    assert_eq!(reloaded.state.cart().cart_id(), cart.cart_id());
    assert_eq!(reloaded.state.cart().total(), dec("26.99"));
    assert!(!reloaded.state.cart().is_open());
    assert!(
        reloaded
            .state
            .favorites()
            .contains(&ProductId::new("macgyver-dvd"))
    );
    assert_eq!(reloaded.state.orders().orders(), vec![order]);
    assert_eq!(reloaded.state.auth().user(), Some(user));
    assert!(reloaded.state.auth().is_loading());
}

#[test]
fn test_corrupt_slice_starts_empty() {
    let storage: Arc<dyn StateStorage> = Arc::new(MemoryStorage::new());
    storage.save(keys::CART, "{ not json").unwrap();
    storage.save(keys::FAVORITES, r#"{"favorites": 42}"#).unwrap();

    let ctx = TestContext::with_storage(storage);

    assert!(ctx.state.cart().is_empty());
    assert_eq!(ctx.state.favorites().count(), 0);

    ctx.state.cart().add_item(&product("lard-lad", "2.00"), 1);
    assert_eq!(ctx.reload().state.cart().items().len(), 1);
}

// =============================================================================
// Write failures
// =============================================================================

#[test]
fn test_quota_failure_keeps_memory_state() {
    let storage: Arc<dyn StateStorage> = Arc::new(MemoryStorage::with_quota(64));
    let ctx = TestContext::with_storage(storage);
    let cart = ctx.state.cart();

    cart.add_item(&product("very-long-product-identifier", "1.00"), 1);
    cart.add_item(&product("another-very-long-product-identifier", "2.00"), 3);

    assert_eq!(cart.items().len(), 2);
    assert_eq!(cart.total(), dec("7.00"));
    assert!(ctx.state.persistence_failures() >= 2);
    assert!(matches!(
        cart.persistence().last_error(),
        Some(StorageError::QuotaExceeded { .. })
    ));
    assert!(matches!(cart.save(), Err(StorageError::QuotaExceeded { .. })));
}

// =============================================================================
// On disk
// =============================================================================

fn disk_config(dir: &std::path::Path) -> StorefrontConfig {
    StorefrontConfig {
        data_dir: dir.to_path_buf(),
        orders: OrdersConfig {
            processing_delay: Duration::ZERO,
            ..OrdersConfig::default()
        },
        ..StorefrontConfig::default()
    }
}

#[tokio::test]
async fn test_session_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = AppState::from_config(disk_config(dir.path())).unwrap();
    first
        .auth_service()
        .sign_up_with_email("selma@springfield.net", "jub-jub")
        .await
        .unwrap();
    first.cart().add_item(&product("iguana-food", "6.25"), 4);
    drop(first);

    let second = AppState::from_config(disk_config(dir.path())).unwrap();
    second.auth_service().sync_session();
    assert!(second.auth().is_authenticated());
    assert!(!second.auth().is_loading());

    let order = second
        .checkout()
        .place_order(
            CheckoutForm {
                shipping: address(),
                payment: PaymentDetails::PayPal,
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(order.total, dec("36.99"));
    drop(second);

    let third = AppState::from_config(disk_config(dir.path())).unwrap();
    assert!(third.cart().is_empty());
    let stored = third.orders().get_order_by_id(&order.id).unwrap();
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.items[0].quantity, 4);
}

#[tokio::test]
async fn test_sign_out_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = AppState::from_config(disk_config(dir.path())).unwrap();
    first
        .auth_service()
        .sign_up_with_email("jacqueline@springfield.net", "hmmmmm")
        .await
        .unwrap();
    first.auth_service().sign_out().await.unwrap();
    drop(first);

    let second = AppState::from_config(disk_config(dir.path())).unwrap();
    second.auth_service().sync_session();
    assert!(!second.auth().is_authenticated());

    second
        .auth_service()
        .sign_in_with_email("jacqueline@springfield.net", "hmmmmm")
        .await
        .unwrap();
    assert!(second.auth().is_authenticated());
}
