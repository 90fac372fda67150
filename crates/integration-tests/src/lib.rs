//! Integration tests for the toy store.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p toy-store-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart` - Cart invariants and the pricing scenario
//! - `orders` - Order placement, idempotency, timeouts and status policy
//! - `checkout` - End-to-end checkout with analytics
//! - `persistence` - Reload, quota failures and on-disk sessions
//!
//! Every test builds its own [`TestContext`]; nothing is shared between
//! tests and no network access is needed.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use toy_store_core::{AuthenticatedUser, Product, ProductId, ShippingAddress};
use toy_store_storefront::config::StorefrontConfig;
use toy_store_storefront::services::analytics::RecordingSink;
use toy_store_storefront::services::auth::LocalIdentityProvider;
use toy_store_storefront::services::payment::SimulatedGateway;
use toy_store_storefront::state::AppState;
use toy_store_storefront::storage::memory::MemoryStorage;
use toy_store_storefront::storage::{Persister, StateStorage};

/// A session wired to in-memory collaborators that tests can inspect.
#[derive(Debug)]
pub struct TestContext {
    pub state: AppState,
    pub storage: Arc<dyn StateStorage>,
    pub identity: Arc<LocalIdentityProvider>,
    pub gateway: Arc<SimulatedGateway>,
    pub analytics: Arc<RecordingSink>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Default configuration, unbounded memory storage and an instant gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StorefrontConfig::default())
    }

    #[must_use]
    pub fn with_config(config: StorefrontConfig) -> Self {
        Self::build(
            config,
            Arc::new(MemoryStorage::new()),
            SimulatedGateway::new(Duration::ZERO),
        )
    }

    #[must_use]
    pub fn with_gateway(gateway: SimulatedGateway) -> Self {
        Self::build(
            StorefrontConfig::default(),
            Arc::new(MemoryStorage::new()),
            gateway,
        )
    }

    #[must_use]
    pub fn with_storage(storage: Arc<dyn StateStorage>) -> Self {
        Self::build(
            StorefrontConfig::default(),
            storage,
            SimulatedGateway::new(Duration::ZERO),
        )
    }

    /// Wire a session over explicit collaborators.
    #[must_use]
    pub fn build(
        config: StorefrontConfig,
        storage: Arc<dyn StateStorage>,
        gateway: SimulatedGateway,
    ) -> Self {
        let identity = Arc::new(LocalIdentityProvider::load(Persister::new(Arc::clone(
            &storage,
        ))));
        let gateway = Arc::new(gateway);
        let analytics = Arc::new(RecordingSink::new());
        let state = AppState::new(
            config,
            Arc::clone(&storage),
            Arc::<LocalIdentityProvider>::clone(&identity),
            Arc::<SimulatedGateway>::clone(&gateway),
            Arc::<RecordingSink>::clone(&analytics),
        );

        Self {
            state,
            storage,
            identity,
            gateway,
            analytics,
        }
    }

    /// A fresh session over the same storage, as after a page reload.
    #[must_use]
    pub fn reload(&self) -> Self {
        Self::build(
            self.state.config().clone(),
            Arc::clone(&self.storage),
            SimulatedGateway::new(Duration::ZERO),
        )
    }

    /// Create an account and sign it in.
    ///
    /// # Panics
    ///
    /// Panics if the account already exists.
    pub async fn sign_up(&self, email: &str) -> AuthenticatedUser {
        self.state
            .auth_service()
            .sign_up_with_email(email, "correct-horse")
            .await
            .unwrap_or_else(|e| panic!("sign up {email} failed: {e}"))
    }
}

/// A catalog product priced from a decimal string such as `"10.00"`.
///
/// # Panics
///
/// Panics if `price` is not a decimal.
#[must_use]
pub fn product(id: &str, price: &str) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Toy {id}"),
        price: price
            .parse::<Decimal>()
            .unwrap_or_else(|e| panic!("bad price {price}: {e}")),
        original_price: None,
        image: format!("/images/{id}.png"),
        category: "toys".to_string(),
        description: String::new(),
        rating: Decimal::ZERO,
        review_count: 0,
        in_stock: true,
    }
}

/// A complete shipping address.
#[must_use]
pub fn address() -> ShippingAddress {
    ShippingAddress {
        first_name: "Homer".to_string(),
        last_name: "Simpson".to_string(),
        email: "homer@springfield.net".to_string(),
        address: "742 Evergreen Terrace".to_string(),
        city: "Springfield".to_string(),
        state: "OR".to_string(),
        zip_code: "97403".to_string(),
    }
}

/// Parse a decimal literal.
///
/// # Panics
///
/// Panics if `s` is not a decimal.
#[must_use]
pub fn dec(s: &str) -> Decimal {
    s.parse()
        .unwrap_or_else(|e| panic!("bad decimal {s}: {e}"))
}
