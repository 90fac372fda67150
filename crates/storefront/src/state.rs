//! Application state shared across the session.

use std::sync::Arc;
use std::time::Duration;

use crate::config::StorefrontConfig;
use crate::services::analytics::{AmplitudeClient, AnalyticsError, AnalyticsSink, NoopSink};
use crate::services::auth::{AuthService, AuthStore, IdentityProvider, LocalIdentityProvider};
use crate::services::cart::CartService;
use crate::services::checkout::CheckoutService;
use crate::services::favorites::FavoritesService;
use crate::services::orders::OrderService;
use crate::services::payment::{PaymentGateway, SimulatedGateway};
use crate::storage::file::FileStorage;
use crate::storage::{Persister, StateStorage};

/// Application state for one shopper session.
///
/// Built once and passed by reference. Cheaply cloneable via `Arc`. Each
/// store restores its slice from storage on construction; unreadable slices
/// are logged and start empty.
#[derive(Clone, Debug)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    config: StorefrontConfig,
    cart: Arc<CartService>,
    favorites: FavoritesService,
    orders: Arc<OrderService>,
    auth: AuthService,
    auth_store: Arc<AuthStore>,
    checkout: CheckoutService,
    identity: Arc<dyn IdentityProvider>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl AppState {
    /// Create application state over explicit collaborators.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        storage: Arc<dyn StateStorage>,
        identity: Arc<dyn IdentityProvider>,
        gateway: Arc<dyn PaymentGateway>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let persister = || Persister::new(Arc::clone(&storage));

        let cart = Arc::new(CartService::load(persister(), Arc::clone(&analytics)));
        let favorites = FavoritesService::load(persister(), Arc::clone(&analytics));
        let orders = Arc::new(OrderService::load(
            persister(),
            gateway,
            config.orders.clone(),
        ));
        let auth_store = Arc::new(AuthStore::load(persister()));
        let auth = AuthService::new(
            Arc::clone(&identity),
            Arc::clone(&auth_store),
            Arc::clone(&analytics),
        );
        let checkout = CheckoutService::new(
            Arc::clone(&cart),
            Arc::clone(&orders),
            Arc::clone(&auth_store),
            Arc::clone(&analytics),
            config.pricing,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                cart,
                favorites,
                orders,
                auth,
                auth_store,
                checkout,
                identity,
                analytics,
            }),
        }
    }

    /// Create application state from configuration alone.
    ///
    /// Uses `FileStorage` under the configured data directory, the local
    /// identity provider, the simulated gateway, and Amplitude when an API
    /// key is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the analytics client cannot be built.
    pub fn from_config(config: StorefrontConfig) -> Result<Self, AnalyticsError> {
        let storage: Arc<dyn StateStorage> = Arc::new(FileStorage::new(&config.data_dir));
        let identity = Arc::new(LocalIdentityProvider::load(Persister::new(Arc::clone(
            &storage,
        ))));
        let gateway = Arc::new(SimulatedGateway::new(config.orders.processing_delay));
        let analytics: Arc<dyn AnalyticsSink> = if config.analytics.api_key.is_some() {
            Arc::new(AmplitudeClient::new(
                &config.analytics,
                &Persister::new(Arc::clone(&storage)),
            )?)
        } else {
            tracing::debug!("AMPLITUDE_API_KEY not set, analytics disabled");
            Arc::new(NoopSink)
        };

        Ok(Self::new(config, storage, identity, gateway, analytics))
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn cart(&self) -> &CartService {
        &self.inner.cart
    }

    #[must_use]
    pub fn favorites(&self) -> &FavoritesService {
        &self.inner.favorites
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    /// The auth projection.
    #[must_use]
    pub fn auth(&self) -> &AuthStore {
        &self.inner.auth_store
    }

    /// Shared handle to the auth projection, for [`AuthStore::follow`].
    #[must_use]
    pub fn auth_handle(&self) -> Arc<AuthStore> {
        Arc::clone(&self.inner.auth_store)
    }

    /// Sign-in flows.
    #[must_use]
    pub fn auth_service(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    #[must_use]
    pub fn analytics(&self) -> &dyn AnalyticsSink {
        self.inner.analytics.as_ref()
    }

    /// Wait up to `within` for analytics deliveries still in flight.
    ///
    /// Short-lived processes call this before exiting. Deliveries still
    /// running at the deadline are abandoned.
    pub async fn flush_analytics(&self, within: Duration) {
        let Some(in_flight) = self.analytics().take_in_flight() else {
            return;
        };
        let pending = in_flight.len();
        if pending == 0 {
            return;
        }
        if tokio::time::timeout(within, in_flight.join_all()).await.is_err() {
            tracing::warn!(pending, "Abandoned analytics deliveries at shutdown");
        }
    }

    /// Total persistence failures across all stores.
    #[must_use]
    pub fn persistence_failures(&self) -> u64 {
        self.cart().persistence().failures()
            + self.favorites().persistence().failures()
            + self.orders().persistence().failures()
            + self.auth().persistence().failures()
    }
}
