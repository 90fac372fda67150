//! Product analytics.
//!
//! Tracking is fire-and-forget: [`AnalyticsSink::track`] never blocks, never
//! fails, and is never awaited by the business operation it annotates.
//!
//! # Sinks
//!
//! - [`AmplitudeClient`] - posts each event to the Amplitude HTTP API on a
//!   spawned task
//! - [`NoopSink`] - used when no API key is configured
//! - [`RecordingSink`] - keeps events in memory for assertions

use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::task::JoinSet;
use url::Url;

use toy_store_core::{CartId, OrderId, Product, ProductId, UserId};

use crate::config::AnalyticsConfig;
use crate::models::{CartLineItem, DeviceSlice};
use crate::storage::Persister;

/// Request timeout for event delivery.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors constructing an analytics client.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// HTTP client could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No API key configured.
    #[error("analytics API key not configured")]
    MissingApiKey,
}

/// A named event with a free-form property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsEvent {
    pub name: String,
    pub properties: Map<String, Value>,
    pub time: DateTime<Utc>,
}

impl AnalyticsEvent {
    /// An event with no properties, stamped now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Map::new(),
            time: Utc::now(),
        }
    }

    /// Add a property.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    /// Look up a property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Destination for analytics events.
pub trait AnalyticsSink: Send + Sync + fmt::Debug {
    /// Record an event. Must return promptly and must not panic.
    fn track(&self, event: AnalyticsEvent);

    /// Associate subsequent events with a user, or clear the association.
    fn identify(&self, _user: Option<&UserId>) {}

    /// Hand over deliveries that are still running, if the sink has any.
    fn take_in_flight(&self) -> Option<JoinSet<()>> {
        None
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl AnalyticsSink for NoopSink {
    fn track(&self, _event: AnalyticsEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AnalyticsEvent>>,
    user: RwLock<Option<UserId>>,
}

impl RecordingSink {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything tracked so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of everything tracked so far, oldest first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }

    /// The user passed to the latest `identify` call.
    #[must_use]
    pub fn identified_user(&self) -> Option<UserId> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AnalyticsSink for RecordingSink {
    fn track(&self, event: AnalyticsEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn identify(&self, user: Option<&UserId>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user.cloned();
    }
}

// =============================================================================
// Amplitude
// =============================================================================

/// Amplitude HTTP V2 client.
///
/// Each event is delivered on its own Tokio task, tracked until it finishes
/// or is handed to [`AnalyticsSink::take_in_flight`]. Delivery failures are
/// logged at `warn` and otherwise dropped. Without a running runtime,
/// events are dropped with a warning.
pub struct AmplitudeClient {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: Url,
    device_id: String,
    user: RwLock<Option<UserId>>,
    in_flight: Mutex<JoinSet<()>>,
}

impl fmt::Debug for AmplitudeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmplitudeClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[REDACTED]")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    api_key: &'a str,
    events: [UploadEvent<'a>; 1],
}

#[derive(Serialize)]
struct UploadEvent<'a> {
    event_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    device_id: &'a str,
    time: i64,
    event_properties: &'a Map<String, Value>,
}

impl AmplitudeClient {
    /// Create a client from configuration.
    ///
    /// The device id is read from `persister`, and minted and saved there on
    /// first use, so every session on this machine reports the same device.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::MissingApiKey`] when no key is configured, or
    /// an HTTP error if the client fails to build.
    pub fn new(config: &AnalyticsConfig, persister: &Persister) -> Result<Self, AnalyticsError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(AnalyticsError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint.clone(),
            device_id: device_id(persister),
            user: RwLock::new(None),
            in_flight: Mutex::new(JoinSet::new()),
        })
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn payload(&self, event: &AnalyticsEvent) -> Value {
        let user = self.user.read().unwrap_or_else(PoisonError::into_inner);
        let request = UploadRequest {
            api_key: self.api_key.expose_secret(),
            events: [UploadEvent {
                event_type: &event.name,
                user_id: user.as_ref().map(UserId::as_str),
                device_id: &self.device_id,
                time: event.time.timestamp_millis(),
                event_properties: &event.properties,
            }],
        };
        serde_json::to_value(request).unwrap_or(Value::Null)
    }
}

fn device_id(persister: &Persister) -> String {
    let saved: DeviceSlice = persister.load_or_default();
    if let Some(id) = saved.device_id {
        return id;
    }

    let id = format!("device-{}", CartId::generate());
    persister.persist(&DeviceSlice {
        device_id: Some(id.clone()),
    });
    id
}

impl AnalyticsSink for AmplitudeClient {
    fn track(&self, event: AnalyticsEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(event = %event.name, "No async runtime, dropping analytics event");
            return;
        };

        let body = self.payload(&event);
        let request = self.client.post(self.endpoint.clone()).json(&body);
        let name = event.name;

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn_on(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(event = %name, "Analytics event delivered");
                }
                Ok(resp) => {
                    tracing::warn!(event = %name, status = %resp.status(), "Analytics event rejected");
                }
                Err(e) => {
                    tracing::warn!(event = %name, error = %e, "Analytics delivery failed");
                }
            }
        }, &runtime);
    }

    fn identify(&self, user: Option<&UserId>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user.cloned();
    }

    fn take_in_flight(&self) -> Option<JoinSet<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Some(std::mem::take(&mut *in_flight))
    }
}

// =============================================================================
// Events
// =============================================================================

/// How the user authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Google,
    Email,
}

impl AccountType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Email => "email",
        }
    }
}

/// A product as it appears in event payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedProduct {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
    pub quantity: u32,
}

impl TrackedProduct {
    /// A catalog product at a given quantity.
    #[must_use]
    pub fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            category: Some(product.category.clone()).filter(|c| !c.is_empty()),
            quantity,
        }
    }

    fn to_value(&self) -> Value {
        let revenue = self.price * Decimal::from(self.quantity);
        json!({
            "product_id": self.product_id.as_str(),
            "sku": self.product_id.as_str(),
            "name": self.name,
            "price": self.price.to_string(),
            "category": self.category,
            "quantity": self.quantity,
            "revenue": revenue.to_string(),
        })
    }
}

impl From<&CartLineItem> for TrackedProduct {
    fn from(line: &CartLineItem) -> Self {
        Self {
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            price: line.price,
            category: None,
            quantity: line.quantity,
        }
    }
}

fn products_value(products: &[TrackedProduct]) -> Value {
    Value::Array(products.iter().map(TrackedProduct::to_value).collect())
}

fn cart_size(products: &[TrackedProduct]) -> u64 {
    products.iter().map(|p| u64::from(p.quantity)).sum()
}

/// Details recorded when an order completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedOrder<'a> {
    pub order_id: &'a OrderId,
    pub cart_total: Decimal,
    pub order_total: Decimal,
    pub payment_method: &'a str,
}

/// `Signed in`
#[must_use]
pub fn signed_in(account_type: AccountType) -> AnalyticsEvent {
    AnalyticsEvent::new("Signed in").with("account type", account_type.as_str())
}

/// `Started Signup`
#[must_use]
pub fn started_signup() -> AnalyticsEvent {
    AnalyticsEvent::new("Started Signup")
}

/// `Created Account`
#[must_use]
pub fn created_account(account_type: AccountType) -> AnalyticsEvent {
    AnalyticsEvent::new("Created Account").with("account type", account_type.as_str())
}

/// `Viewed Product Details`
#[must_use]
pub fn viewed_product_details(product: &Product, page_source: &str) -> AnalyticsEvent {
    AnalyticsEvent::new("Viewed Product Details")
        .with(
            "products",
            products_value(&[TrackedProduct::from_product(product, 1)]),
        )
        .with("page source", page_source)
}

/// `Favorited Product`
#[must_use]
pub fn favorited_product(product_id: &ProductId) -> AnalyticsEvent {
    AnalyticsEvent::new("Favorited Product")
        .with("products", json!([{ "product_id": product_id.as_str() }]))
}

/// `Removed Favorites`
#[must_use]
pub fn removed_favorite(product_id: &ProductId) -> AnalyticsEvent {
    AnalyticsEvent::new("Removed Favorites")
        .with("products", json!([{ "product_id": product_id.as_str() }]))
}

/// `Added to Cart`
#[must_use]
pub fn added_to_cart(product: &TrackedProduct, cart_id: &CartId) -> AnalyticsEvent {
    AnalyticsEvent::new("Added to Cart")
        .with("products", products_value(std::slice::from_ref(product)))
        .with("cart id", cart_id.as_str())
}

/// `Viewed Cart`
#[must_use]
pub fn viewed_cart(products: &[TrackedProduct], cart_id: &CartId, total: Decimal) -> AnalyticsEvent {
    AnalyticsEvent::new("Viewed Cart")
        .with("products", products_value(products))
        .with("cart id", cart_id.as_str())
        .with("total cart size", cart_size(products))
        .with("total cart value", total.to_string())
}

/// `Removed Cart Product`
#[must_use]
pub fn removed_cart_product(product: &TrackedProduct, cart_id: &CartId) -> AnalyticsEvent {
    AnalyticsEvent::new("Removed Cart Product")
        .with("cart id", cart_id.as_str())
        .with("products", products_value(std::slice::from_ref(product)))
}

/// `Started Checkout`
#[must_use]
pub fn started_checkout(
    products: &[TrackedProduct],
    cart_id: &CartId,
    total: Decimal,
) -> AnalyticsEvent {
    AnalyticsEvent::new("Started Checkout")
        .with("products", products_value(products))
        .with("cart id", cart_id.as_str())
        .with("total cart size", cart_size(products))
        .with("total cart value", total.to_string())
}

/// `Submitted Order`
#[must_use]
pub fn submitted_order(
    products: &[TrackedProduct],
    cart_id: &CartId,
    cart_total: Decimal,
    order_total: Decimal,
    payment_method: &str,
) -> AnalyticsEvent {
    AnalyticsEvent::new("Submitted Order")
        .with("products", products_value(products))
        .with("cart id", cart_id.as_str())
        .with("total cart value", cart_total.to_string())
        .with("total cart size", cart_size(products))
        .with("order total", order_total.to_string())
        .with("payment method", payment_method)
}

/// `Completed Order`
#[must_use]
pub fn completed_order(
    products: &[TrackedProduct],
    cart_id: &CartId,
    order: &CompletedOrder<'_>,
) -> AnalyticsEvent {
    AnalyticsEvent::new("Completed Order")
        .with("products", products_value(products))
        .with("cart id", cart_id.as_str())
        .with("total cart value", order.cart_total.to_string())
        .with("total cart size", cart_size(products))
        .with("order total", order.order_total.to_string())
        .with("payment method", order.payment_method)
        .with("order id", order.order_id.as_str())
        .with("$revenue", order.order_total.to_string())
}

/// `Encountered Error`
#[must_use]
pub fn encountered_error(error_type: &str, error_name: &str, code: Option<&str>) -> AnalyticsEvent {
    let event = AnalyticsEvent::new("Encountered Error")
        .with("error type", error_type)
        .with("error name", error_name);
    match code {
        Some(code) => event.with("error code", code),
        None => event,
    }
}
