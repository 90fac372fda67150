//! Checkout: pricing the cart, validating the form and turning the cart into
//! an order.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, instrument};

use toy_store_core::{AddressError, IdempotencyKey, PaymentMethod, ShippingAddress, round_cents};

use crate::config::PricingConfig;
use crate::models::{Order, OrderDraft};
use crate::services::analytics::{self, AnalyticsSink, CompletedOrder, TrackedProduct};
use crate::services::auth::AuthStore;
use crate::services::cart::CartService;
use crate::services::orders::{OrderError, OrderService};

/// Errors that stop an order from being placed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("please sign in to place an order")]
    NotAuthenticated,

    #[error("your cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("please fill in all payment details")]
    MissingPaymentDetails,

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl CheckoutError {
    /// Short name used in error analytics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "authentication required",
            Self::EmptyCart => "empty cart",
            Self::Address(_) => "missing information",
            Self::MissingPaymentDetails => "payment information required",
            Self::Order(OrderError::Payment(_)) => "payment failed",
            Self::Order(_) => "order failed",
        }
    }
}

/// Price breakdown shown before the shopper commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSummary {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl OrderSummary {
    /// Price a cart subtotal.
    #[must_use]
    pub fn compute(subtotal: Decimal, pricing: &PricingConfig) -> Self {
        let tax = round_cents(subtotal * pricing.tax_rate);
        let shipping = if subtotal >= pricing.free_shipping_threshold {
            Decimal::ZERO
        } else {
            pricing.shipping_fee
        };

        Self {
            subtotal,
            tax,
            shipping,
            total: subtotal + tax + shipping,
        }
    }

    /// Whether shipping is waived.
    #[must_use]
    pub fn free_shipping(&self) -> bool {
        self.shipping.is_zero()
    }
}

/// Payment fields as entered.
#[derive(Clone, PartialEq, Eq)]
pub enum PaymentDetails {
    Card {
        number: String,
        expiry: String,
        cvv: String,
        name: String,
    },
    PayPal,
}

impl fmt::Debug for PaymentDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Card { name, .. } => f
                .debug_struct("Card")
                .field("number", &"[REDACTED]")
                .field("expiry", &"[REDACTED]")
                .field("cvv", &"[REDACTED]")
                .field("name", name)
                .finish(),
            Self::PayPal => f.write_str("PayPal"),
        }
    }
}

impl PaymentDetails {
    #[must_use]
    pub const fn method(&self) -> PaymentMethod {
        match self {
            Self::Card { .. } => PaymentMethod::Card,
            Self::PayPal => PaymentMethod::PayPal,
        }
    }

    /// Card payments need a number, expiry and CVV. The cardholder name is
    /// optional.
    fn validate(&self) -> Result<(), CheckoutError> {
        match self {
            Self::Card {
                number,
                expiry,
                cvv,
                ..
            } if [number, expiry, cvv].iter().any(|f| f.trim().is_empty()) => {
                Err(CheckoutError::MissingPaymentDetails)
            }
            _ => Ok(()),
        }
    }
}

/// Everything the shopper submits at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutForm {
    pub shipping: ShippingAddress,
    pub payment: PaymentDetails,
}

/// Turns the cart into an order.
#[derive(Debug)]
pub struct CheckoutService {
    cart: Arc<CartService>,
    orders: Arc<OrderService>,
    auth: Arc<AuthStore>,
    analytics: Arc<dyn AnalyticsSink>,
    pricing: PricingConfig,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        cart: Arc<CartService>,
        orders: Arc<OrderService>,
        auth: Arc<AuthStore>,
        analytics: Arc<dyn AnalyticsSink>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            cart,
            orders,
            auth,
            analytics,
            pricing,
        }
    }

    /// Price the current cart.
    #[must_use]
    pub fn summary(&self) -> OrderSummary {
        OrderSummary::compute(self.cart.total(), &self.pricing)
    }

    /// Validate `form`, charge for the cart and record the order.
    ///
    /// On success the cart is cleared. On any failure the cart and order
    /// history are left as they were and an `Encountered Error` event is
    /// tracked. Resubmitting with the key of a completed checkout returns its
    /// order once the cart is empty.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckoutError`] naming the first problem found.
    #[instrument(skip(self, form), fields(method = %form.payment.method()))]
    pub async fn place_order(
        &self,
        form: CheckoutForm,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Order, CheckoutError> {
        let result = self.try_place_order(form, idempotency_key).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Checkout failed");
            self.analytics
                .track(analytics::encountered_error("checkout", e.name(), None));
        }
        result
    }

    async fn try_place_order(
        &self,
        form: CheckoutForm,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Order, CheckoutError> {
        if !self.auth.is_authenticated() {
            return Err(CheckoutError::NotAuthenticated);
        }
        let items = self.cart.items();
        if items.is_empty() {
            // A completed checkout already emptied the cart; hand back its order
            let recorded = idempotency_key.as_ref().zip(self.auth.user()).and_then(
                |(key, user)| self.orders.find_by_key(&user.uid, key),
            );
            return recorded.ok_or(CheckoutError::EmptyCart);
        }
        form.shipping.validate()?;
        form.payment.validate()?;

        let cart_id = self.cart.cart_id();
        let summary = OrderSummary::compute(items.iter().map(|i| i.total).sum(), &self.pricing);
        let method = form.payment.method().label();
        let products: Vec<TrackedProduct> = items.iter().map(TrackedProduct::from).collect();

        self.analytics.track(analytics::started_checkout(
            &products,
            &cart_id,
            summary.subtotal,
        ));
        self.analytics.track(analytics::submitted_order(
            &products,
            &cart_id,
            summary.subtotal,
            summary.total,
            method,
        ));

        let draft = OrderDraft {
            items,
            total: summary.total,
            shipping_address: form.shipping,
            payment_method: method.to_owned(),
        };
        let order = self
            .orders
            .create_order(&self.auth, draft, idempotency_key)
            .await?;

        self.cart.clear();
        self.analytics.track(analytics::completed_order(
            &products,
            &cart_id,
            &CompletedOrder {
                order_id: &order.id,
                cart_total: summary.subtotal,
                order_total: summary.total,
                payment_method: method,
            },
        ));

        info!(order_id = %order.id, total = %order.total, "Checkout complete");
        Ok(order)
    }
}
