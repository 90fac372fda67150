//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures internal failures to
//! Sentry and turns every error into a shopper-facing [`Notification`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::services::analytics::AnalyticsError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::services::orders::OrderError;
use crate::services::payment::PaymentError;
use crate::storage::StorageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Persisted state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Checkout was rejected.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Analytics client could not be set up.
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad input from the shopper.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How loudly a notification should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Destructive,
}

/// A toast-style message for the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    fn destructive(title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }
}

impl AppError {
    /// Whether this is our fault rather than the shopper's.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::Config(_)
                | Self::Analytics(_)
                | Self::Internal(_)
                | Self::Auth(AuthError::Provider(_) | AuthError::PasswordHash)
        )
    }

    /// Capture internal errors to Sentry. Returns whether anything was sent.
    pub fn report(&self) -> bool {
        if !self.is_internal() {
            return false;
        }

        let event_id = sentry::capture_error(self);
        tracing::error!(
            error = %self,
            sentry_event_id = %event_id,
            "Storefront error"
        );
        true
    }

    /// Report the error and describe it for the shopper.
    #[must_use]
    pub fn into_notification(self) -> Notification {
        self.report();
        self.notification()
    }

    /// What the shopper should see. Internal details are never included.
    #[must_use]
    pub fn notification(&self) -> Notification {
        match self {
            Self::Storage(_) | Self::Config(_) | Self::Analytics(_) | Self::Internal(_) => {
                Notification::destructive("Error", "Something went wrong. Please try again.")
            }
            Self::Auth(err) => auth_notification(err),
            Self::Order(err) => order_notification(err),
            Self::Checkout(err) => match err {
                CheckoutError::NotAuthenticated => Notification::destructive(
                    "Authentication Required",
                    "Please sign in to place an order",
                ),
                CheckoutError::EmptyCart => {
                    Notification::destructive("Empty Cart", "Add something to your cart first")
                }
                CheckoutError::Address(e) => {
                    Notification::destructive("Missing Information", capitalize(&e.to_string()))
                }
                CheckoutError::MissingPaymentDetails => Notification::destructive(
                    "Payment Information Required",
                    "Please fill in all payment details",
                ),
                CheckoutError::Order(e) => order_notification(e),
            },
            Self::NotFound(what) => Notification::destructive("Not Found", format!("{what} not found")),
            Self::BadRequest(msg) => Notification::destructive("Error", msg.clone()),
        }
    }
}

fn auth_notification(err: &AuthError) -> Notification {
    let description = match err {
        AuthError::InvalidCredentials | AuthError::UserNotFound => "Invalid email or password",
        AuthError::UserAlreadyExists => "An account with this email already exists",
        AuthError::WeakPassword(msg) => return Notification::destructive("Error", msg.clone()),
        AuthError::InvalidEmail(_) => "Invalid email address",
        AuthError::PopupBlocked => "Sign-in popup was blocked",
        AuthError::RateLimited => "Too many attempts. Please try again later.",
        AuthError::Provider(_) | AuthError::PasswordHash => "Authentication failed",
    };
    Notification::destructive("Error", description)
}

fn order_notification(err: &OrderError) -> Notification {
    match err {
        OrderError::NotAuthenticated => Notification::destructive(
            "Authentication Required",
            "Please sign in to place an order",
        ),
        OrderError::NotFound(id) => Notification::destructive("Not Found", format!("Order {id} not found")),
        OrderError::InvalidTransition { from, to } => Notification::destructive(
            "Error",
            format!("An order that is {from} cannot be marked {to}"),
        ),
        OrderError::IdempotencyConflict(_) => Notification::destructive(
            "Order Conflict",
            "This checkout was already submitted with different items. Please start a new checkout.",
        ),
        OrderError::Payment(PaymentError::Declined { reason }) => {
            Notification::destructive("Payment Failed", format!("Payment declined: {reason}"))
        }
        OrderError::Payment(_) => Notification::destructive(
            "Payment Failed",
            "Failed to process payment. Please try again.",
        ),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for shopper actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "krusty-doll")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
