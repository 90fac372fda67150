//! Payment method selection.

use core::fmt;

use serde::{Deserialize, Serialize};

/// How the customer pays. Orders record [`PaymentMethod::label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Card,
    PayPal,
}

impl PaymentMethod {
    /// Human-readable label stored on orders and sent with analytics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Card => "Credit Card",
            Self::PayPal => "PayPal",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
