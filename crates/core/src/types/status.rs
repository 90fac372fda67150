//! Order status and the policy governing status changes.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a placed order.
///
/// New orders start at [`OrderStatus::Processing`]; `Pending` exists for
/// orders awaiting payment confirmation and is never assigned on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    #[default]
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Whether no further transition is possible under the strict policy.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Which status changes an order accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusPolicy {
    /// Forward-only lifecycle with terminal `delivered`/`cancelled`:
    ///
    /// ```text
    /// pending ──► processing ──► shipped ──► delivered
    ///    │            │
    ///    └──► cancelled ◄┘
    /// ```
    #[default]
    Strict,
    /// Any status may be assigned from any status.
    Unrestricted,
}

impl OrderStatusPolicy {
    /// Whether `from → to` is allowed. Re-assigning the current status always is.
    #[must_use]
    pub const fn allows(self, from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::{Cancelled, Delivered, Pending, Processing, Shipped};

        if matches!(self, Self::Unrestricted) || from as u8 == to as u8 {
            return true;
        }

        matches!(
            (from, to),
            (Pending, Processing | Cancelled)
                | (Processing, Shipped | Cancelled)
                | (Shipped, Delivered)
        )
    }
}

impl FromStr for OrderStatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "unrestricted" => Ok(Self::Unrestricted),
            _ => Err(format!("invalid status policy: {s}")),
        }
    }
}
