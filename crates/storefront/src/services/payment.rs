//! Payment gateway seam.
//!
//! Orders are paid for through a [`PaymentGateway`]. The store ships only
//! [`SimulatedGateway`], which waits for a configurable processing delay and
//! then approves the charge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use toy_store_core::{IdempotencyKey, Price};

/// Payment failures.
///
/// Cloneable so a single failed charge can be reported to every caller
/// waiting on the same idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The gateway refused the charge.
    #[error("payment declined: {reason}")]
    Declined { reason: String },

    /// The gateway could not be reached.
    #[error("payment network error: {0}")]
    Network(String),

    /// The gateway did not answer in time.
    #[error("payment timed out after {0:?}")]
    Timeout(Duration),
}

impl PaymentError {
    /// Whether retrying the same charge might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Declined { .. })
    }
}

/// A request to charge the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub amount: Price,
    /// Payment method label, e.g. "Credit Card".
    pub method: String,
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Proof of a successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub reference: String,
    pub amount: Price,
    pub charged_at: DateTime<Utc>,
}

/// Something that can take money.
#[async_trait]
pub trait PaymentGateway: Send + Sync + std::fmt::Debug {
    /// Charge the shopper.
    ///
    /// # Errors
    ///
    /// Returns a [`PaymentError`] describing why the charge did not go through.
    async fn charge(&self, request: ChargeRequest) -> Result<Receipt, PaymentError>;
}

/// Gateway that sleeps for `delay` and then approves.
///
/// Declines and network failures can be scripted for tests and demos.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    delay: Duration,
    decline_reason: Option<String>,
    network_failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl SimulatedGateway {
    /// Approve every charge after `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Decline every charge with `reason`.
    #[must_use]
    pub fn declining(mut self, reason: impl Into<String>) -> Self {
        self.decline_reason = Some(reason.into());
        self
    }

    /// Fail the next `count` charges with a network error.
    #[must_use]
    pub fn failing_first(self, count: usize) -> Self {
        self.network_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Number of charges attempted so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<Receipt, PaymentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failed_over_network = self
            .network_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed_over_network {
            return Err(PaymentError::Network("connection reset".to_owned()));
        }

        if let Some(reason) = &self.decline_reason {
            return Err(PaymentError::Declined {
                reason: reason.clone(),
            });
        }

        tracing::debug!(
            amount = %request.amount,
            method = %request.method,
            "Simulated charge approved"
        );

        Ok(Receipt {
            reference: format!("pay_{}", uuid::Uuid::new_v4().simple()),
            amount: request.amount,
            charged_at: Utc::now(),
        })
    }
}
