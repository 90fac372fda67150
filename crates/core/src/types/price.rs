//! Type-safe price representation using decimal arithmetic.
//!
//! All monetary amounts in the store are [`Decimal`]s in the currency's
//! standard unit (dollars, not cents). Floats never touch money.

use core::fmt;
use core::iter::Sum;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A price in the default currency.
    #[must_use]
    pub const fn usd(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::USD)
    }

    /// Zero in the default currency.
    #[must_use]
    pub const fn zero() -> Self {
        Self::usd(Decimal::ZERO)
    }

    /// The amount rounded to cents, half away from zero.
    #[must_use]
    pub fn rounded(&self) -> Decimal {
        round_cents(self.amount)
    }

    /// Format for display (e.g., "$19.99").
    #[must_use]
    pub fn display(&self) -> String {
        let amount = self.rounded();
        if amount.is_sign_negative() {
            format!("-{}{:.2}", self.currency_code.symbol(), amount.abs())
        } else {
            format!("{}{:.2}", self.currency_code.symbol(), amount)
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Sum for Price {
    /// Sums amounts, keeping the currency of the first element (USD when empty).
    fn sum<I: Iterator<Item = Self>>(mut iter: I) -> Self {
        let Some(first) = iter.next() else {
            return Self::zero();
        };
        let amount = iter.fold(first.amount, |acc, p| acc + p.amount);
        Self::new(amount, first.currency_code)
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// Three-letter code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }
}

/// Round an amount to cents, half away from zero.
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format an amount in the default currency (e.g., "$45.00").
#[must_use]
pub fn format_money(amount: Decimal) -> String {
    Price::usd(amount).display()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_pads_cents() {
        assert_eq!(format_money(Decimal::from(45)), "$45.00");
        assert_eq!(format_money(Decimal::new(1999, 2)), "$19.99");
    }

    #[test]
    fn test_display_rounds_half_away_from_zero() {
        assert_eq!(format_money(Decimal::new(12345, 3)), "$12.35");
        assert_eq!(format_money(Decimal::new(-5, 1)), "-$0.50");
    }

    #[test]
    fn test_display_other_currency() {
        let price = Price::new(Decimal::from(3), CurrencyCode::GBP);
        assert_eq!(price.to_string(), "£3.00");
    }

    #[test]
    fn test_sum_empty_is_zero() {
        let total: Price = Vec::<Price>::new().into_iter().sum();
        assert_eq!(total, Price::zero());
    }

    #[test]
    fn test_sum_keeps_first_currency() {
        let total: Price = [
            Price::new(Decimal::from(2), CurrencyCode::EUR),
            Price::new(Decimal::new(150, 2), CurrencyCode::EUR),
        ]
        .into_iter()
        .sum();
        assert_eq!(total.amount, Decimal::new(350, 2));
        assert_eq!(total.currency_code, CurrencyCode::EUR);
    }
}
