//! Shipping address captured at checkout.

use serde::{Deserialize, Serialize};

use super::email::{Email, EmailError};

/// Errors from [`ShippingAddress::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A required field is blank.
    #[error("please fill in your {0}")]
    MissingField(&'static str),
    /// The contact email is malformed.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
}

/// Where an order ships. Stored verbatim on the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

impl ShippingAddress {
    /// Check that every field is filled in and the email is well formed.
    ///
    /// Fields are checked in form order and the first blank one is reported
    /// using its human-readable name.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::MissingField`] for the first blank field, or
    /// [`AddressError::InvalidEmail`] when the email does not parse.
    pub fn validate(&self) -> Result<(), AddressError> {
        let fields = [
            ("first name", &self.first_name),
            ("last name", &self.last_name),
            ("email", &self.email),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("zip code", &self.zip_code),
        ];

        if let Some((name, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(AddressError::MissingField(name));
        }

        Email::parse(&self.email)?;
        Ok(())
    }

    /// "First Last" for display.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}
