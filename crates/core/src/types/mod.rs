//! Core types for the toy store.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod address;
pub mod email;
pub mod id;
pub mod payment;
pub mod price;
pub mod product;
pub mod status;
pub mod user;

pub use address::{AddressError, ShippingAddress};
pub use email::{Email, EmailError};
pub use id::*;
pub use payment::PaymentMethod;
pub use price::{CurrencyCode, Price, format_money, round_cents};
pub use product::Product;
pub use status::{OrderStatus, OrderStatusPolicy};
pub use user::AuthenticatedUser;
