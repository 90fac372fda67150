//! Stores and business logic for the shopper session.
//!
//! # Services
//!
//! - `cart` - Cart store (line items, drawer flag, cart id)
//! - `favorites` - Favorited product ids
//! - `orders` - Order history and idempotent order placement
//! - `auth` - Auth projection and sign-in flows over an identity provider
//! - `checkout` - Pricing, form validation and cart-to-order conversion
//! - `payment` - Payment gateway seam
//! - `analytics` - Fire-and-forget product analytics

pub mod analytics;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod favorites;
pub mod orders;
pub mod payment;
