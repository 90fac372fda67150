//! Toy Store Core - Shared types library.
//!
//! This crate provides common types used across all toy store components:
//! - `storefront` - Cart, favorites, orders and auth state for a shopper session
//! - `cli` - Command-line driver over on-disk storage
//!
//! # Architecture
//!
//! The core crate contains only types and their validation - no I/O, no
//! storage, no HTTP clients. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, statuses, addresses and users

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
