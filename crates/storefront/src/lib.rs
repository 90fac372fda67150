//! Toy store storefront library.
//!
//! Shopper session state for a small toy store: a cart, favorites, a mock
//! order history and a projection of the signed-in user. State lives in
//! memory and is mirrored best-effort into a pluggable
//! [`storage::StateStorage`].
//!
//! [`state::AppState`] wires everything together and is the usual entry
//! point.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
