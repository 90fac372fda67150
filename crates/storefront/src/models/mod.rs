//! Domain models for the storefront.
//!
//! These are the documents the stores hold in memory and persist. Identifier,
//! money and address types live in `toy_store_core`.

pub mod cart;
pub mod order;
pub mod session;

pub use cart::{CartLineItem, CartSlice};
pub use order::{NewOrder, Order, OrderDraft, OrdersSlice};
pub use session::{AuthSlice, DeviceSlice, FavoritesSlice};
