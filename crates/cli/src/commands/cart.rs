//! Cart commands.

use std::fmt::Write as _;

use toy_store_core::{ProductId, format_money};
use toy_store_storefront::error::add_breadcrumb;
use toy_store_storefront::state::AppState;

use super::CommandError;
use super::catalog::Catalog;

pub fn add(
    state: &AppState,
    catalog: &Catalog,
    id: &ProductId,
    quantity: u32,
) -> Result<String, CommandError> {
    let product = catalog.find(id)?;
    state.cart().add_item(product, quantity);
    add_breadcrumb("cart", "Added to cart", Some(&[("product_id", id.as_str())]));
    Ok(show_quiet(state))
}

pub fn remove(state: &AppState, id: &ProductId) -> String {
    state.cart().remove_item(id);
    add_breadcrumb("cart", "Removed from cart", Some(&[("product_id", id.as_str())]));
    show_quiet(state)
}

pub fn set(state: &AppState, id: &ProductId, quantity: i64) -> String {
    state.cart().update_quantity(id, quantity);
    show_quiet(state)
}

pub fn clear(state: &AppState) -> String {
    state.cart().clear();
    "Cart cleared".to_string()
}

/// The cart with its order summary. Counts as a cart view.
pub fn show(state: &AppState) -> String {
    state.cart().view();
    show_quiet(state)
}

fn show_quiet(state: &AppState) -> String {
    let cart = state.cart();
    if cart.is_empty() {
        return "Your cart is empty".to_string();
    }

    let mut out = String::new();
    for item in cart.items() {
        let _ = writeln!(
            out,
            "{:>3} x {:<32} {:>9} {:>10}",
            item.quantity,
            item.name,
            format_money(item.price),
            format_money(item.total)
        );
    }

    let summary = state.checkout().summary();
    let _ = writeln!(out, "\nItems:    {}", cart.item_count());
    let _ = writeln!(out, "Subtotal: {}", format_money(summary.subtotal));
    if summary.free_shipping() {
        out.push_str("Shipping: FREE\n");
    } else {
        let _ = writeln!(out, "Shipping: {}", format_money(summary.shipping));
    }
    let _ = writeln!(out, "Tax:      {}", format_money(summary.tax));
    let _ = write!(out, "Total:    {}", format_money(summary.total));
    out
}
