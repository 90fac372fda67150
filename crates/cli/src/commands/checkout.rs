//! Checkout command.

use std::fmt::Write as _;

use toy_store_core::{IdempotencyKey, format_money};
use toy_store_storefront::error::AppError;
use toy_store_storefront::services::checkout::CheckoutForm;
use toy_store_storefront::state::AppState;

use super::CommandError;

/// Place an order for the cart and print the confirmation.
pub async fn place_order(
    state: &AppState,
    form: CheckoutForm,
    idempotency_key: Option<IdempotencyKey>,
) -> Result<String, CommandError> {
    let summary = state.checkout().summary();
    tracing::info!(
        total = %summary.total,
        method = %form.payment.method(),
        "Processing payment"
    );

    let order = state
        .checkout()
        .place_order(form, idempotency_key)
        .await
        .map_err(AppError::from)?;

    let mut out = String::from("Order placed successfully!\n\n");
    let _ = writeln!(out, "Order:    {}", order.id);
    let _ = writeln!(out, "Status:   {}", order.status);
    let _ = writeln!(out, "Items:    {}", order.item_count());
    let _ = writeln!(out, "Total:    {}", format_money(order.total));
    let _ = writeln!(out, "Payment:  {}", order.payment_method);
    let _ = write!(
        out,
        "Ship to:  {}, {}, {}, {} {}",
        order.shipping_address.full_name(),
        order.shipping_address.address,
        order.shipping_address.city,
        order.shipping_address.state,
        order.shipping_address.zip_code
    );
    Ok(out)
}
