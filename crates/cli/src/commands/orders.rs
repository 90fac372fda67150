//! Order history commands.

use std::fmt::Write as _;

use toy_store_core::{OrderId, OrderStatus, UserId, format_money};
use toy_store_storefront::error::AppError;
use toy_store_storefront::models::Order;
use toy_store_storefront::services::orders::OrderError;
use toy_store_storefront::state::AppState;

use super::CommandError;

/// The signed-in shopper's orders, oldest first.
pub fn list(state: &AppState) -> Result<String, CommandError> {
    let user = signed_in(state)?;

    let orders = state.orders().get_user_orders(&user);
    if orders.is_empty() {
        return Ok("No orders yet".to_string());
    }

    Ok(orders
        .iter()
        .map(|o| {
            format!(
                "{}  {}  {:<10}  {:>3} items  {:>10}",
                o.id,
                o.created_at.format("%Y-%m-%d %H:%M"),
                o.status,
                o.item_count(),
                format_money(o.total)
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn show(state: &AppState, id: &OrderId) -> Result<String, CommandError> {
    let order = owned_order(state, id)?;
    Ok(render(&order))
}

pub fn update_status(
    state: &AppState,
    id: &OrderId,
    status: OrderStatus,
) -> Result<String, CommandError> {
    owned_order(state, id)?;
    let order = state
        .orders()
        .update_order_status(id, status)
        .map_err(AppError::from)?;
    Ok(format!("Order {} is now {}", order.id, order.status))
}

fn signed_in(state: &AppState) -> Result<UserId, CommandError> {
    state
        .auth()
        .user()
        .map(|u| u.uid)
        .ok_or_else(|| AppError::Order(OrderError::NotAuthenticated).into())
}

/// Someone else's order reads as missing.
fn owned_order(state: &AppState, id: &OrderId) -> Result<Order, CommandError> {
    let user = signed_in(state)?;
    state
        .orders()
        .get_order_by_id(id)
        .filter(|o| o.user_id == user)
        .ok_or_else(|| AppError::NotFound(format!("Order {id}")).into())
}

fn render(order: &Order) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Order {}", order.id);
    let _ = writeln!(out, "Status:  {}", order.status);
    let _ = writeln!(
        out,
        "Placed:  {}",
        order.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if order.updated_at != order.created_at {
        let _ = writeln!(
            out,
            "Updated: {}",
            order.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    let _ = writeln!(out, "Payment: {}", order.payment_method);
    if let Some(reference) = &order.payment_reference {
        let _ = writeln!(out, "Charge:  {reference}");
    }
    let address = &order.shipping_address;
    let _ = writeln!(
        out,
        "Ship to: {}, {}, {}, {} {}\n",
        address.full_name(),
        address.address,
        address.city,
        address.state,
        address.zip_code
    );
    for item in &order.items {
        let _ = writeln!(
            out,
            "{:>3} x {:<32} {:>10}",
            item.quantity,
            item.name,
            format_money(item.total)
        );
    }
    let _ = write!(out, "\nTotal: {}", format_money(order.total));
    out
}
