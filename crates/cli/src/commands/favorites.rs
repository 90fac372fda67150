//! Favorites commands.

use toy_store_core::ProductId;
use toy_store_storefront::state::AppState;

use super::CommandError;
use super::catalog::Catalog;

pub fn toggle(state: &AppState, catalog: &Catalog, id: &ProductId) -> Result<String, CommandError> {
    let product = catalog.find(id)?;
    Ok(if state.favorites().toggle(id) {
        format!("Added {} to favorites", product.name)
    } else {
        format!("Removed {} from favorites", product.name)
    })
}

/// Favorites in the order they were added. Products missing from the
/// catalog are listed by ID.
pub fn list(state: &AppState, catalog: &Catalog) -> String {
    let ids = state.favorites().ids();
    if ids.is_empty() {
        return "No favorites yet".to_string();
    }

    ids.iter()
        .map(|id| {
            catalog
                .find(id)
                .map_or_else(|_| id.to_string(), |p| format!("{id}  {}", p.name))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
