//! Product catalog.
//!
//! The catalog is a read-only JSON array of products. A copy ships inside
//! the binary; `--catalog PATH` replaces it.

use std::fmt::Write as _;
use std::path::Path;

use clap::ValueEnum;
use rust_decimal::Decimal;
use toy_store_core::{Product, ProductId, format_money};
use toy_store_storefront::services::analytics;
use toy_store_storefront::state::AppState;

use super::CommandError;

const BUILTIN_CATALOG: &str = include_str!("../../catalog.json");

/// The products on sale.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    /// The catalog bundled with the binary.
    pub fn builtin() -> Result<Self, CommandError> {
        Self::parse(BUILTIN_CATALOG, Path::new("<builtin>"))
    }

    /// Read a catalog file.
    pub fn load(path: &Path) -> Result<Self, CommandError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CommandError::CatalogRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, CommandError> {
        let products = serde_json::from_str(raw).map_err(|source| CommandError::CatalogParse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { products })
    }

    /// Look up a product.
    pub fn find(&self, id: &ProductId) -> Result<&Product, CommandError> {
        self.products
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| CommandError::UnknownProduct(id.clone()))
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }
}

/// Order of `catalog list` output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    /// Catalog order
    #[default]
    Featured,
    PriceLow,
    PriceHigh,
    Rating,
}

/// Narrowing and ordering for `catalog list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Case-insensitive match on name, description or category.
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: SortOrder,
}

impl ListFilter {
    fn matches(&self, product: &Product) -> bool {
        let term = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let found = term.is_none_or(|term| {
            [&product.name, &product.description, &product.category]
                .iter()
                .any(|field| field.to_lowercase().contains(&term))
        });

        found
            && self
                .category
                .as_deref()
                .is_none_or(|c| c == "all" || product.category == c)
            && self.min_price.is_none_or(|min| product.price >= min)
            && self.max_price.is_none_or(|max| product.price <= max)
    }

    /// The matching products in the requested order.
    pub fn apply<'a>(&self, products: &'a [Product]) -> Vec<&'a Product> {
        let mut selected: Vec<&Product> = products.iter().filter(|p| self.matches(p)).collect();
        match self.sort {
            SortOrder::Featured => {}
            SortOrder::PriceLow => selected.sort_by(|a, b| a.price.cmp(&b.price)),
            SortOrder::PriceHigh => selected.sort_by(|a, b| b.price.cmp(&a.price)),
            SortOrder::Rating => selected.sort_by(|a, b| b.rating.cmp(&a.rating)),
        }
        selected
    }
}

/// One line per matching product, favorites starred.
pub fn list(state: &AppState, catalog: &Catalog, filter: &ListFilter) -> String {
    let products = filter.apply(catalog.products());
    if products.is_empty() {
        return "No products match".to_string();
    }

    let mut out = String::new();
    for product in products {
        let star = if state.favorites().contains(&product.id) {
            '*'
        } else {
            ' '
        };
        let _ = write!(
            out,
            "{star} {:<24} {:>9}  {}",
            product.id,
            format_money(product.price),
            product.name
        );
        if !product.in_stock {
            out.push_str(" (out of stock)");
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Product details. Counts as a product view.
pub fn show(state: &AppState, catalog: &Catalog, id: &ProductId) -> Result<String, CommandError> {
    let product = catalog.find(id)?;
    state
        .analytics()
        .track(analytics::viewed_product_details(product, "cli"));

    let mut out = format!("{} ({})\n", product.name, product.id);
    let _ = write!(out, "Price: {}", format_money(product.price));
    if let (Some(original), Some(discount)) = (product.original_price, product.discount_percent()) {
        let _ = write!(out, " (was {}, {discount}% off)", format_money(original));
    }
    out.push('\n');
    if !product.category.is_empty() {
        let _ = writeln!(out, "Category: {}", product.category);
    }
    let _ = writeln!(
        out,
        "Rating: {} ({} reviews)",
        product.rating, product.review_count
    );
    let _ = writeln!(
        out,
        "{}",
        if product.in_stock {
            "In stock"
        } else {
            "Out of stock"
        }
    );
    if state.favorites().contains(&product.id) {
        out.push_str("In your favorites\n");
    }
    if !product.description.is_empty() {
        let _ = write!(out, "\n{}", product.description);
    }
    Ok(out.trim_end().to_string())
}
