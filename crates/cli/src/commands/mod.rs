//! Command implementations.
//!
//! Each command works against an [`AppState`](toy_store_storefront::state::AppState)
//! restored from disk and returns the text to print.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod favorites;
pub mod orders;

use std::path::PathBuf;

use thiserror::Error;

use toy_store_core::ProductId;
use toy_store_storefront::error::AppError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The storefront rejected the operation.
    #[error(transparent)]
    App(#[from] AppError),

    /// No catalog product has this ID.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// The catalog file could not be read.
    #[error("Failed to read catalog {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The catalog file is not a JSON array of products.
    #[error("Invalid catalog {path}: {source}")]
    CatalogParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl CommandError {
    /// What to tell the shopper. Storefront errors are reported to Sentry
    /// first when they are internal.
    pub fn into_message(self) -> String {
        match self {
            Self::App(err) => {
                let notification = err.into_notification();
                format!("{}: {}", notification.title, notification.description)
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> toy_store_storefront::state::AppState {
    use std::sync::Arc;
    use std::time::Duration;

    use toy_store_storefront::config::StorefrontConfig;
    use toy_store_storefront::services::analytics::NoopSink;
    use toy_store_storefront::services::auth::LocalIdentityProvider;
    use toy_store_storefront::services::payment::SimulatedGateway;
    use toy_store_storefront::state::AppState;
    use toy_store_storefront::storage::memory::MemoryStorage;
    use toy_store_storefront::storage::{Persister, StateStorage};

    let storage: Arc<dyn StateStorage> = Arc::new(MemoryStorage::new());
    let identity = Arc::new(LocalIdentityProvider::load(Persister::new(Arc::clone(
        &storage,
    ))));
    AppState::new(
        StorefrontConfig::default(),
        storage,
        identity,
        Arc::new(SimulatedGateway::new(Duration::ZERO)),
        Arc::new(NoopSink),
    )
}
