//! Favorites store: a deduplicated, insertion-ordered set of product ids.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use toy_store_core::ProductId;

use crate::models::FavoritesSlice;
use crate::services::analytics::{self, AnalyticsSink};
use crate::storage::{PersistenceHealth, Persister, StorageError};

/// The shopper's favorited products.
#[derive(Debug)]
pub struct FavoritesService {
    ids: RwLock<Vec<ProductId>>,
    persister: Persister,
    analytics: Arc<dyn AnalyticsSink>,
}

impl FavoritesService {
    /// Restore favorites from `persister`. Duplicate ids in saved data are
    /// collapsed.
    #[must_use]
    pub fn load(persister: Persister, analytics: Arc<dyn AnalyticsSink>) -> Self {
        let saved: FavoritesSlice = persister.load_or_default();
        let mut ids: Vec<ProductId> = Vec::with_capacity(saved.favorites.len());
        for id in saved.favorites {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        Self {
            ids: RwLock::new(ids),
            persister,
            analytics,
        }
    }

    fn persist(&self, ids: &[ProductId]) {
        self.persister.persist(&FavoritesSlice {
            favorites: ids.to_vec(),
        });
    }

    /// Add `id`. Returns `false` if it was already a favorite.
    pub fn add(&self, id: &ProductId) -> bool {
        {
            let mut ids = self.ids.write().unwrap_or_else(PoisonError::into_inner);
            if ids.contains(id) {
                return false;
            }
            ids.push(id.clone());
            self.persist(&ids);
        }

        debug!(product_id = %id, "Favorited");
        self.analytics.track(analytics::favorited_product(id));
        true
    }

    /// Remove `id`. Returns `false` if it was not a favorite.
    pub fn remove(&self, id: &ProductId) -> bool {
        {
            let mut ids = self.ids.write().unwrap_or_else(PoisonError::into_inner);
            let before = ids.len();
            ids.retain(|f| f != id);
            if ids.len() == before {
                return false;
            }
            self.persist(&ids);
        }

        debug!(product_id = %id, "Unfavorited");
        self.analytics.track(analytics::removed_favorite(id));
        true
    }

    /// Flip membership of `id`. Returns whether it is a favorite afterwards.
    pub fn toggle(&self, id: &ProductId) -> bool {
        let now_favorite = {
            let mut ids = self.ids.write().unwrap_or_else(PoisonError::into_inner);
            let now_favorite = if let Some(pos) = ids.iter().position(|f| f == id) {
                ids.remove(pos);
                false
            } else {
                ids.push(id.clone());
                true
            };
            self.persist(&ids);
            now_favorite
        };

        let event = if now_favorite {
            analytics::favorited_product(id)
        } else {
            analytics::removed_favorite(id)
        };
        debug!(product_id = %id, now_favorite, "Toggled favorite");
        self.analytics.track(event);
        now_favorite
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.ids.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Snapshot of favorited ids, oldest first.
    #[must_use]
    pub fn ids(&self) -> Vec<ProductId> {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write favorites now and report the outcome.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write fails.
    pub fn save(&self) -> Result<(), StorageError> {
        self.persister.save(&FavoritesSlice { favorites: self.ids() })
    }

    #[must_use]
    pub const fn persistence(&self) -> &PersistenceHealth {
        self.persister.health()
    }
}
