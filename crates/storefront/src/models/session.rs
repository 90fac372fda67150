//! Session-scoped documents: favorites, the auth projection and the device.

use serde::{Deserialize, Serialize};

use toy_store_core::{AuthenticatedUser, ProductId};

use crate::storage::{PersistedSlice, keys};

/// Persisted favorites: `{ favorites }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoritesSlice {
    #[serde(default)]
    pub favorites: Vec<ProductId>,
}

impl PersistedSlice for FavoritesSlice {
    const KEY: &'static str = keys::FAVORITES;
}

/// Persisted auth projection: `{ user, isAuthenticated }`.
///
/// The loading flag is not stored; every session starts unresolved until the
/// identity provider reports in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSlice {
    #[serde(default)]
    pub user: Option<AuthenticatedUser>,
    #[serde(default)]
    pub is_authenticated: bool,
}

impl PersistedSlice for AuthSlice {
    const KEY: &'static str = keys::AUTH;
}

/// Persisted analytics device: `{ deviceId }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSlice {
    #[serde(default)]
    pub device_id: Option<String>,
}

impl PersistedSlice for DeviceSlice {
    const KEY: &'static str = keys::DEVICE;
}
