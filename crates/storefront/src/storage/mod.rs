//! Persisted shopper state.
//!
//! # Layout
//!
//! Each store persists one JSON document under a fixed key:
//!
//! - `toy-store-cart` - `{ items, cartId }`
//! - `toy-store-favorites` - `{ favorites }`
//! - `toy-store-orders` - `{ orders }` (timestamps as RFC 3339 strings)
//! - `toy-store-auth` - `{ user, isAuthenticated }`
//! - `toy-store-identity` - accounts and session of the local identity provider
//! - `toy-store-device` - `{ deviceId }` reported to analytics
//!
//! # Backends
//!
//! - [`MemoryStorage`] - in-process map, optionally with a byte quota
//! - [`FileStorage`] - one file per key in a directory
//!
//! Writes are last-write-wins. Two processes sharing a directory overwrite
//! each other's documents without merging.

pub mod file;
pub mod memory;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Storage keys for persisted slices.
pub mod keys {
    /// Cart line items and session cart ID.
    pub const CART: &str = "toy-store-cart";

    /// Favorited product IDs.
    pub const FAVORITES: &str = "toy-store-favorites";

    /// Order history.
    pub const ORDERS: &str = "toy-store-orders";

    /// Authenticated user projection.
    pub const AUTH: &str = "toy-store-auth";

    /// Local identity provider accounts and session.
    pub const IDENTITY: &str = "toy-store-identity";

    /// Analytics device identifier.
    pub const DEVICE: &str = "toy-store-device";
}

/// Errors raised by a storage backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("I/O error on {key}: {message}")]
    Io { key: String, message: String },

    /// The backend has no room for the document.
    #[error("quota exceeded writing {key}: {needed} bytes needed, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    /// Stored document could not be decoded.
    #[error("data corruption in {key}: {message}")]
    DataCorruption { key: String, message: String },

    /// Value could not be encoded.
    #[error("serialization error for {key}: {message}")]
    Serialization { key: String, message: String },

    /// Backend is disabled or unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Key-value backend holding serialized slices.
pub trait StateStorage: Send + Sync + fmt::Debug {
    /// Read the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the write is rejected.
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete the document stored under `key`. Absent keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A document persisted under a fixed key.
pub trait PersistedSlice: Serialize + DeserializeOwned {
    /// Storage key for this slice.
    const KEY: &'static str;
}

/// Failure bookkeeping for best-effort writes.
#[derive(Debug, Default)]
pub struct PersistenceHealth {
    failures: AtomicU64,
    last_error: Mutex<Option<StorageError>>,
}

impl PersistenceHealth {
    /// Number of writes that failed since construction.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// The most recent write failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<StorageError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether every write so far has succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.failures() == 0
    }

    fn record(&self, err: StorageError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(err);
    }
}

/// Typed reader/writer for one store's slice.
///
/// Stores call [`Persister::persist`] after every mutation. Failures there
/// are logged and counted in [`PersistenceHealth`] but never reach the caller:
/// the in-memory state stays authoritative.
#[derive(Debug)]
pub struct Persister {
    storage: Arc<dyn StateStorage>,
    health: PersistenceHealth,
}

impl Persister {
    /// Wrap a storage backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StateStorage>) -> Self {
        Self {
            storage,
            health: PersistenceHealth::default(),
        }
    }

    /// Failure bookkeeping for this persister.
    #[must_use]
    pub const fn health(&self) -> &PersistenceHealth {
        &self.health
    }

    /// Read a slice.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DataCorruption`] if the stored document does not
    /// decode, or the backend's error if it cannot be read.
    pub fn load<T: PersistedSlice>(&self) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.storage.load(T::KEY)? else {
            return Ok(None);
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::DataCorruption {
                key: T::KEY.to_owned(),
                message: e.to_string(),
            })
    }

    /// Read a slice, treating unreadable or corrupt data as absent.
    #[must_use]
    pub fn load_or_default<T: PersistedSlice + Default>(&self) -> T {
        match self.load::<T>() {
            Ok(Some(slice)) => slice,
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!(key = T::KEY, error = %e, "Discarding unreadable persisted state");
                T::default()
            }
        }
    }

    /// Write a slice and report the outcome.
    ///
    /// # Errors
    ///
    /// Returns the serialization or backend error.
    pub fn save<T: PersistedSlice>(&self, slice: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(slice).map_err(|e| StorageError::Serialization {
            key: T::KEY.to_owned(),
            message: e.to_string(),
        })?;
        self.storage.save(T::KEY, &raw)
    }

    /// Write a slice, logging and recording any failure.
    pub fn persist<T: PersistedSlice>(&self, slice: &T) {
        if let Err(e) = self.save(slice) {
            tracing::warn!(key = T::KEY, error = %e, "Failed to persist state");
            self.health.record(e);
        }
    }

    /// Delete a slice, logging and recording any failure.
    pub fn forget<T: PersistedSlice>(&self) {
        if let Err(e) = self.storage.remove(T::KEY) {
            tracing::warn!(key = T::KEY, error = %e, "Failed to remove persisted state");
            self.health.record(e);
        }
    }
}
