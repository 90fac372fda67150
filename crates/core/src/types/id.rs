//! Newtype IDs for type-safe entity references.
//!
//! Every identifier in the store is an opaque string. Use the `define_id!`
//! macro to create wrappers that prevent accidentally mixing IDs from
//! different entity types, then attach generators where the store mints
//! its own identifiers.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Alphabet used for the random suffix of cart identifiers.
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random suffix of cart identifiers.
const CART_SUFFIX_LEN: usize = 9;

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use toy_store_core::define_id;
/// define_id!(SkuId);
/// define_id!(WarehouseId);
///
/// let sku = SkuId::new("donut-01");
/// let warehouse = WarehouseId::new("donut-01");
///
/// assert_eq!(sku.as_str(), warehouse.as_str());
/// // These are different types, so this won't compile:
/// // let _: SkuId = warehouse;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(ProductId);
define_id!(LineItemId);
define_id!(CartId);
define_id!(OrderId);
define_id!(UserId);
define_id!(IdempotencyKey);

impl CartId {
    /// Mint a fresh session cart identifier.
    ///
    /// Format: `cart_{epoch_millis}_{9 base-36 chars}`. The random suffix keeps
    /// two identifiers minted in the same millisecond apart.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..CART_SUFFIX_LEN)
            .map(|_| {
                let idx = rng.random_range(0..BASE36.len());
                BASE36.get(idx).map_or('0', |b| char::from(*b))
            })
            .collect();

        Self(format!("cart_{}_{suffix}", Utc::now().timestamp_millis()))
    }
}

impl OrderId {
    /// Mint a fresh order identifier (`order-{uuid}`).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("order-{}", uuid::Uuid::new_v4().simple()))
    }
}

impl LineItemId {
    /// Derive a line item identifier from the product and the time it was added.
    ///
    /// Not globally unique: adding the same product twice within one
    /// millisecond yields the same ID. The cart never holds two lines for one
    /// product, so this does not collide within a cart.
    #[must_use]
    pub fn for_product(product_id: &ProductId, added_at: DateTime<Utc>) -> Self {
        Self(format!("cart-{product_id}-{}", added_at.timestamp_millis()))
    }
}
