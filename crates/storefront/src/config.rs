//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//!
//! ## Storage and orders
//! - `TOY_STORE_DATA_DIR` - Directory for persisted state (default: .toy-store)
//! - `TOY_STORE_ORDER_DELAY_MS` - Simulated payment latency (default: 3000)
//! - `TOY_STORE_PAYMENT_TIMEOUT_MS` - Charge timeout (default: 10000)
//! - `TOY_STORE_IDEMPOTENCY_TTL_SECS` - Order dedup window (default: 600)
//! - `TOY_STORE_STATUS_POLICY` - `strict` or `unrestricted` (default: strict)
//!
//! ## Pricing
//! - `TOY_STORE_TAX_RATE` - Checkout tax rate (default: 0.08)
//! - `TOY_STORE_FREE_SHIPPING_THRESHOLD` - Free-shipping subtotal (default: 50)
//! - `TOY_STORE_SHIPPING_FEE` - Flat shipping fee (default: 9.99)
//!
//! ## Observability
//! - `AMPLITUDE_API_KEY` - Enables the Amplitude analytics sink
//! - `AMPLITUDE_ENDPOINT` - Amplitude HTTP API URL
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use toy_store_core::OrderStatusPolicy;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

static DEFAULT_AMPLITUDE_ENDPOINT: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://api2.amplitude.com/2/httpapi").expect("Invalid default Amplitude endpoint")
});

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront configuration.
#[derive(Debug, Clone, Default)]
pub struct StorefrontConfig {
    /// Directory for `FileStorage`
    pub data_dir: PathBuf,
    /// Order placement settings
    pub orders: OrdersConfig,
    /// Checkout pricing
    pub pricing: PricingConfig,
    /// Product analytics
    pub analytics: AnalyticsConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Order placement settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdersConfig {
    /// How long the simulated gateway takes to approve a charge
    pub processing_delay: Duration,
    /// How long to wait for the gateway before giving up
    pub payment_timeout: Duration,
    /// How long an idempotency key keeps resolving to the same order
    pub idempotency_ttl: Duration,
    /// Which status changes are allowed
    pub status_policy: OrderStatusPolicy,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            processing_delay: Duration::from_millis(3000),
            payment_timeout: Duration::from_millis(10_000),
            idempotency_ttl: Duration::from_secs(600),
            status_policy: OrderStatusPolicy::Strict,
        }
    }
}

/// Checkout pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
    pub tax_rate: Decimal,
    /// Subtotals at or above this ship free
    pub free_shipping_threshold: Decimal,
    pub shipping_fee: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            free_shipping_threshold: Decimal::from(50),
            shipping_fee: Decimal::new(999, 2),
        }
    }
}

/// Product analytics configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct AnalyticsConfig {
    /// Amplitude API key; analytics are discarded when unset
    pub api_key: Option<SecretString>,
    /// Amplitude HTTP API endpoint
    pub endpoint: Url,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_AMPLITUDE_ENDPOINT.clone(),
        }
    }
}

impl std::fmt::Debug for AnalyticsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable does not parse, or if the
    /// analytics key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// As [`StorefrontConfig::from_env`].
    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&env);

        let orders = OrdersConfig {
            processing_delay: Duration::from_millis(env.parsed("TOY_STORE_ORDER_DELAY_MS", 3000)?),
            payment_timeout: Duration::from_millis(
                env.parsed("TOY_STORE_PAYMENT_TIMEOUT_MS", 10_000)?,
            ),
            idempotency_ttl: Duration::from_secs(env.parsed("TOY_STORE_IDEMPOTENCY_TTL_SECS", 600)?),
            status_policy: env.parsed("TOY_STORE_STATUS_POLICY", OrderStatusPolicy::Strict)?,
        };
        if orders.payment_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "TOY_STORE_PAYMENT_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let defaults = PricingConfig::default();
        let pricing = PricingConfig {
            tax_rate: env.parsed_decimal("TOY_STORE_TAX_RATE", defaults.tax_rate)?,
            free_shipping_threshold: env.parsed_decimal(
                "TOY_STORE_FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
            )?,
            shipping_fee: env.parsed_decimal("TOY_STORE_SHIPPING_FEE", defaults.shipping_fee)?,
        };

        let analytics = AnalyticsConfig {
            api_key: env.validated_secret("AMPLITUDE_API_KEY")?,
            endpoint: match env.optional("AMPLITUDE_ENDPOINT") {
                Some(raw) => Url::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("AMPLITUDE_ENDPOINT".to_string(), e.to_string())
                })?,
                None => DEFAULT_AMPLITUDE_ENDPOINT.clone(),
            },
        };

        Ok(Self {
            data_dir: PathBuf::from(env.or_default("TOY_STORE_DATA_DIR", ".toy-store")),
            orders,
            pricing,
            analytics,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable source with the lookups configuration needs.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional variable. Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    /// Parse a non-negative decimal, falling back to `default` when unset.
    fn parsed_decimal(&self, key: &str, default: Decimal) -> Result<Decimal, ConfigError> {
        let value = self.parsed(key, default)?;
        if value.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must not be negative".to_string(),
            ));
        }
        Ok(value)
    }

    /// Load and validate an optional secret.
    fn validated_secret(&self, key: &str) -> Result<Option<SecretString>, ConfigError> {
        let Some(value) = self.optional(key) else {
            return Ok(None);
        };
        validate_secret_strength(&value, key)?;
        Ok(Some(SecretString::from(value)))
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by Amplitude."
            ),
        ));
    }

    Ok(())
}
