//! Authentication error types.

use thiserror::Error;

/// Errors reported by an identity provider.
///
/// Provider errors reach the caller unchanged; nothing here is retried
/// automatically except the popup-to-redirect fallback for federated sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] toy_store_core::EmailError),

    /// Wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No account for this email.
    #[error("user not found")]
    UserNotFound,

    /// An account already uses this email.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The sign-in popup could not be opened.
    #[error("sign-in popup was blocked")]
    PopupBlocked,

    /// Too many failed attempts.
    #[error("too many attempts, try again later")]
    RateLimited,

    /// Any other provider failure.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl AuthError {
    /// Stable machine-readable code, used in error analytics.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidEmail(_) => "auth/invalid-email",
            Self::InvalidCredentials => "auth/invalid-credential",
            Self::UserNotFound => "auth/user-not-found",
            Self::UserAlreadyExists => "auth/email-already-in-use",
            Self::WeakPassword(_) => "auth/weak-password",
            Self::PopupBlocked => "auth/popup-blocked",
            Self::RateLimited => "auth/too-many-requests",
            Self::Provider(_) => "auth/internal-error",
            Self::PasswordHash => "auth/hash-failure",
        }
    }
}
