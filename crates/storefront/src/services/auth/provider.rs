//! Identity provider seam and the local, storage-backed implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use toy_store_core::{AuthenticatedUser, Email, UserId};

use super::AuthError;
use crate::storage::{PersistedSlice, Persister, keys};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Consecutive failed password attempts before an email is locked out.
const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Minutes a lockout lasts after the latest failure.
const LOCKOUT_MINUTES: i64 = 15;

fn lockout_window() -> TimeDelta {
    TimeDelta::minutes(LOCKOUT_MINUTES)
}

/// Federated identity sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FederatedProvider {
    Google,
}

impl FederatedProvider {
    const fn slug(self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }

    const fn display_name(self) -> &'static str {
        match self {
            Self::Google => "Google Shopper",
        }
    }
}

/// External identity service.
///
/// The current session is published through [`IdentityProvider::subscribe`];
/// every sign-in, sign-up and sign-out replaces it.
#[async_trait]
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// Sign in an existing password account.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError>;

    /// Create a password account and sign it in.
    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError>;

    /// Federated sign-in in a popup.
    async fn sign_in_with_popup(
        &self,
        provider: FederatedProvider,
    ) -> Result<AuthenticatedUser, AuthError>;

    /// Start a federated sign-in that completes on the next
    /// [`IdentityProvider::redirect_result`].
    async fn sign_in_with_redirect(&self, provider: FederatedProvider) -> Result<(), AuthError>;

    /// Finish a pending redirect sign-in, if there is one.
    async fn redirect_result(&self) -> Result<Option<AuthenticatedUser>, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Stream of the current session. Holds the current value immediately.
    fn subscribe(&self) -> watch::Receiver<Option<AuthenticatedUser>>;
}

// =============================================================================
// Local provider
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    user: AuthenticatedUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    federated: Option<FederatedProvider>,
}

/// Failed password attempts against one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailedAttempts {
    count: u32,
    last_failure: DateTime<Utc>,
}

impl FailedAttempts {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_failure) > lockout_window()
    }
}

/// Persisted accounts and session:
/// `{ accounts, current, pendingRedirect, failedAttempts }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDocument {
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default)]
    current: Option<UserId>,
    #[serde(default)]
    pending_redirect: Option<FederatedProvider>,
    /// Keyed by lowercased email.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    failed_attempts: HashMap<String, FailedAttempts>,
}

impl PersistedSlice for IdentityDocument {
    const KEY: &'static str = keys::IDENTITY;
}

impl IdentityDocument {
    fn find_by_email(&self, email: &Email) -> Option<&Account> {
        self.accounts.iter().find(|a| {
            a.user
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email.as_str()))
        })
    }

    fn is_locked_out(&self, email: &Email, now: DateTime<Utc>) -> bool {
        self.failed_attempts
            .get(&lockout_key(email))
            .is_some_and(|f| f.count >= MAX_FAILED_ATTEMPTS && !f.is_stale(now))
    }

    fn note_failure(&mut self, email: &Email, now: DateTime<Utc>) {
        let entry = self
            .failed_attempts
            .entry(lockout_key(email))
            .or_insert(FailedAttempts {
                count: 0,
                last_failure: now,
            });
        if entry.is_stale(now) {
            entry.count = 0;
        }
        entry.count += 1;
        entry.last_failure = now;
    }

    fn current_user(&self) -> Option<AuthenticatedUser> {
        let uid = self.current.as_ref()?;
        self.accounts
            .iter()
            .find(|a| &a.user.uid == uid)
            .map(|a| a.user.clone())
    }

    /// The account for `provider`, created on first use.
    fn federated_account(&mut self, provider: FederatedProvider) -> AuthenticatedUser {
        if let Some(account) = self
            .accounts
            .iter()
            .find(|a| a.federated == Some(provider))
        {
            return account.user.clone();
        }

        let user = AuthenticatedUser {
            uid: UserId::new(format!("{}-{}", provider.slug(), new_uid())),
            email: None,
            display_name: Some(provider.display_name().to_owned()),
            photo_url: None,
        };
        self.accounts.push(Account {
            user: user.clone(),
            password_hash: None,
            federated: Some(provider),
        });
        user
    }
}

/// Identity provider backed by a [`crate::storage::StateStorage`].
///
/// Accounts, password hashes, failed attempts and the current session live
/// in one document, so a session or a lockout survives restarts of the
/// process.
pub struct LocalIdentityProvider {
    document: Mutex<IdentityDocument>,
    persister: Persister,
    session: watch::Sender<Option<AuthenticatedUser>>,
    popups_blocked: AtomicBool,
}

impl fmt::Debug for LocalIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let doc = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("LocalIdentityProvider")
            .field("accounts", &doc.accounts.len())
            .field("current", &doc.current)
            .finish_non_exhaustive()
    }
}

impl LocalIdentityProvider {
    /// Restore accounts and session from `persister`.
    #[must_use]
    pub fn load(persister: Persister) -> Self {
        let document: IdentityDocument = persister.load_or_default();
        let (session, _) = watch::channel(document.current_user());

        Self {
            document: Mutex::new(document),
            persister,
            session,
            popups_blocked: AtomicBool::new(false),
        }
    }

    /// Make popup sign-in fail with [`AuthError::PopupBlocked`].
    pub fn block_popups(&self, blocked: bool) {
        self.popups_blocked.store(blocked, Ordering::Relaxed);
    }

    /// Sign `user` in: record the session, persist and broadcast.
    fn establish(&self, doc: &mut IdentityDocument, user: Option<AuthenticatedUser>) {
        doc.current = user.as_ref().map(|u| u.uid.clone());
        self.persister.persist(&*doc);
        self.session.send_replace(user);
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError> {
        let email = Email::parse(email)?;
        let now = Utc::now();

        let mut doc = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        if doc.is_locked_out(&email, now) {
            return Err(AuthError::RateLimited);
        }
        let account = doc.find_by_email(&email).ok_or(AuthError::UserNotFound)?;
        let hash = account
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;

        if let Err(e) = verify_password(password, hash) {
            doc.note_failure(&email, now);
            self.persister.persist(&*doc);
            return Err(e);
        }

        let user = account.user.clone();
        doc.failed_attempts.remove(&lockout_key(&email));
        self.establish(&mut doc, Some(user.clone()));
        drop(doc);

        tracing::info!(user_id = %user.uid, "Signed in with password");
        Ok(user)
    }

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        let mut doc = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        if doc.find_by_email(&email).is_some() {
            return Err(AuthError::UserAlreadyExists);
        }

        let password_hash = hash_password(password)?;
        let user = AuthenticatedUser {
            uid: UserId::new(new_uid()),
            email: Some(email.to_string()),
            display_name: None,
            photo_url: None,
        };
        doc.accounts.push(Account {
            user: user.clone(),
            password_hash: Some(password_hash),
            federated: None,
        });
        self.establish(&mut doc, Some(user.clone()));

        tracing::info!(user_id = %user.uid, "Account created");
        Ok(user)
    }

    async fn sign_in_with_popup(
        &self,
        provider: FederatedProvider,
    ) -> Result<AuthenticatedUser, AuthError> {
        if self.popups_blocked.load(Ordering::Relaxed) {
            return Err(AuthError::PopupBlocked);
        }

        let mut doc = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        let user = doc.federated_account(provider);
        self.establish(&mut doc, Some(user.clone()));
        Ok(user)
    }

    async fn sign_in_with_redirect(&self, provider: FederatedProvider) -> Result<(), AuthError> {
        let mut doc = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        doc.pending_redirect = Some(provider);
        self.persister.persist(&*doc);
        Ok(())
    }

    async fn redirect_result(&self) -> Result<Option<AuthenticatedUser>, AuthError> {
        let mut doc = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(provider) = doc.pending_redirect.take() else {
            return Ok(None);
        };
        let user = doc.federated_account(provider);
        self.establish(&mut doc, Some(user.clone()));
        Ok(Some(user))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut doc = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        self.establish(&mut doc, None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthenticatedUser>> {
        self.session.subscribe()
    }
}

// =============================================================================
// Password helpers
// =============================================================================

fn lockout_key(email: &Email) -> String {
    email.as_str().to_ascii_lowercase()
}

fn new_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::StateStorage;
    use crate::storage::memory::MemoryStorage;

    fn provider() -> (LocalIdentityProvider, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (LocalIdentityProvider::load(Persister::new(storage.clone())), storage)
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let (provider, _) = provider();
        let created = provider
            .sign_up_with_password("homer@springfield.net", "donuts!")
            .await
            .unwrap();
        assert_eq!(created.email.as_deref(), Some("homer@springfield.net"));
        assert_eq!(*provider.subscribe().borrow(), Some(created.clone()));

        provider.sign_out().await.unwrap();
        assert_eq!(*provider.subscribe().borrow(), None);

        let signed_in = provider
            .sign_in_with_password("HOMER@springfield.net", "donuts!")
            .await
            .unwrap();
        assert_eq!(signed_in.uid, created.uid);
    }

    #[tokio::test]
    async fn test_sign_up_errors() {
        let (provider, _) = provider();
        assert!(matches!(
            provider.sign_up_with_password("not-an-email", "donuts!").await,
            Err(AuthError::InvalidEmail(_))
        ));
        assert!(matches!(
            provider.sign_up_with_password("bart@springfield.net", "eat").await,
            Err(AuthError::WeakPassword(_))
        ));

        provider
            .sign_up_with_password("bart@springfield.net", "cowabunga")
            .await
            .unwrap();
        assert_eq!(
            provider
                .sign_up_with_password("bart@springfield.net", "cowabunga")
                .await
                .unwrap_err(),
            AuthError::UserAlreadyExists
        );
    }

    #[tokio::test]
    async fn test_sign_in_errors_and_lockout() {
        let (provider, _) = provider();
        assert_eq!(
            provider
                .sign_in_with_password("lisa@springfield.net", "saxophone")
                .await
                .unwrap_err(),
            AuthError::UserNotFound
        );

        provider
            .sign_up_with_password("lisa@springfield.net", "saxophone")
            .await
            .unwrap();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            assert_eq!(
                provider
                    .sign_in_with_password("lisa@springfield.net", "trumpet")
                    .await
                    .unwrap_err(),
                AuthError::InvalidCredentials
            );
        }
        assert_eq!(
            provider
                .sign_in_with_password("lisa@springfield.net", "saxophone")
                .await
                .unwrap_err(),
            AuthError::RateLimited
        );
    }

    #[tokio::test]
    async fn test_lockout_survives_reload_and_expires() {
        let (provider, storage) = provider();
        provider
            .sign_up_with_password("maggie@springfield.net", "pacifier")
            .await
            .unwrap();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            provider
                .sign_in_with_password("maggie@springfield.net", "rattle")
                .await
                .unwrap_err();
        }

        let reloaded = LocalIdentityProvider::load(Persister::new(storage.clone()));
        assert_eq!(
            reloaded
                .sign_in_with_password("MAGGIE@springfield.net", "pacifier")
                .await
                .unwrap_err(),
            AuthError::RateLimited
        );

        let raw = storage.load(keys::IDENTITY).unwrap().unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let expired = Utc::now() - lockout_window() - TimeDelta::minutes(1);
        doc["failedAttempts"]["maggie@springfield.net"]["lastFailure"] =
            serde_json::to_value(expired).unwrap();
        storage.save(keys::IDENTITY, &doc.to_string()).unwrap();

        let later = LocalIdentityProvider::load(Persister::new(storage.clone()));
        later
            .sign_in_with_password("maggie@springfield.net", "pacifier")
            .await
            .unwrap();
        let raw = storage.load(keys::IDENTITY).unwrap().unwrap();
        assert!(!raw.contains("failedAttempts"));
    }

    #[tokio::test]
    async fn test_popup_and_redirect() {
        let (provider, _) = provider();
        let first = provider
            .sign_in_with_popup(FederatedProvider::Google)
            .await
            .unwrap();
        assert!(first.uid.as_str().starts_with("google-"));

        provider.block_popups(true);
        assert_eq!(
            provider
                .sign_in_with_popup(FederatedProvider::Google)
                .await
                .unwrap_err(),
            AuthError::PopupBlocked
        );

        assert_eq!(provider.redirect_result().await.unwrap(), None);
        provider
            .sign_in_with_redirect(FederatedProvider::Google)
            .await
            .unwrap();
        let redirected = provider.redirect_result().await.unwrap().unwrap();
        assert_eq!(redirected.uid, first.uid);
        assert_eq!(provider.redirect_result().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_session_survives_reload() {
        let (provider, storage) = provider();
        let user = provider
            .sign_up_with_password("marge@springfield.net", "blue-hair")
            .await
            .unwrap();

        let raw = storage.load(keys::IDENTITY).unwrap().unwrap();
        assert!(raw.contains("passwordHash"));
        assert!(!raw.contains("blue-hair"));

        let reloaded = LocalIdentityProvider::load(Persister::new(storage));
        assert_eq!(*reloaded.subscribe().borrow(), Some(user));
        reloaded
            .sign_in_with_password("marge@springfield.net", "blue-hair")
            .await
            .unwrap();
    }
}
