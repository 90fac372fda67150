//! Authentication.
//!
//! [`AuthStore`] is the local projection of who is signed in. It never
//! authenticates anyone itself: it mirrors whatever the [`IdentityProvider`]
//! last reported. [`AuthService`] drives the sign-in flows against the
//! provider and keeps the store and analytics in step.

mod error;
mod provider;

pub use error::AuthError;
pub use provider::{FederatedProvider, IdentityProvider, LocalIdentityProvider};

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use toy_store_core::AuthenticatedUser;

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::models::AuthSlice;
use crate::services::analytics::{self, AccountType, AnalyticsSink};
use crate::storage::memory::MemoryStorage;
use crate::storage::{PersistenceHealth, Persister, StorageError};

// =============================================================================
// Store
// =============================================================================

#[derive(Debug)]
struct AuthState {
    user: Option<AuthenticatedUser>,
    is_loading: bool,
}

/// Who is signed in, as last reported by the identity provider.
///
/// `is_loading` starts `true` on every construction and is not persisted.
#[derive(Debug)]
pub struct AuthStore {
    state: RwLock<AuthState>,
    persister: Persister,
}

impl Default for AuthStore {
    /// An unpersisted store.
    fn default() -> Self {
        Self::load(Persister::new(Arc::new(MemoryStorage::new())))
    }
}

impl AuthStore {
    /// Restore the last known user from `persister`.
    #[must_use]
    pub fn load(persister: Persister) -> Self {
        let saved: AuthSlice = persister.load_or_default();
        Self {
            state: RwLock::new(AuthState {
                user: saved.user,
                is_loading: true,
            }),
            persister,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the user wholesale.
    pub fn set_user(&self, user: Option<AuthenticatedUser>) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.user.clone_from(&user);
            self.persister.persist(&AuthSlice {
                is_authenticated: user.is_some(),
                user: user.clone(),
            });
        }

        match &user {
            Some(u) => set_sentry_user(&u.uid, u.email.as_deref()),
            None => clear_sentry_user(),
        }
    }

    pub fn set_loading(&self, loading: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .is_loading = loading;
    }

    /// Forget the user locally. Does not sign out of the provider.
    pub fn logout(&self) {
        self.set_user(None);
    }

    #[must_use]
    pub fn user(&self) -> Option<AuthenticatedUser> {
        self.read().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().user.is_some()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.read().is_loading
    }

    /// Mirror a provider session stream into this store.
    ///
    /// The current value is applied immediately, then every change. Each
    /// event replaces the user and clears the loading flag. The task ends
    /// when the provider drops its sender.
    pub fn follow(
        self: &Arc<Self>,
        mut sessions: watch::Receiver<Option<AuthenticatedUser>>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let user = sessions.borrow_and_update().clone();
                store.set_user(user);
                store.set_loading(false);
                if sessions.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Write the projection now and report the outcome.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write fails.
    pub fn save(&self) -> Result<(), StorageError> {
        let user = self.user();
        self.persister.save(&AuthSlice {
            is_authenticated: user.is_some(),
            user,
        })
    }

    #[must_use]
    pub const fn persistence(&self) -> &PersistenceHealth {
        self.persister.health()
    }
}

// =============================================================================
// Service
// =============================================================================

/// Outcome of a federated sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FederatedSignIn {
    /// Signed in through the popup.
    Completed(AuthenticatedUser),
    /// The popup was blocked; a redirect sign-in is pending and completes on
    /// the next [`AuthService::complete_redirect`].
    Redirecting,
}

/// Sign-in flows over an [`IdentityProvider`].
#[derive(Debug, Clone)]
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<AuthStore>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<AuthStore>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            provider,
            store,
            analytics,
        }
    }

    fn signed_in(&self, user: &AuthenticatedUser) {
        self.store.set_user(Some(user.clone()));
        self.store.set_loading(false);
        self.analytics.identify(Some(&user.uid));
    }

    fn failed(&self, flow: &str, err: &AuthError) {
        tracing::warn!(flow, error = %err, "Authentication failed");
        self.analytics
            .track(analytics::encountered_error("auth", flow, Some(err.code())));
    }

    /// Copy the provider's current session into the store.
    pub fn sync_session(&self) {
        let user = self.provider.subscribe().borrow().clone();
        if let Some(user) = &user {
            self.analytics.identify(Some(&user.uid));
        }
        self.store.set_user(user);
        self.store.set_loading(false);
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unchanged.
    pub async fn sign_in_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError> {
        match self.provider.sign_in_with_password(email, password).await {
            Ok(user) => {
                self.signed_in(&user);
                self.analytics
                    .track(analytics::signed_in(AccountType::Email));
                Ok(user)
            }
            Err(e) => {
                self.failed("sign in", &e);
                Err(e)
            }
        }
    }

    /// Create an email/password account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unchanged.
    pub async fn sign_up_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError> {
        self.analytics.track(analytics::started_signup());
        match self.provider.sign_up_with_password(email, password).await {
            Ok(user) => {
                self.signed_in(&user);
                self.analytics
                    .track(analytics::created_account(AccountType::Email));
                Ok(user)
            }
            Err(e) => {
                self.failed("sign up", &e);
                Err(e)
            }
        }
    }

    /// Sign in with Google, falling back to a redirect if the popup is
    /// blocked.
    ///
    /// # Errors
    ///
    /// Returns any provider error other than a blocked popup, or the
    /// redirect's error.
    pub async fn sign_in_with_google(&self) -> Result<FederatedSignIn, AuthError> {
        let google = FederatedProvider::Google;
        match self.provider.sign_in_with_popup(google).await {
            Ok(user) => {
                self.signed_in(&user);
                self.analytics
                    .track(analytics::signed_in(AccountType::Google));
                Ok(FederatedSignIn::Completed(user))
            }
            Err(AuthError::PopupBlocked) => {
                tracing::info!("Sign-in popup blocked, falling back to redirect");
                if let Err(e) = self.provider.sign_in_with_redirect(google).await {
                    self.failed("google redirect", &e);
                    return Err(e);
                }
                Ok(FederatedSignIn::Redirecting)
            }
            Err(e) => {
                self.failed("google sign in", &e);
                Err(e)
            }
        }
    }

    /// Finish a pending redirect sign-in.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unchanged.
    pub async fn complete_redirect(&self) -> Result<Option<AuthenticatedUser>, AuthError> {
        let user = self.provider.redirect_result().await.inspect_err(|e| {
            self.failed("google redirect", e);
        })?;
        if let Some(user) = &user {
            self.signed_in(user);
            self.analytics
                .track(analytics::signed_in(AccountType::Google));
        }
        Ok(user)
    }

    /// Sign out of the provider and clear the local projection.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; the local projection is left as is.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await?;
        self.store.logout();
        self.analytics.identify(None);
        Ok(())
    }

    #[must_use]
    pub fn store(&self) -> &AuthStore {
        &self.store
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::analytics::RecordingSink;
    use crate::storage::StateStorage;

    fn service() -> (AuthService, Arc<LocalIdentityProvider>, Arc<RecordingSink>) {
        let storage = Arc::new(MemoryStorage::new());
        let provider = Arc::new(LocalIdentityProvider::load(Persister::new(storage.clone())));
        let store = Arc::new(AuthStore::load(Persister::new(storage)));
        let sink = Arc::new(RecordingSink::new());
        let service = AuthService::new(provider.clone(), store, sink.clone());
        (service, provider, sink)
    }

    #[test]
    fn test_store_starts_loading() {
        let store = AuthStore::default();
        assert!(store.is_loading());
        assert!(!store.is_authenticated());
        assert!(store.user().is_none());
    }

    #[test]
    fn test_set_user_replaces_wholesale() {
        let store = AuthStore::default();
        let mut homer = AuthenticatedUser::new("u1");
        homer.display_name = Some("Homer".into());
        store.set_user(Some(homer));

        store.set_user(Some(AuthenticatedUser::new("u1")));
        assert_eq!(store.user().unwrap().display_name, None);
        assert!(store.is_authenticated());

        store.logout();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_projection_persisted_without_loading_flag() {
        let storage = Arc::new(MemoryStorage::new());
        let store = AuthStore::load(Persister::new(storage.clone()));
        store.set_loading(false);
        store.set_user(Some(AuthenticatedUser::new("u1")));

        let raw = storage.load(crate::storage::keys::AUTH).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["isAuthenticated"], true);
        assert_eq!(json["user"]["uid"], "u1");
        assert!(json.get("isLoading").is_none());

        let reloaded = AuthStore::load(Persister::new(storage));
        assert!(reloaded.is_loading());
        assert_eq!(reloaded.user().unwrap().uid.as_str(), "u1");
    }

    #[tokio::test]
    async fn test_follow_mirrors_provider() {
        let (tx, rx) = watch::channel(None);
        let store = Arc::new(AuthStore::default());
        let task = store.follow(rx);

        tx.send_replace(Some(AuthenticatedUser::new("u2")));
        tokio::time::timeout(Duration::from_secs(1), async {
            while !store.is_authenticated() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(!store.is_loading());

        tx.send_replace(None);
        drop(tx);
        task.await.unwrap();
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_email_flows_and_analytics() {
        let (service, _, sink) = service();
        let user = service
            .sign_up_with_email("ned@springfield.net", "okily-dokily")
            .await
            .unwrap();
        assert_eq!(service.store().user(), Some(user.clone()));
        assert_eq!(sink.identified_user(), Some(user.uid.clone()));

        service.sign_out().await.unwrap();
        assert!(!service.store().is_authenticated());
        assert_eq!(sink.identified_user(), None);

        let err = service
            .sign_in_with_email("ned@springfield.net", "wrong-one")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);

        service
            .sign_in_with_email("ned@springfield.net", "okily-dokily")
            .await
            .unwrap();
        assert_eq!(
            sink.names(),
            vec![
                "Started Signup",
                "Created Account",
                "Encountered Error",
                "Signed in"
            ]
        );
        assert_eq!(
            sink.events()[2].property("error code").unwrap(),
            "auth/invalid-credential"
        );
    }

    #[tokio::test]
    async fn test_google_falls_back_to_redirect() {
        let (service, provider, sink) = service();
        provider.block_popups(true);

        let outcome = service.sign_in_with_google().await.unwrap();
        assert_eq!(outcome, FederatedSignIn::Redirecting);
        assert!(!service.store().is_authenticated());

        let user = service.complete_redirect().await.unwrap().unwrap();
        assert_eq!(service.store().user(), Some(user));
        assert_eq!(sink.names(), vec!["Signed in"]);
        assert_eq!(
            sink.events()[0].property("account type").unwrap(),
            "google"
        );
    }

    #[tokio::test]
    async fn test_sync_session_from_provider() {
        let (service, provider, _) = service();
        provider
            .sign_up_with_password("moe@springfield.net", "tavern")
            .await
            .unwrap();
        service.store().logout();

        service.sync_session();
        assert!(service.store().is_authenticated());
        assert!(!service.store().is_loading());
    }
}
