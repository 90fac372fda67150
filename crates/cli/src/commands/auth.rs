//! Sign-in commands.
//!
//! The identity provider keeps the session on disk, so signing in here
//! authenticates later invocations too.

use toy_store_storefront::error::AppError;
use toy_store_storefront::services::auth::FederatedSignIn;
use toy_store_storefront::state::AppState;

use super::CommandError;

pub async fn sign_up(state: &AppState, email: &str, password: &str) -> Result<String, CommandError> {
    let user = state
        .auth_service()
        .sign_up_with_email(email, password)
        .await
        .map_err(AppError::from)?;
    tracing::info!(uid = %user.uid, "Account created");
    Ok(format!("Welcome, {}", user.label()))
}

pub async fn sign_in(state: &AppState, email: &str, password: &str) -> Result<String, CommandError> {
    let user = state
        .auth_service()
        .sign_in_with_email(email, password)
        .await
        .map_err(AppError::from)?;
    Ok(format!("Signed in as {}", user.label()))
}

/// Google sign-in. A blocked popup turns into a redirect that is completed
/// straight away.
pub async fn google(state: &AppState) -> Result<String, CommandError> {
    let service = state.auth_service();
    let user = match service.sign_in_with_google().await.map_err(AppError::from)? {
        FederatedSignIn::Completed(user) => user,
        FederatedSignIn::Redirecting => service
            .complete_redirect()
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::Internal("redirect sign-in did not complete".to_string()))?,
    };
    Ok(format!("Signed in as {}", user.label()))
}

pub async fn sign_out(state: &AppState) -> Result<String, CommandError> {
    if !state.auth().is_authenticated() {
        return Ok("Not signed in".to_string());
    }
    state
        .auth_service()
        .sign_out()
        .await
        .map_err(AppError::from)?;
    Ok("Signed out".to_string())
}

pub fn whoami(state: &AppState) -> String {
    state.auth().user().map_or_else(
        || "Not signed in".to_string(),
        |user| match &user.email {
            Some(email) => format!("{} <{email}> ({})", user.label(), user.uid),
            None => format!("{} ({})", user.label(), user.uid),
        },
    )
}
